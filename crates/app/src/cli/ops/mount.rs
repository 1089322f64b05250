use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use common::prelude::{Dispatcher, FsError, Presence};

use crate::fuse::MailFs;
use crate::process;
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Directory to mount the filesystem on
    pub mountpoint: PathBuf,

    /// Let users other than the mounting user access the mount
    #[arg(long)]
    pub allow_other: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),

    #[error("mailbox holds no usable filesystem ({0}), run 'mailfs check'")]
    NotReady(Presence),

    #[error("mount point {0} is not a directory")]
    InvalidMountPoint(String),

    #[error("failed to mount: {0}")]
    SpawnFailed(String),

    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = process::init_logging(&state.config);

        if !self.mountpoint.is_dir() {
            return Err(MountError::InvalidMountPoint(
                self.mountpoint.display().to_string(),
            ));
        }

        let fs = state.open_dispatcher().await?;
        ensure_filesystem(&fs, state.config.mailbox.is_ephemeral()).await?;
        let fs = Arc::new(fs);

        let mut options = vec![
            fuser::MountOption::FSName("mailfs".to_string()),
            fuser::MountOption::AutoUnmount,
        ];
        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }
        #[cfg(target_os = "macos")]
        options.extend([
            fuser::MountOption::CUSTOM("volname=mailfs".to_string()),
            fuser::MountOption::CUSTOM("noappledouble".to_string()),
        ]);

        let mail_fs = MailFs::new(tokio::runtime::Handle::current(), fs.clone());
        let session = fuser::spawn_mount2(mail_fs, &self.mountpoint, &options)
            .map_err(|e| MountError::SpawnFailed(e.to_string()))?;

        tracing::info!(mountpoint = %self.mountpoint.display(), "filesystem mounted");

        process::shutdown_signal().await?;

        // Joining the session runs the bridge's destroy hook, which blocks on
        // the runtime; keep it off the async workers.
        tokio::task::spawn_blocking(move || drop(session))
            .await
            .map_err(|e| MountError::SpawnFailed(e.to_string()))?;
        fs.shutdown().await?;

        Ok(format!("unmounted {}", self.mountpoint.display()))
    }
}

/// Refuse to mount anything but a readable filesystem. An ephemeral
/// mailbox is always empty when opened, so it gets a fresh root instead.
async fn ensure_filesystem(fs: &Dispatcher, ephemeral: bool) -> Result<(), MountError> {
    match fs.check_filesystem().await? {
        Presence::Present => Ok(()),
        Presence::Absent if ephemeral => {
            fs.init_filesystem().await?;
            tracing::info!("initialized filesystem in ephemeral mailbox");
            Ok(())
        }
        other => Err(MountError::NotReady(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppConfig, AppState, MailboxConfig};

    #[tokio::test]
    async fn test_memory_backend_is_mountable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            mailbox: MailboxConfig::Memory,
            ..AppConfig::default()
        };
        AppState::init(Some(temp_dir.path().to_path_buf()), config).unwrap();

        // Each open starts from an empty mailbox
        let state = AppState::load(Some(temp_dir.path().to_path_buf())).unwrap();
        let fs = state.open_dispatcher().await.unwrap();
        assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Absent);

        ensure_filesystem(&fs, state.config.mailbox.is_ephemeral())
            .await
            .unwrap();
        assert_eq!(fs.check_filesystem().await.unwrap(), Presence::Present);
        fs.create_file("/scratch").await.unwrap();
    }

    #[tokio::test]
    async fn test_absent_persistent_filesystem_is_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        AppState::init(Some(temp_dir.path().to_path_buf()), AppConfig::default()).unwrap();

        let state = AppState::load(Some(temp_dir.path().to_path_buf())).unwrap();
        let fs = state.open_dispatcher().await.unwrap();

        assert!(matches!(
            ensure_filesystem(&fs, state.config.mailbox.is_ephemeral()).await,
            Err(MountError::NotReady(Presence::Absent))
        ));
    }
}
