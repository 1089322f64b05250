use std::path::PathBuf;

use clap::{Args, ValueEnum};
use common::prelude::{FsError, Presence};

use crate::state::{AppConfig, AppState, MailboxConfig, StateError};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Process memory (lost on exit, useful for trying things out)
    Memory,
    /// Local filesystem
    Local,
    /// S3-compatible object storage
    S3,
}

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Where message bodies are stored
    #[arg(long, value_enum, default_value = "local")]
    pub backend: Backend,

    /// Directory for message bodies (local backend, defaults to <config dir>/messages)
    #[arg(long)]
    pub messages_path: Option<PathBuf>,

    /// S3 endpoint URL (e.g., http://localhost:9000 for MinIO)
    #[arg(long, required_if_eq("backend", "s3"))]
    pub s3_endpoint: Option<String>,

    /// S3 access key ID
    #[arg(long, required_if_eq("backend", "s3"))]
    pub s3_access_key: Option<String>,

    /// S3 secret access key
    #[arg(long, required_if_eq("backend", "s3"))]
    pub s3_secret_key: Option<String>,

    /// S3 bucket name
    #[arg(long, required_if_eq("backend", "s3"))]
    pub s3_bucket: Option<String>,

    /// S3 region (defaults to us-east-1)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Number of names whose current version is cached
    #[arg(long, default_value_t = 10_000)]
    pub cache_entries: u64,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),

    #[error("filesystem init failed: {0}")]
    Filesystem(#[from] FsError),

    #[error("missing option: {0}")]
    MissingOption(&'static str),

    #[error("mailbox already holds a filesystem root that cannot be read")]
    CorruptRoot,
}

impl Init {
    fn mailbox_config(&self) -> Result<MailboxConfig, InitError> {
        Ok(match self.backend {
            Backend::Memory => MailboxConfig::Memory,
            Backend::Local => MailboxConfig::Local {
                path: self.messages_path.clone(),
            },
            Backend::S3 => MailboxConfig::S3 {
                endpoint: required(&self.s3_endpoint, "--s3-endpoint")?,
                access_key: required(&self.s3_access_key, "--s3-access-key")?,
                secret_key: required(&self.s3_secret_key, "--s3-secret-key")?,
                bucket: required(&self.s3_bucket, "--s3-bucket")?,
                region: self.s3_region.clone(),
            },
        })
    }
}

fn required(value: &Option<String>, flag: &'static str) -> Result<String, InitError> {
    value.clone().ok_or(InitError::MissingOption(flag))
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            cache_entries: self.cache_entries,
            log_dir: self.log_dir.clone(),
            mailbox: self.mailbox_config()?,
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), config)?;

        // An existing mailbox may already hold a filesystem; keep it
        let fs = state.open_dispatcher().await?;
        let filesystem = match fs.check_filesystem().await? {
            Presence::Present => "found existing filesystem",
            Presence::Absent => {
                fs.init_filesystem().await?;
                "created empty filesystem"
            }
            Presence::Corrupt => return Err(InitError::CorruptRoot),
        };
        fs.shutdown().await?;

        let output = format!(
            "Initialized mailfs directory at: {}\n\
             - Message index: {}\n\
             - Config: {}\n\
             - Backend: {:?}\n\
             - Filesystem: {}",
            state.mailfs_dir.display(),
            state.db_path.display(),
            state.config_path.display(),
            self.backend,
            filesystem
        );

        Ok(output)
    }
}
