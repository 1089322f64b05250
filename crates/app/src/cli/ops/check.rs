use clap::Args;
use common::prelude::{FsError, Presence};

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Check;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("check failed: {0}")]
    Filesystem(#[from] FsError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Check {
    type Error = CheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let fs = state.open_dispatcher().await?;

        let presence = fs.check_filesystem().await?;
        fs.shutdown().await?;

        let detail = match presence {
            Presence::Present => "root directory decodes correctly",
            Presence::Absent => "no filesystem in this mailbox, run 'mailfs init'",
            Presence::Corrupt => "root exists but cannot be decoded",
        };
        Ok(format!("filesystem {}: {}", presence, detail))
    }
}
