use clap::Args;
use common::prelude::FsError;

use crate::process;
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Sweep {
    /// Report what would be deleted without deleting it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("sweep failed: {0}")]
    Filesystem(#[from] FsError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sweep {
    type Error = SweepError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = process::init_logging(&state.config);

        let fs = state.open_dispatcher().await?;
        let report = fs.sweep(self.dry_run).await?;
        fs.shutdown().await?;

        let verb = if self.dry_run { "would delete" } else { "deleted" };
        let count = if self.dry_run {
            report.selected
        } else {
            report.deleted
        };

        Ok(format!(
            "reachable nodes: {}\n\
             dangling links: {}\n\
             orphaned names: {}\n\
             stale versions: {}\n\
             {} {} version(s), expunged {}",
            report.reachable,
            report.dangling,
            report.orphans,
            report.stale_versions,
            verb,
            count,
            report.expunged
        ))
    }
}
