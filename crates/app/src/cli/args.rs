pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mailfs")]
#[command(about = "A filesystem stored as messages in a mailbox")]
pub struct Args {
    /// Path to the mailfs config directory (defaults to ~/.mailfs)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
