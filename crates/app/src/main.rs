mod cli;
#[cfg(feature = "fuse")]
mod fuse;
mod process;
mod state;

use clap::{Parser, Subcommand};
use cli::args::Args;
use cli::op::{Op, OpContext};
#[cfg(feature = "fuse")]
use cli::Mount;
use cli::{Check, Init, Sweep, Version};

#[cfg(feature = "fuse")]
command_enum! {
    (Check, Check),
    (Init, Init),
    (Mount, Mount),
    (Sweep, Sweep),
    (Version, Version),
}

#[cfg(not(feature = "fuse"))]
command_enum! {
    (Check, Check),
    (Init, Init),
    (Sweep, Sweep),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
