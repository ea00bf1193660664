//! Command line interface for release tagging.

mod args;
pub mod commands;
mod output;

pub use args::{Args, RuntimeConfig, github_token, quay_token};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::EnvConfig;
use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args, EnvConfig::from_env()).await
}
