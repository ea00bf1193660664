//! Command execution for the tag release workflow.

mod tag_release;

use crate::EnvConfig;
use crate::cli::{Args, RuntimeConfig};
use crate::error::Result;

use tag_release::execute_tag_release;

/// Execute the tag release run for parsed arguments, returning the exit code
pub async fn execute_command(args: Args, env: EnvConfig) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        // Validation errors are never quiet
        let output = super::OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(1);
    }

    let config = RuntimeConfig::from(&args);

    match execute_tag_release(&args, &env, &config).await {
        Ok(()) => Ok(0),
        Err(e) => {
            let output = config.output();
            if e.is_mismatch() {
                output.error(&format!("Release {} refused: {}", args.release_version, e));
            } else {
                output.error(&format!("Release {} failed: {}", args.release_version, e));
            }

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() && !config.is_quiet() {
                output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    output.indent(&format!("• {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}
