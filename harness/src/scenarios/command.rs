//! Shell commands for scenario setup and teardown

use tokio::process::Command;

use crate::error::{HarnessError, HarnessResult};

/// Run `command` through `sh -c` and fail on a non-zero exit
pub async fn run_shell(command: &str) -> HarnessResult<String> {
    tracing::info!("🚀 Running `{}`", command);

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| HarnessError::CommandFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        tracing::debug!("`{}` finished: {}", command, stdout.trim());
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(HarnessError::CommandFailed {
        command: command.to_string(),
        reason: format!("{}: {}", output.status, stderr.trim()),
    })
}
