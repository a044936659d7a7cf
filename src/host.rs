//! External process execution with a hard timeout.
//!
//! Nothing here retries. When the timeout elapses the child is killed on a
//! best-effort basis (`kill_on_drop`); a command that already handed work to
//! another process (e.g. `sudo shutdown`) may still take effect.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {}ms", .timeout.as_millis())]
    TimedOut { command: String, timeout: Duration },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Run a command line through `sh -c`. Returns captured stdout.
pub async fn run_shell(
    command_line: &str,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<String, CommandError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    run_command(cmd, command_line, cwd, timeout).await
}

/// Run `program` with `args` directly (no shell). Returns captured stdout.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<String, CommandError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let shown = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    run_command(cmd, &shown, cwd, timeout).await
}

async fn run_command(
    mut cmd: Command,
    shown: &str,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<String, CommandError> {
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| CommandError::Spawn {
        command: shown.to_string(),
        source,
    })?;

    tracing::debug!(command = %shown, "spawned");

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                command: shown.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(CommandError::TimedOut {
                command: shown.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(CommandError::Failed {
            command: shown.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
