//! Subprocess helpers shared by the tool-driven adapters.

use std::io;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration, Instant};

use super::error::ConverterError;

/// Maps a spawn failure to `ToolNotFound` when the binary is missing.
pub(crate) fn spawn_error(tool: &str, path: &Path, err: io::Error) -> ConverterError {
    if err.kind() == io::ErrorKind::NotFound {
        ConverterError::ToolNotFound {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        }
    } else {
        ConverterError::Io(err)
    }
}

/// Runs `command` to completion, killing it after `timeout_secs`.
///
/// A non-zero exit is reported as `ToolFailed` with the captured stderr.
pub(crate) async fn run_tool(
    tool: &str,
    program: &Path,
    mut command: Command,
    timeout_secs: u64,
) -> Result<Output, ConverterError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| spawn_error(tool, program, e))?;

    let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(ConverterError::Timeout {
                tool: tool.to_string(),
                timeout_secs,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(ConverterError::tool_failed(
            tool,
            format!("exited with code: {:?}", output.status.code()),
            if stderr.is_empty() { None } else { Some(stderr) },
        ));
    }

    Ok(output)
}

/// Checks that `program` can be launched at all.
pub(crate) async fn probe_tool(tool: &str, program: &Path, arg: &str) -> Result<(), ConverterError> {
    Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|_| ())
        .map_err(|e| spawn_error(tool, program, e))
}

/// Polls for `path` every 100 ms until it exists or `wait_ms` elapses.
pub(crate) async fn wait_for_file(path: &Path, wait_ms: u64) -> Result<(), ConverterError> {
    const STEP: Duration = Duration::from_millis(100);

    let started = Instant::now();
    let limit = Duration::from_millis(wait_ms);
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        if started.elapsed() >= limit {
            return Err(ConverterError::OutputNotFound {
                path: path.to_path_buf(),
                waited_ms: wait_ms,
            });
        }
        sleep(STEP).await;
    }
}
