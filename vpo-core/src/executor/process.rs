//! Media-tool subprocess supervision.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::CoreError;

/// Shared cancellation flag checked between stderr chunks; setting it
/// kills the in-flight tool process.
pub type CancelFlag = Arc<AtomicBool>;

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a tool to completion, enforcing the per-operation timeout.
pub async fn run_tool(invocation: &ToolInvocation) -> Result<ToolOutput, CoreError> {
    debug!(
        program = %invocation.program.display(),
        args = ?invocation.args,
        "running tool"
    );
    let mut command = tokio::process::Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(invocation.timeout, command.output())
        .await
        .map_err(|_| {
            CoreError::Tool(format!(
                "{} timed out after {}s",
                invocation.program.display(),
                invocation.timeout.as_secs()
            ))
        })?
        .map_err(CoreError::Io)?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(CoreError::Tool(format!(
            "{} exited with {}: {}",
            invocation.program.display(),
            output.status.code().unwrap_or(-1),
            stderr.chars().take(1024).collect::<String>()
        )));
    }
    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
    })
}

/// Runs a tool while streaming its stderr line by line to `on_line`,
/// honoring the cancel flag between lines. Used by the transcode executor
/// for progress reporting and cooperative cancellation.
pub async fn run_tool_streaming<F>(
    invocation: &ToolInvocation,
    cancel: Option<&CancelFlag>,
    mut on_line: F,
) -> Result<String, CoreError>
where
    F: FnMut(&str),
{
    debug!(
        program = %invocation.program.display(),
        args = ?invocation.args,
        "running tool (streaming)"
    );
    let mut command = tokio::process::Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(CoreError::Io)?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CoreError::Internal("tool stderr not captured".to_string()))?;
    let mut lines = BufReader::new(stderr).lines();

    let mut tail: Vec<String> = Vec::new();
    let deadline = tokio::time::Instant::now() + invocation.timeout;

    loop {
        if let Some(cancel) = cancel
            && cancel.load(Ordering::Relaxed)
        {
            warn!(program = %invocation.program.display(), "cancellation requested, killing tool");
            let _ = child.kill().await;
            return Err(CoreError::Cancelled("tool process killed".to_string()));
        }

        let next = tokio::time::timeout_at(deadline, lines.next_line()).await;
        match next {
            Err(_) => {
                let _ = child.kill().await;
                return Err(CoreError::Tool(format!(
                    "{} timed out after {}s",
                    invocation.program.display(),
                    invocation.timeout.as_secs()
                )));
            }
            Ok(Ok(Some(line))) => {
                // Progress lines arrive with carriage returns; split them
                // so the parser sees each update.
                for piece in line.split('\r') {
                    if !piece.trim().is_empty() {
                        on_line(piece);
                    }
                }
                if tail.len() >= 50 {
                    tail.remove(0);
                }
                tail.push(line);
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(CoreError::Io(e));
            }
        }
    }

    let status = tokio::time::timeout_at(deadline, child.wait())
        .await
        .map_err(|_| CoreError::Tool("tool did not exit after closing stderr".to_string()))?
        .map_err(CoreError::Io)?;

    let stderr_tail = tail.join("\n");
    if !status.success() {
        return Err(CoreError::Tool(format!(
            "{} exited with {}: {}",
            invocation.program.display(),
            status.code().unwrap_or(-1),
            stderr_tail.chars().take(1024).collect::<String>()
        )));
    }
    Ok(stderr_tail)
}
