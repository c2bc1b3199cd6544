use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::PdlError;

/// Literal stdout marker ProductClient prints once a send has gone out.
/// The tool exits 0 even on logical failure, so this substring is the only
/// success signal available.
pub const SEND_COMPLETE_MARKER: &str = "send complete";

/// Classifies a finished product client run from its captured stdout.
/// Isolated so the heuristic can be swapped if the tool ever grows a
/// structured status output.
pub fn classify_transmission(stdout: &str) -> bool {
    stdout.contains(SEND_COMPLETE_MARKER)
}

/// Outcome of one product client run. `success` reflects the stdout
/// marker only; a crash without the marker and a clean run that never
/// completed the send are indistinguishable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionReport {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl TransmissionReport {
    /// Report returned when sending is disabled by configuration and the
    /// subprocess was never invoked.
    pub fn skipped() -> Self {
        TransmissionReport {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Seam between message flows and the subprocess layer. Callers hold this
/// as a trait object so an alternate transport can be injected.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(
        &self,
        args: &[String],
        stdin_payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<TransmissionReport, PdlError>;
}

/// Runs the product client as a real child process with piped output and a
/// bounded wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTransmitter;

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<tokio::process::Child, PdlError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error) => {
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES
                {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    continue;
                }
                return Err(PdlError::SpawnFailure {
                    executable: executable.to_string(),
                    source: error,
                });
            }
        }
    }
}

#[async_trait]
impl Transmitter for ProcessTransmitter {
    async fn transmit(
        &self,
        args: &[String],
        stdin_payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<TransmissionReport, PdlError> {
        let (executable, rest) = args.split_first().ok_or_else(|| PdlError::SpawnFailure {
            executable: String::new(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argument vector",
            ),
        })?;

        let mut command = Command::new(executable);
        command.args(rest);
        command.kill_on_drop(true);
        command.stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = spawn_with_text_file_busy_retry(&mut command, executable).await?;

        // Feed stdin and await the child inside one timed region; a tool
        // that never drains its stdin pipe must still trip the timeout. The
        // handle drops when the write finishes so the child sees EOF. A
        // write error means the tool exited before reading; classification
        // of its output decides the outcome, so do not abort here.
        let stdin = child.stdin.take();
        let feed_stdin = async {
            if let (Some(payload), Some(mut stdin)) = (stdin_payload, stdin) {
                if let Err(error) = stdin.write_all(payload).await {
                    tracing::warn!(%error, "failed to write payload to product client stdin");
                } else if let Err(error) = stdin.flush().await {
                    tracing::warn!(%error, "failed to flush product client stdin");
                }
            }
        };

        let timeout_ms = timeout.as_millis() as u64;
        let waited = tokio::time::timeout(timeout, async {
            let (output, ()) = tokio::join!(child.wait_with_output(), feed_stdin);
            output
        })
        .await;
        let output = match waited {
            Ok(waited) => waited.map_err(|error| PdlError::SpawnFailure {
                executable: executable.to_string(),
                source: error,
            })?,
            // kill_on_drop reaps the still-running child.
            Err(_) => return Err(PdlError::Timeout { timeout_ms }),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stdout.trim().is_empty() {
            tracing::info!(stdout = %stdout.trim_end(), "product client output");
        }
        if !stderr.trim().is_empty() {
            tracing::error!(stderr = %stderr.trim_end(), "product client error output");
        }

        Ok(TransmissionReport {
            success: classify_transmission(&stdout),
            stdout,
            stderr,
        })
    }
}

/// Trailing slice of stdout for error messages, so the interesting part of
/// a long product client log survives truncation.
pub(crate) fn stdout_tail(stdout: &str) -> String {
    const MAX_CHARS: usize = 240;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return "no output".to_string();
    }
    let total = trimmed.chars().count();
    if total <= MAX_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(total - MAX_CHARS).collect();
    format!("...{tail}")
}
