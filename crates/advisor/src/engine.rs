//! Engine process handling: spawns the analysis engine and bridges its
//! line-oriented stdio to channels.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AdvisorError;

static PROCESS_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the process-wide engine slot; at most one analysis
/// session may hold it at a time. Released on drop.
pub(crate) struct ProcessClaim {
    _private: (),
}

impl ProcessClaim {
    pub(crate) fn acquire() -> Option<Self> {
        PROCESS_CLAIMED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { _private: () })
    }
}

impl Drop for ProcessClaim {
    fn drop(&mut self) {
        PROCESS_CLAIMED.store(false, Ordering::SeqCst);
    }
}

/// Sending half of the engine protocol link (fire-and-forget commands).
#[derive(Debug, Clone)]
pub struct EnginePort {
    commands: mpsc::UnboundedSender<String>,
}

impl EnginePort {
    /// Queue a protocol command for the engine.
    pub fn post(&self, command: &str) {
        debug!(command, "engine <");
        let _ = self.commands.send(command.to_string());
    }

    /// Port backed by a bare channel; the receiving end is returned for the
    /// test to inspect in place of a real process.
    #[cfg(test)]
    pub(crate) fn fake() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { commands: tx }, rx)
    }
}

/// A running engine child process. The pipe pumps exit on their own once
/// the process dies or the channel ends are dropped.
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    /// Spawn the engine binary and bridge its stdio to channels: a writer
    /// task draining posted commands into stdin, a reader task forwarding
    /// trimmed stdout lines to the returned receiver.
    pub async fn spawn(
        path: &str,
    ) -> Result<(EngineProcess, EnginePort, mpsc::UnboundedReceiver<String>), AdvisorError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AdvisorError::EngineUnavailable(format!("failed to spawn {path}: {e}")))?;

        let mut stdin = child.stdin.take().unwrap();
        let mut stdout = BufReader::new(child.stdout.take().unwrap());

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                if stdin
                    .write_all(format!("{command}\n").as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match stdout.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        debug!(line = trimmed, "engine >");
                        if line_tx.send(trimmed.to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok((EngineProcess { child }, EnginePort { commands: cmd_tx }, line_rx))
    }

    /// Wait for the process to exit after `quit` has been posted.
    pub async fn dispose(mut self) {
        let _ = self.child.wait().await;
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        // Best-effort synchronous kill
        let _ = self.child.start_kill();
    }
}
