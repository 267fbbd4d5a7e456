// Worker handle capability: launch, kill, send, receive, wait-for-exit.
// `ProcessLauncher` backs it with a tokio child process speaking
// newline-delimited JSON on stdin (outbound) and stdout (inbound).

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};
use tracing::debug;

use super::manifest::WorkerManifest;
use crate::error::SpawnError;

/// Capacity of the per-worker event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;
/// How long to wait for stdout/stderr to drain after the worker exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const STDERR_CHUNK_SIZE: usize = 8 * 1024;

/// Everything the worker produces, in arrival order. `Exited` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One line from the message channel.
    Message(String),
    /// One chunk of stderr output.
    Stderr(String),
    /// Exit code; `None` when terminated by a signal.
    Exited(Option<i32>),
}

/// Control side of a running worker.
pub trait WorkerControl: Send + Sync {
    /// Stops the worker. Safe to call repeatedly or after exit.
    fn kill(&mut self);
    /// Queues one message for the worker.
    fn send(&mut self, message: &serde_json::Value) -> anyhow::Result<()>;
}

pub struct WorkerHandle {
    pub events: mpsc::Receiver<WorkerEvent>,
    control: Box<dyn WorkerControl>,
}

impl WorkerHandle {
    pub fn new(events: mpsc::Receiver<WorkerEvent>, control: Box<dyn WorkerControl>) -> Self {
        Self { events, control }
    }

    pub fn kill(&mut self) {
        self.control.kill();
    }

    pub fn send(&mut self, message: &serde_json::Value) -> anyhow::Result<()> {
        self.control.send(message)
    }
}

/// Starts workers. Swappable so the supervisor runs against any process API.
pub trait WorkerLauncher: Send + Sync + 'static {
    fn launch(&self, manifest: &WorkerManifest) -> Result<WorkerHandle, SpawnError>;
}

/// Runs `command args..` inside the worker directory.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub command: String,
    pub args: Vec<String>,
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, manifest: &WorkerManifest) -> Result<WorkerHandle, SpawnError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&manifest.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(line) = outbound_rx.recv().await {
                    if stdin.write_all(line.as_bytes()).await.is_err()
                        || stdin.write_all(b"\n").await.is_err()
                        || stdin.flush().await.is_err()
                    {
                        break;
                    }
                }
            });
        }

        let stdout_task = child.stdout.take().map(|stdout| {
            let tx = event_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(WorkerEvent::Message(line)).await.is_err() {
                        break;
                    }
                }
            })
        });

        let stderr_task = child.stderr.take().map(|mut stderr| {
            let tx = event_tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; STDERR_CHUNK_SIZE];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                            if tx.send(WorkerEvent::Stderr(chunk)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        });

        let pid = child.id();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = status.ok().and_then(|s| s.code());
            // Deliver remaining output before the exit event.
            let _ = timeout(OUTPUT_DRAIN_TIMEOUT, async {
                if let Some(task) = stdout_task {
                    let _ = task.await;
                }
                if let Some(task) = stderr_task {
                    let _ = task.await;
                }
            })
            .await;
            debug!(?pid, ?code, "worker process exited");
            let _ = event_tx.send(WorkerEvent::Exited(code)).await;
        });

        Ok(WorkerHandle::new(
            event_rx,
            Box::new(ProcessControl {
                kill_tx: Some(kill_tx),
                outbound_tx,
            }),
        ))
    }
}

struct ProcessControl {
    kill_tx: Option<oneshot::Sender<()>>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl WorkerControl for ProcessControl {
    fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    fn send(&mut self, message: &serde_json::Value) -> anyhow::Result<()> {
        let line = serde_json::to_string(message)?;
        self.outbound_tx
            .send(line)
            .map_err(|_| anyhow::anyhow!("worker stdin closed"))
    }
}

