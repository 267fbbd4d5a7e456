// Process supervisor: owns the single worker, classifies its messages, forwards
// telemetry to the aggregator and runs the crash/restart state machine.
//
// Stopped → Starting → Running → { clean exit: Stopped | Crashed → RestartScheduled → Starting }
// With restarts disabled, Crashed ends in Failed.

mod incident;
mod manifest;
mod message;
mod worker;

pub use incident::{incident_path, write_incident};
pub use manifest::WorkerManifest;
pub use message::{Inbound, classify};
pub use worker::{
    ProcessLauncher, WorkerControl, WorkerEvent, WorkerHandle, WorkerLauncher,
};

use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::SpawnError;
use crate::models::Packet;

/// Capacity of the outbound (supervisor → worker) message queue.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub worker_path: PathBuf,
    pub manifest_file: String,
    pub should_restart: bool,
    pub restart_delay: Duration,
    /// Drop forwarded worker log lines instead of logging them.
    pub suppress_console: bool,
    /// Directory for the stderr incident trail.
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Crashed,
    RestartScheduled,
    /// Crashed with restarts disabled; terminal.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub worker: Option<WorkerManifest>,
    /// Successful respawns since startup.
    pub restarts: u32,
}

impl SupervisorStatus {
    /// True only while a worker is running.
    pub fn active(&self) -> bool {
        self.state == SupervisorState::Running
    }
}

/// Cheap, cloneable view of the supervisor for other components.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    status_rx: watch::Receiver<SupervisorStatus>,
    outbound_tx: mpsc::Sender<serde_json::Value>,
}

impl SupervisorHandle {
    pub fn status(&self) -> SupervisorStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.status_rx.borrow().active()
    }

    /// Waits for the next status change.
    pub async fn changed(&mut self) -> anyhow::Result<SupervisorStatus> {
        self.status_rx.changed().await?;
        Ok(self.status())
    }

    /// Queues a message for the running worker.
    pub fn send_to_worker(&self, message: serde_json::Value) -> anyhow::Result<()> {
        anyhow::ensure!(self.is_active(), "no worker is running");
        self.outbound_tx
            .try_send(message)
            .map_err(|e| anyhow::anyhow!("outbound queue: {e}"))
    }
}

/// What to do after a worker exit.
enum ExitAction {
    Stop,
    Restart,
}

enum Next {
    Event(Option<WorkerEvent>),
    Outbound(serde_json::Value),
    Shutdown,
}

pub struct Supervisor<L: WorkerLauncher> {
    config: SupervisorConfig,
    launcher: L,
    packet_tx: mpsc::Sender<Packet>,
    worker: Option<WorkerHandle>,
    status_tx: watch::Sender<SupervisorStatus>,
    outbound_tx: mpsc::Sender<serde_json::Value>,
    outbound_rx: mpsc::Receiver<serde_json::Value>,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(config: SupervisorConfig, launcher: L, packet_tx: mpsc::Sender<Packet>) -> Self {
        let (status_tx, _) = watch::channel(SupervisorStatus {
            state: SupervisorState::Stopped,
            worker: None,
            restarts: 0,
        });
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        Self {
            config,
            launcher,
            packet_tx,
            worker: None,
            status_tx,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            status_rx: self.status_tx.subscribe(),
            outbound_tx: self.outbound_tx.clone(),
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status_tx.borrow().clone()
    }

    fn set_state(&self, state: SupervisorState) {
        self.status_tx.send_modify(|s| s.state = state);
    }

    /// Resolves the manifest and launches the worker. On success the
    /// supervisor is `Running`; on failure it is back to `Stopped`.
    pub fn spawn_worker(&mut self) -> Result<(), SpawnError> {
        self.set_state(SupervisorState::Starting);
        let launched = WorkerManifest::resolve(&self.config.worker_path, &self.config.manifest_file)
            .and_then(|manifest| {
                let handle = self.launcher.launch(&manifest)?;
                Ok((manifest, handle))
            });

        match launched {
            Ok((manifest, handle)) => {
                info!("Starting '{}@{}'", manifest.name, manifest.version);
                self.worker = Some(handle);
                self.status_tx.send_modify(|s| {
                    s.state = SupervisorState::Running;
                    s.worker = Some(manifest);
                });
                Ok(())
            }
            Err(e) => {
                self.set_state(SupervisorState::Stopped);
                Err(e)
            }
        }
    }

    /// Kills the worker if there is one and forgets its handle. Idempotent.
    pub fn kill_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.kill();
        }
        self.status_tx.send_if_modified(|s| {
            if s.state == SupervisorState::Running {
                s.state = SupervisorState::Stopped;
                true
            } else {
                false
            }
        });
    }

    /// Routes one inbound message: telemetry to the aggregator, the rest to the log.
    pub async fn on_message(&self, line: &str) {
        match classify(line) {
            Inbound::Packet(packet) => {
                if self.packet_tx.send(packet).await.is_err() {
                    debug!("aggregator gone; dropping packet");
                }
            }
            Inbound::Log(text) => {
                if !self.config.suppress_console {
                    info!(target: "worker", "{text}");
                }
            }
        }
    }

    /// Logs stderr output and records it as a standalone incident file.
    pub fn on_stderr(&self, text: &str) {
        if self.config.suppress_console {
            warn!(target: "worker", bytes = text.len(), "worker wrote to stderr");
        } else {
            error!(target: "worker", "{}", text.trim_end());
        }
        if let Err(e) = write_incident(&self.config.logs_dir, Local::now(), text) {
            warn!(error = %e, operation = "write_incident", "failed to record worker error");
        }
    }

    fn on_exit(&mut self, code: Option<i32>) -> ExitAction {
        self.worker = None;
        if code == Some(0) {
            info!("clean exit");
            self.set_state(SupervisorState::Stopped);
            return ExitAction::Stop;
        }

        self.set_state(SupervisorState::Crashed);
        if !self.config.should_restart {
            error!(?code, "Process crashed - process will not be restarted.");
            self.set_state(SupervisorState::Failed);
            return ExitAction::Stop;
        }
        warn!(?code, "Process crashed");
        ExitAction::Restart
    }

    /// Waits out the restart delay, then respawns; a failed respawn schedules
    /// another attempt. Returns false if shutdown arrived first.
    async fn restart(&mut self, shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
        loop {
            warn!(
                "Restarting process in {}ms...",
                self.config.restart_delay.as_millis()
            );
            self.kill_worker();
            self.set_state(SupervisorState::RestartScheduled);

            tokio::select! {
                _ = tokio::time::sleep(self.config.restart_delay) => {}
                _ = &mut *shutdown_rx => return false,
            }

            match self.spawn_worker() {
                Ok(()) => {
                    self.status_tx.send_modify(|s| s.restarts += 1);
                    return true;
                }
                Err(e) => error!(error = %e, "worker respawn failed"),
            }
        }
    }

    /// Drives the running worker until it stops for good or `shutdown_rx` fires.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            let Some(worker) = self.worker.as_mut() else {
                break;
            };
            let next = tokio::select! {
                event = worker.events.recv() => Next::Event(event),
                Some(message) = self.outbound_rx.recv() => Next::Outbound(message),
                _ = &mut shutdown_rx => Next::Shutdown,
            };

            match next {
                Next::Event(Some(WorkerEvent::Message(line))) => self.on_message(&line).await,
                Next::Event(Some(WorkerEvent::Stderr(text))) => self.on_stderr(&text),
                Next::Event(Some(WorkerEvent::Exited(code))) => {
                    if let ExitAction::Stop = self.on_exit(code) {
                        break;
                    }
                    if !self.restart(&mut shutdown_rx).await {
                        break;
                    }
                }
                // Event stream ended without an exit status.
                Next::Event(None) => {
                    if let ExitAction::Stop = self.on_exit(None) {
                        break;
                    }
                    if !self.restart(&mut shutdown_rx).await {
                        break;
                    }
                }
                Next::Outbound(message) => {
                    if let Some(worker) = self.worker.as_mut()
                        && let Err(e) = worker.send(&message)
                    {
                        warn!(error = %e, "failed to send message to worker");
                    }
                }
                Next::Shutdown => {
                    debug!("Supervisor shutting down");
                    break;
                }
            }
        }
        self.kill_worker();
    }
}

/// Spawns the supervisor loop. The worker must already be running
/// (`spawn_worker`), so startup failures surface to the caller.
pub fn spawn<L: WorkerLauncher>(
    supervisor: Supervisor<L>,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(supervisor.run(shutdown_rx))
}
