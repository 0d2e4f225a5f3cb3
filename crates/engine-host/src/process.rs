//! Sidecar process transport: the engine as a child process over stdio.
//!
//! Commands are newline-delimited JSON written to the engine's stdin; the
//! engine answers on stdout with `IPC:`-prefixed JSON envelopes, interleaved
//! with ordinary log output. One command is in flight at a time and waits on
//! a single pending reply slot.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};

use engine_protocol::{
    DeviceInfo, EngineCommand, EngineEvent, EngineMessage, EngineResponse, NegotiatedConfig,
};

use crate::transport::{
    EngineStateSnapshot, EngineTransport, LoadedPlugin, StartRequest, TransportError,
};

/// Marker the engine prepends to protocol lines on stdout.
const IPC_PREFIX: &str = "IPC:";

/// How long to wait for a command reply before giving up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

type PendingSlot = Mutex<Option<oneshot::Sender<EngineResponse>>>;

struct ChildHandle {
    child: Child,
    stdin: ChildStdin,
}

struct ProcessInner {
    engine_binary: PathBuf,
    /// Holds the child and serializes commands; the engine handles one
    /// request at a time.
    child: tokio::sync::Mutex<Option<ChildHandle>>,
    pending: Arc<PendingSlot>,
    events_tx: broadcast::Sender<EngineEvent>,
}

/// [`EngineTransport`] over a spawned engine process.
#[derive(Clone)]
pub struct ProcessTransport {
    inner: Arc<ProcessInner>,
}

impl ProcessTransport {
    pub fn new(engine_binary: impl Into<PathBuf>) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(ProcessInner {
                engine_binary: engine_binary.into(),
                child: tokio::sync::Mutex::new(None),
                pending: Arc::new(Mutex::new(None)),
                events_tx,
            }),
        }
    }

    /// Spawn the engine and wire its stdout into the reply slot and the
    /// notification channel.
    async fn spawn_engine(&self) -> Result<ChildHandle, TransportError> {
        tracing::info!(binary = %self.inner.engine_binary.display(), "spawning audio engine");
        let mut child = Command::new(&self.inner.engine_binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Io(format!("failed to spawn engine: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io("engine stdout unavailable".to_string()))?;

        let pending = self.inner.pending.clone();
        let events_tx = self.inner.events_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => handle_output_line(&line, &pending, &events_tx),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "error reading engine stdout");
                        break;
                    }
                }
            }
            // Stdout closed: the engine is gone. Fail the pending command
            // instead of letting it sit out the full timeout, and surface
            // the termination as a fatal event.
            drop(pending.lock().unwrap().take());
            tracing::error!("engine stdout closed; process terminated");
            let _ = events_tx.send(EngineEvent::FatalError(
                "engine process terminated unexpectedly".to_string(),
            ));
        });

        Ok(ChildHandle { child, stdin })
    }

    /// Issue one command and wait for its reply. Respawns a dead engine first.
    async fn send_command(&self, cmd: EngineCommand) -> Result<EngineResponse, TransportError> {
        let mut slot = self.inner.child.lock().await;

        // Reap and discard an exited child before reusing the handle.
        if let Some(handle) = slot.as_mut() {
            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::warn!(%status, "engine exited; respawning");
                    *slot = None;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "could not query engine status; respawning");
                    *slot = None;
                }
            }
        }
        if slot.is_none() {
            *slot = Some(self.spawn_engine().await?);
        }
        let handle = slot
            .as_mut()
            .ok_or_else(|| TransportError::Io("engine unavailable".to_string()))?;

        let (tx, rx) = oneshot::channel();
        *self.inner.pending.lock().unwrap() = Some(tx);

        let mut line = serde_json::to_string(&cmd)
            .map_err(|e| TransportError::Io(format!("failed to encode command: {e}")))?;
        line.push('\n');
        handle
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Io(format!("failed to write to engine: {e}")))?;

        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(EngineResponse::Error(diag))) => Err(TransportError::Rejected(diag)),
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::Io(
                "engine exited before replying".to_string(),
            )),
            Err(_) => {
                self.inner.pending.lock().unwrap().take();
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Route one line of engine stdout.
fn handle_output_line(
    line: &str,
    pending: &PendingSlot,
    events_tx: &broadcast::Sender<EngineEvent>,
) {
    let Some(payload) = line.strip_prefix(IPC_PREFIX) else {
        // Ordinary engine log output, forwarded verbatim.
        tracing::debug!(target: "engine", "{line}");
        return;
    };
    match serde_json::from_str::<EngineMessage>(payload) {
        Ok(EngineMessage::Response(resp)) => {
            if let Some(tx) = pending.lock().unwrap().take() {
                let _ = tx.send(resp);
            } else {
                tracing::warn!(?resp, "engine reply with no command pending");
            }
        }
        Ok(EngineMessage::Event(event)) => {
            let _ = events_tx.send(event);
        }
        Err(e) => {
            tracing::warn!(error = %e, line, "malformed engine protocol line");
        }
    }
}

fn unexpected(resp: EngineResponse) -> TransportError {
    TransportError::Io(format!("unexpected engine reply: {resp:?}"))
}

fn start_command(req: StartRequest, restart: bool) -> EngineCommand {
    let StartRequest {
        host,
        input,
        output,
        input_id,
        output_id,
        buffer_size,
        sample_rate,
    } = req;
    if restart {
        EngineCommand::Restart {
            host,
            input,
            output,
            input_id,
            output_id,
            buffer_size,
            sample_rate,
        }
    } else {
        EngineCommand::Start {
            host,
            input,
            output,
            input_id,
            output_id,
            buffer_size,
            sample_rate,
        }
    }
}

#[async_trait]
impl EngineTransport for ProcessTransport {
    async fn start(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError> {
        match self.send_command(start_command(req, false)).await? {
            EngineResponse::Started {
                sample_rate,
                buffer_size,
            } => Ok(NegotiatedConfig {
                sample_rate,
                buffer_size,
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn restart(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError> {
        match self.send_command(start_command(req, true)).await? {
            EngineResponse::Started {
                sample_rate,
                buffer_size,
            } => Ok(NegotiatedConfig {
                sample_rate,
                buffer_size,
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn stop(&self) -> Result<(), TransportError> {
        match self.send_command(EngineCommand::Stop).await? {
            EngineResponse::Success => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn engine_state(&self) -> Result<EngineStateSnapshot, TransportError> {
        match self.send_command(EngineCommand::GetState).await? {
            EngineResponse::State {
                is_running,
                sample_rate,
                buffer_size,
            } => Ok(EngineStateSnapshot {
                is_running,
                negotiated: sample_rate.zip(buffer_size).map(|(sample_rate, buffer_size)| {
                    NegotiatedConfig {
                        sample_rate,
                        buffer_size,
                    }
                }),
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        match self.send_command(EngineCommand::GetDevices).await? {
            EngineResponse::Devices(devices) => Ok(devices),
            other => Err(unexpected(other)),
        }
    }

    async fn set_input_channels(&self, left: u16, right: u16) -> Result<(), TransportError> {
        match self
            .send_command(EngineCommand::SetInputChannels { left, right })
            .await?
        {
            EngineResponse::Success => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn set_global_mute(&self, active: bool) -> Result<(), TransportError> {
        match self
            .send_command(EngineCommand::SetGlobalMute { active })
            .await?
        {
            EngineResponse::Success => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn load_plugin(&self, path: &str) -> Result<LoadedPlugin, TransportError> {
        match self
            .send_command(EngineCommand::LoadPlugin {
                path: path.to_string(),
            })
            .await?
        {
            EngineResponse::PluginLoaded { id, name, vendor } => {
                Ok(LoadedPlugin { id, name, vendor })
            }
            other => Err(unexpected(other)),
        }
    }

    async fn unload_plugin(&self, id: &str) -> Result<(), TransportError> {
        match self
            .send_command(EngineCommand::UnloadPlugin { id: id.to_string() })
            .await?
        {
            EngineResponse::Success => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn reorder_plugins(&self, order: Vec<String>) -> Result<(), TransportError> {
        match self
            .send_command(EngineCommand::ReorderPlugins { order })
            .await?
        {
            EngineResponse::Success => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn notifications(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events_tx.subscribe()
    }
}
