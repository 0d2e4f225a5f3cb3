//! Engine lifecycle control: start, stop, restart, configuration apply.
//!
//! Single authority for driving the engine process. The core guarantee is
//! that at most one start/restart is in flight: a caller arriving while one
//! is outstanding attaches to the existing shared future instead of issuing
//! a second remote call.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use engine_protocol::NegotiatedConfig;

use crate::config::{AudioConfig, ConfigPatch, ConfigStore};
use crate::events::EventBus;
use crate::negotiation::reconcile;
use crate::session::{PluginRecord, PluginSession};
use crate::transport::{EngineTransport, StartRequest, TransportError};

/// Lifecycle state of the engine as the coordinator sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No stream open; nothing started yet (or stopped cleanly).
    Uninitialized,
    /// A start/restart command is in flight.
    Starting,
    /// The stream is open.
    Running,
    /// A stop command is in flight.
    Stopping,
    /// The engine terminated fatally; awaiting recovery.
    Crashed,
}

/// Failure starting or restarting the engine. Surfaced to the caller with the
/// raw engine diagnostic attached; never retried automatically from here.
#[derive(Clone, Debug)]
pub enum StartError {
    /// The configuration carries no host backend; there is nothing to start.
    NotStartable,
    /// The remote start call was rejected or failed.
    Engine(String),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::NotStartable => write!(f, "configuration has no host backend"),
            StartError::Engine(diag) => write!(f, "engine start failed: {diag}"),
        }
    }
}

impl From<TransportError> for StartError {
    fn from(e: TransportError) -> Self {
        StartError::Engine(e.to_string())
    }
}

impl std::error::Error for StartError {}

#[derive(Clone, Copy, Debug)]
enum LaunchKind {
    Start,
    Restart,
}

type SharedStart = Shared<BoxFuture<'static, Result<NegotiatedConfig, StartError>>>;

struct ControllerShared {
    state: EngineState,
    /// Persisted user intent as of the last start/apply. Never overwritten
    /// by negotiated values.
    intent: Option<AudioConfig>,
    /// What the engine actually negotiated, for display only.
    negotiated: Option<NegotiatedConfig>,
    in_flight: Option<SharedStart>,
}

struct Inner {
    transport: Arc<dyn EngineTransport>,
    store: ConfigStore,
    events: EventBus,
    session: PluginSession,
    shared: Mutex<ControllerShared>,
    global_mute: AtomicBool,
}

/// Single authority for engine start/stop/restart and configuration apply.
#[derive(Clone)]
pub struct EngineLifecycleController {
    inner: Arc<Inner>,
}

impl EngineLifecycleController {
    pub fn new(
        transport: Arc<dyn EngineTransport>,
        store: ConfigStore,
        events: EventBus,
        session: PluginSession,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                events,
                session,
                shared: Mutex::new(ControllerShared {
                    state: EngineState::Uninitialized,
                    intent: None,
                    negotiated: None,
                    in_flight: None,
                }),
                global_mute: AtomicBool::new(false),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.inner.shared.lock().unwrap().state
    }

    /// The event bus this controller publishes on.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The plugin session this controller maintains.
    pub fn session(&self) -> &PluginSession {
        &self.inner.session
    }

    /// Last negotiated parameters, if the engine reached Running.
    pub fn negotiated(&self) -> Option<NegotiatedConfig> {
        self.inner.shared.lock().unwrap().negotiated
    }

    /// In-memory "current" view: persisted intent overlaid with negotiated
    /// values for display. Distinct from the persisted record.
    pub fn current_view(&self) -> Option<AudioConfig> {
        let shared = self.inner.shared.lock().unwrap();
        let mut view = shared.intent.clone()?;
        if let Some(negotiated) = shared.negotiated {
            view.sample_rate = Some(negotiated.sample_rate);
            view.buffer_size = Some(negotiated.buffer_size);
        }
        Some(view)
    }

    /// Start the engine with the given configuration.
    ///
    /// A concurrent caller attaches to the in-flight operation and receives
    /// the same resolved result.
    pub async fn start(&self, cfg: AudioConfig) -> Result<NegotiatedConfig, StartError> {
        self.launch(cfg, LaunchKind::Start).await
    }

    /// Restart the engine. Plugins hosted by the engine are destroyed; the
    /// caller is responsible for reloading them afterwards.
    pub async fn restart(&self, cfg: AudioConfig) -> Result<NegotiatedConfig, StartError> {
        self.launch(cfg, LaunchKind::Restart).await
    }

    async fn launch(&self, cfg: AudioConfig, kind: LaunchKind) -> Result<NegotiatedConfig, StartError> {
        let handle = {
            let mut shared = self.inner.shared.lock().unwrap();
            if let Some(existing) = shared.in_flight.clone() {
                tracing::debug!("start already in flight; attaching");
                existing
            } else {
                let Some(req) = StartRequest::from_config(&cfg) else {
                    return Err(StartError::NotStartable);
                };
                shared.state = EngineState::Starting;
                shared.intent = Some(cfg.clone());
                let fut = Self::run_launch(self.inner.clone(), cfg, req, kind)
                    .boxed()
                    .shared();
                shared.in_flight = Some(fut.clone());
                self.inner.events.engine_state_changed(EngineState::Starting);
                fut
            }
        };
        handle.await
    }

    async fn run_launch(
        inner: Arc<Inner>,
        cfg: AudioConfig,
        req: StartRequest,
        kind: LaunchKind,
    ) -> Result<NegotiatedConfig, StartError> {
        tracing::info!(host = %req.host, kind = ?kind, "issuing engine start");
        let result = match kind {
            LaunchKind::Start => inner.transport.start(req).await,
            LaunchKind::Restart => inner.transport.restart(req).await,
        };

        match result {
            Ok(negotiated) => {
                {
                    let mut shared = inner.shared.lock().unwrap();
                    shared.state = EngineState::Running;
                    shared.negotiated = Some(negotiated);
                    shared.in_flight = None;
                }
                inner.events.engine_state_changed(EngineState::Running);
                tracing::info!(
                    sample_rate = negotiated.sample_rate,
                    buffer_size = negotiated.buffer_size,
                    "engine running"
                );

                if let Some(mismatch) = reconcile(&cfg, &negotiated) {
                    tracing::info!(
                        requested_sample_rate = ?mismatch.requested_sample_rate,
                        requested_buffer_size = ?mismatch.requested_buffer_size,
                        "driver negotiated different parameters"
                    );
                    inner.events.negotiation_adjusted(mismatch);
                }

                // Host-side toggles do not survive an engine (re)start.
                if let Some((left, right)) = cfg.input_channels {
                    if let Err(e) = inner.transport.set_input_channels(left, right).await {
                        tracing::warn!(error = %e, "failed to reapply input channel map");
                    }
                }
                if inner.global_mute.load(Ordering::Relaxed) {
                    if let Err(e) = inner.transport.set_global_mute(true).await {
                        tracing::warn!(error = %e, "failed to restore global mute");
                    }
                }

                Ok(negotiated)
            }
            Err(e) => {
                {
                    let mut shared = inner.shared.lock().unwrap();
                    shared.state = EngineState::Uninitialized;
                    shared.in_flight = None;
                }
                inner
                    .events
                    .engine_state_changed(EngineState::Uninitialized);
                tracing::warn!(error = %e, "engine start failed");
                Err(StartError::from(e))
            }
        }
    }

    /// Stop the engine stream.
    pub async fn stop(&self) -> Result<(), TransportError> {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.state = EngineState::Stopping;
        }
        self.inner.events.engine_state_changed(EngineState::Stopping);
        let result = self.inner.transport.stop().await;
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.state = EngineState::Uninitialized;
            shared.negotiated = None;
        }
        self.inner
            .events
            .engine_state_changed(EngineState::Uninitialized);
        result
    }

    /// Query the engine and adopt it if an external supervisor already warm
    /// started it, avoiding a redundant cold start.
    pub async fn adopt_if_running(&self) -> Result<Option<NegotiatedConfig>, TransportError> {
        let snapshot = self.inner.transport.engine_state().await?;
        if !snapshot.is_running {
            return Ok(None);
        }
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.state = EngineState::Running;
            shared.negotiated = snapshot.negotiated;
            if shared.intent.is_none() {
                shared.intent = self.inner.store.load();
            }
        }
        self.inner.events.engine_state_changed(EngineState::Running);
        tracing::info!(negotiated = ?snapshot.negotiated, "adopted warm-started engine");
        Ok(snapshot.negotiated)
    }

    /// Merge a partial update into the known configuration and persist it.
    ///
    /// Only this path mutates the persisted record; negotiated values never
    /// flow in here.
    pub fn apply_config(&self, patch: ConfigPatch) -> anyhow::Result<AudioConfig> {
        let mut cfg = {
            let shared = self.inner.shared.lock().unwrap();
            shared.intent.clone()
        }
        .or_else(|| self.inner.store.load())
        .unwrap_or_default();

        cfg.merge(patch);
        self.inner.store.save(&cfg)?;
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.intent = Some(cfg.clone());
        }
        self.inner.events.config_changed(cfg.clone());
        Ok(cfg)
    }

    /// Load a plugin, maintaining the in-flight marker for crash attribution.
    pub async fn load_plugin(&self, path: &Path) -> Result<PluginRecord, TransportError> {
        self.inner.session.begin_load(path);
        match self
            .inner
            .transport
            .load_plugin(&path.to_string_lossy())
            .await
        {
            Ok(loaded) => {
                let record = PluginRecord {
                    id: loaded.id,
                    path: path.to_path_buf(),
                };
                self.inner.session.finish_load(record.clone());
                Ok(record)
            }
            Err(e) => {
                // An ordinary rejection means the engine is alive; keep the
                // marker only for failures that may precede a crash report.
                if matches!(e, TransportError::Rejected(_)) {
                    self.inner.session.abort_load();
                }
                Err(e)
            }
        }
    }

    /// Unload a plugin instance.
    pub async fn unload_plugin(&self, id: &str) -> Result<(), TransportError> {
        self.inner.transport.unload_plugin(id).await?;
        self.inner.session.remove(id);
        Ok(())
    }

    /// Reorder the processing chain.
    pub async fn reorder_plugins(&self, order: Vec<String>) -> Result<(), TransportError> {
        self.inner.transport.reorder_plugins(order.clone()).await?;
        self.inner.session.set_order(&order);
        Ok(())
    }

    /// Mute or unmute the engine output; remembered across restarts.
    pub async fn set_global_mute(&self, active: bool) -> Result<(), TransportError> {
        self.inner.global_mute.store(active, Ordering::Relaxed);
        self.inner.transport.set_global_mute(active).await
    }

    /// Route capture channels to the stereo processing pair.
    pub async fn set_input_channels(&self, left: u16, right: u16) -> Result<(), TransportError> {
        self.inner.transport.set_input_channels(left, right).await
    }

    /// Record a fatal engine termination in the state machine.
    pub(crate) fn mark_crashed(&self) {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.state = EngineState::Crashed;
            shared.negotiated = None;
            shared.in_flight = None;
        }
        self.inner.events.engine_state_changed(EngineState::Crashed);
    }

    /// The last persisted configuration, if any.
    pub fn persisted_config(&self) -> Option<AudioConfig> {
        self.inner.store.load()
    }
}
