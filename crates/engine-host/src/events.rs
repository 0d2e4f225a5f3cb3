//! In-process event bus for coordinator updates.
//!
//! Consumers subscribe explicitly; there is no ambient global bus. Sends are
//! best-effort: an event with no subscribers is dropped.

use std::path::PathBuf;

use tokio::sync::broadcast;

use engine_protocol::NegotiatedConfig;

use crate::config::AudioConfig;
use crate::crash_recovery::RecoveryMode;
use crate::lifecycle::EngineState;
use crate::negotiation::NegotiationMismatch;

/// Events published by the coordinator.
#[derive(Clone, Debug)]
pub enum HostEvent {
    /// The persisted configuration changed through a user-confirmed action.
    ConfigChanged(AudioConfig),
    /// The engine lifecycle state machine transitioned.
    EngineStateChanged(EngineState),
    /// The driver granted different parameters than requested. Informational.
    NegotiationAdjusted(NegotiationMismatch),
    /// An automatic restart was scheduled after a recoverable stream error.
    StreamRetryScheduled { attempt: u32, delay_ms: u64 },
    /// Automatic restarts are exhausted; manual intervention required.
    StreamRetriesExhausted { message: String },
    /// The engine terminated fatally.
    EngineCrashed {
        diagnostic: String,
        suspected_plugin: Option<PathBuf>,
    },
    /// A crash recovery pass finished.
    RecoveryFinished {
        mode: RecoveryMode,
        restored: usize,
        skipped: Option<PathBuf>,
        /// Combined diagnostic when part of the sequence failed.
        diagnostic: Option<String>,
    },
    /// The engine confirmed its stream is running.
    EngineStarted(NegotiatedConfig),
}

/// Broadcast bus for [`HostEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HostEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }

    /// Notify subscribers that the persisted configuration changed.
    pub fn config_changed(&self, cfg: AudioConfig) {
        let _ = self.sender.send(HostEvent::ConfigChanged(cfg));
    }

    /// Notify subscribers of a lifecycle state transition.
    pub fn engine_state_changed(&self, state: EngineState) {
        let _ = self.sender.send(HostEvent::EngineStateChanged(state));
    }

    /// Notify subscribers that negotiation adjusted the requested parameters.
    pub fn negotiation_adjusted(&self, mismatch: NegotiationMismatch) {
        let _ = self.sender.send(HostEvent::NegotiationAdjusted(mismatch));
    }

    /// Notify subscribers that an automatic restart is scheduled.
    pub fn stream_retry_scheduled(&self, attempt: u32, delay_ms: u64) {
        let _ = self
            .sender
            .send(HostEvent::StreamRetryScheduled { attempt, delay_ms });
    }

    /// Notify subscribers that automatic restarts are exhausted.
    pub fn stream_retries_exhausted(&self, message: String) {
        let _ = self
            .sender
            .send(HostEvent::StreamRetriesExhausted { message });
    }

    /// Notify subscribers of a fatal engine termination.
    pub fn engine_crashed(&self, diagnostic: String, suspected_plugin: Option<PathBuf>) {
        let _ = self.sender.send(HostEvent::EngineCrashed {
            diagnostic,
            suspected_plugin,
        });
    }

    /// Notify subscribers that a recovery pass finished.
    pub fn recovery_finished(
        &self,
        mode: RecoveryMode,
        restored: usize,
        skipped: Option<PathBuf>,
        diagnostic: Option<String>,
    ) {
        let _ = self.sender.send(HostEvent::RecoveryFinished {
            mode,
            restored,
            skipped,
            diagnostic,
        });
    }

    /// Notify subscribers that the engine stream is confirmed running.
    pub fn engine_started(&self, negotiated: NegotiatedConfig) {
        let _ = self.sender.send(HostEvent::EngineStarted(negotiated));
    }
}
