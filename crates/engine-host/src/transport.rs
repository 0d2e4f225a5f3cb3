//! Remote command boundary to the engine process.
//!
//! Everything the coordinator knows about the engine flows through
//! [`EngineTransport`]; production code uses the sidecar process transport,
//! tests substitute a mock.

use async_trait::async_trait;
use tokio::sync::broadcast;

use engine_protocol::{DeviceInfo, EngineEvent, NegotiatedConfig};

use crate::config::AudioConfig;

/// Parameters for a start/restart command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartRequest {
    pub host: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub input_id: Option<String>,
    pub output_id: Option<String>,
    pub buffer_size: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl StartRequest {
    /// Build a start request from a configuration record.
    ///
    /// Returns `None` when the record is not startable (no host).
    pub fn from_config(cfg: &AudioConfig) -> Option<Self> {
        if !cfg.is_startable() {
            return None;
        }
        Some(Self {
            host: cfg.host.clone().unwrap_or_default(),
            input: cfg.input_device.clone(),
            output: cfg.output_device.clone(),
            input_id: cfg.input_device_id.clone(),
            output_id: cfg.output_device_id.clone(),
            buffer_size: cfg.buffer_size,
            sample_rate: cfg.sample_rate,
        })
    }
}

/// Engine state snapshot returned by a state query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStateSnapshot {
    pub is_running: bool,
    pub negotiated: Option<NegotiatedConfig>,
}

/// A plugin instance the engine reports as loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub id: String,
    pub name: String,
    pub vendor: String,
}

/// Errors crossing the transport boundary.
#[derive(Clone, Debug)]
pub enum TransportError {
    /// The engine rejected the command; carries its raw diagnostic.
    Rejected(String),
    /// The engine process or its pipes failed.
    Io(String),
    /// No reply arrived within the command timeout.
    Timeout,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Rejected(diag) => write!(f, "engine rejected command: {diag}"),
            TransportError::Io(e) => write!(f, "engine transport failure: {e}"),
            TransportError::Timeout => write!(f, "timed out waiting for engine reply"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Asynchronous command/notification boundary to the engine process.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Open the audio stream; resolves to the negotiated parameters.
    async fn start(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError>;

    /// Tear down and reopen the stream. Plugins hosted by the engine are
    /// destroyed and must be reloaded by the caller afterwards.
    async fn restart(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError>;

    /// Close the audio stream.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Query whether the engine is already running and with what parameters.
    async fn engine_state(&self) -> Result<EngineStateSnapshot, TransportError>;

    /// Enumerate audio devices.
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Route the given capture channels to the stereo processing pair.
    async fn set_input_channels(&self, left: u16, right: u16) -> Result<(), TransportError>;

    /// Mute or unmute the engine output.
    async fn set_global_mute(&self, active: bool) -> Result<(), TransportError>;

    /// Load a plugin from a filesystem path.
    async fn load_plugin(&self, path: &str) -> Result<LoadedPlugin, TransportError>;

    /// Unload a plugin instance.
    async fn unload_plugin(&self, id: &str) -> Result<(), TransportError>;

    /// Reorder the processing chain.
    async fn reorder_plugins(&self, order: Vec<String>) -> Result<(), TransportError>;

    /// Subscribe to asynchronously pushed engine notifications.
    fn notifications(&self) -> broadcast::Receiver<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_requires_host() {
        assert!(StartRequest::from_config(&AudioConfig::default()).is_none());
    }

    #[test]
    fn start_request_copies_config_fields() {
        let cfg = AudioConfig {
            host: Some("ASIO".to_string()),
            output_device: Some("Speakers".to_string()),
            output_device_id: Some("dev-42".to_string()),
            buffer_size: Some(256),
            sample_rate: Some(48000),
            ..AudioConfig::default()
        };

        let req = StartRequest::from_config(&cfg).unwrap();

        assert_eq!(req.host, "ASIO");
        assert_eq!(req.output.as_deref(), Some("Speakers"));
        assert_eq!(req.output_id.as_deref(), Some("dev-42"));
        assert_eq!(req.buffer_size, Some(256));
        assert_eq!(req.sample_rate, Some(48000));
    }
}
