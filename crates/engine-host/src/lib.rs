//! Coordinator for a sidecar audio engine process.
//!
//! Owns the persisted audio configuration, drives the engine lifecycle with a
//! single-in-flight start guarantee, retries recoverable stream faults with
//! bounded backoff, and attributes fatal crashes to the plugin load that was
//! in flight when the engine died.

pub mod buffer_sizes;
pub mod config;
pub mod crash_recovery;
pub mod devices;
pub mod events;
pub mod lifecycle;
pub mod negotiation;
pub mod process;
pub mod session;
pub mod stream_health;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AudioConfig, ConfigPatch, ConfigStore};
pub use crash_recovery::{CrashRecoveryCoordinator, RecoveryMode, RecoveryReport};
pub use devices::DeviceCatalog;
pub use events::{EventBus, HostEvent};
pub use lifecycle::{EngineLifecycleController, EngineState, StartError};
pub use negotiation::NegotiationMismatch;
pub use process::ProcessTransport;
pub use session::{PluginRecord, PluginSession};
pub use stream_health::StreamHealthMonitor;
pub use supervisor::spawn_notification_router;
pub use transport::{EngineTransport, StartRequest, TransportError};
