//! Wire types for the audio engine sidecar protocol.
//!
//! The host and the engine process exchange newline-delimited JSON over the
//! engine's stdio: commands flow in, a single envelope type flows out carrying
//! either a command reply or an asynchronously pushed notification.

use serde::{Deserialize, Serialize};

/// Command sent from the host to the engine process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineCommand {
    /// Enumerate audio devices visible to the engine.
    GetDevices,
    /// Open the audio stream with the requested parameters.
    Start {
        host: String,
        input: Option<String>,
        output: Option<String>,
        input_id: Option<String>,
        output_id: Option<String>,
        buffer_size: Option<u32>,
        sample_rate: Option<u32>,
    },
    /// Tear down and reopen the stream. Plugin instances hosted by the
    /// engine do not survive this.
    Restart {
        host: String,
        input: Option<String>,
        output: Option<String>,
        input_id: Option<String>,
        output_id: Option<String>,
        buffer_size: Option<u32>,
        sample_rate: Option<u32>,
    },
    /// Close the audio stream.
    Stop,
    /// Query whether the engine is running and with what parameters.
    GetState,
    /// Route the given capture channels to the stereo processing pair.
    SetInputChannels { left: u16, right: u16 },
    /// Load a plugin from the given filesystem path.
    LoadPlugin { path: String },
    /// Unload a previously loaded plugin instance.
    UnloadPlugin { id: String },
    /// Reorder the processing chain to the given instance id order.
    ReorderPlugins { order: Vec<String> },
    /// Mute or unmute the engine output as a whole.
    SetGlobalMute { active: bool },
}

/// Reply to a single [`EngineCommand`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineResponse {
    /// Device enumeration result.
    Devices(Vec<DeviceInfo>),
    /// The stream is open; carries the parameters the driver actually granted.
    Started { sample_rate: u32, buffer_size: u32 },
    /// Current engine state snapshot.
    State {
        is_running: bool,
        sample_rate: Option<u32>,
        buffer_size: Option<u32>,
    },
    /// A plugin finished loading.
    PluginLoaded {
        id: String,
        name: String,
        vendor: String,
    },
    /// Command succeeded with no payload.
    Success,
    /// Command rejected; the string is the engine's diagnostic.
    Error(String),
}

/// Notification pushed by the engine outside of any request/response pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// The stream (re)opened, e.g. after a driver-initiated reset.
    Started { sample_rate: u32, buffer_size: u32 },
    /// A device-level stream fault. May be recoverable by restarting.
    StreamError(String),
    /// The engine is going down and cannot continue. Hosted plugins are lost.
    FatalError(String),
    /// Free-form log line forwarded from the engine.
    Log(String),
}

/// Envelope for everything the engine writes to its stdout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EngineMessage {
    Response(EngineResponse),
    Event(EngineEvent),
}

/// Audio device as reported by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-friendly device name.
    pub name: String,
    /// Driver/backend the device belongs to (e.g. `ASIO`, `WASAPI`).
    pub host: String,
    /// `true` for capture devices.
    pub is_input: bool,
    /// Channel count.
    pub channels: u16,
    /// Supported buffer size range in frames, if the driver reports one.
    pub buffer_size_range: Option<(u32, u32)>,
    /// Stable device identifier, preferred over `name` when present.
    pub id: Option<String>,
}

/// Operating parameters the engine actually negotiated with the driver.
///
/// Ephemeral: used for display and mismatch detection, never persisted as
/// user preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedConfig {
    /// Granted sample rate in Hz.
    pub sample_rate: u32,
    /// Granted buffer size in frames.
    pub buffer_size: u32,
}
