//! Persisted audio configuration and its on-disk store.
//!
//! Holds the canonical record of user intent. Negotiated values reported by
//! the engine are never written back here; the record changes only through
//! explicit, user-confirmed mutations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Largest buffer size we will ever persist, in frames. Stored values above
/// this are treated as corrupt.
pub const MAX_BUFFER_SIZE: u32 = 4096;

/// Buffer size a corrupt record is reset to on load.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Current on-disk schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Canonical description of how the engine should run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Schema version of the record. Records written before versioning
    /// deserialize as 0 and rely on the buffer-size sanity clamp.
    #[serde(default)]
    pub schema_version: u32,
    /// Driver/backend identifier (e.g. `ASIO`). Required for a start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Capture device name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Render device name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    /// Stable capture device id, preferred over the name when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device_id: Option<String>,
    /// Stable render device id, preferred over the name when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device_id: Option<String>,
    /// Requested sample rate in Hz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Requested buffer size in frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,
    /// Capture channel indices routed to the stereo pair (left, right).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_channels: Option<(u16, u16)>,
}

impl AudioConfig {
    /// Whether the record carries enough information to start the engine.
    pub fn is_startable(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Apply a partial update: present fields override, absent fields keep
    /// their prior values.
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(host) = patch.host {
            self.host = Some(host);
        }
        if let Some(input_device) = patch.input_device {
            self.input_device = input_device;
        }
        if let Some(output_device) = patch.output_device {
            self.output_device = output_device;
        }
        if let Some(input_device_id) = patch.input_device_id {
            self.input_device_id = input_device_id;
        }
        if let Some(output_device_id) = patch.output_device_id {
            self.output_device_id = output_device_id;
        }
        if let Some(sample_rate) = patch.sample_rate {
            self.sample_rate = Some(sample_rate);
        }
        if let Some(buffer_size) = patch.buffer_size {
            self.buffer_size = Some(buffer_size);
        }
        if let Some(input_channels) = patch.input_channels {
            self.input_channels = Some(input_channels);
        }
    }
}

/// Partial configuration update from a user-confirmed action.
///
/// Device fields use a double `Option` so a patch can clear a selection
/// (`Some(None)`) as well as leave it untouched (`None`).
#[derive(Clone, Debug, Default)]
pub struct ConfigPatch {
    pub host: Option<String>,
    pub input_device: Option<Option<String>>,
    pub output_device: Option<Option<String>>,
    pub input_device_id: Option<Option<String>>,
    pub output_device_id: Option<Option<String>>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    pub input_channels: Option<(u16, u16)>,
}

/// TOML-backed store for the [`AudioConfig`] record.
///
/// Writes are whole-record, last-write-wins. A malformed record is treated as
/// absent, never as a fatal error.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted record, sanitizing out-of-range values.
    ///
    /// Returns `None` when the file is missing or unparseable.
    pub fn load(&self) -> Option<AudioConfig> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "config read failed; treating as absent");
                return None;
            }
        };
        let mut cfg = match toml::from_str::<AudioConfig>(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "config parse failed; treating as absent");
                return None;
            }
        };
        sanitize(&mut cfg);
        Some(cfg)
    }

    /// Persist the record, overwriting any previous contents.
    pub fn save(&self, cfg: &AudioConfig) -> Result<()> {
        let mut cfg = cfg.clone();
        cfg.schema_version = CONFIG_SCHEMA_VERSION;
        let raw = toml::to_string_pretty(&cfg)
            .with_context(|| format!("serialize config {:?}", self.path))?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("create config dir {dir:?}"))?;
        }
        std::fs::write(&self.path, raw).with_context(|| format!("write config {:?}", self.path))?;
        Ok(())
    }
}

/// Reset structurally invalid fields to defaults.
fn sanitize(cfg: &mut AudioConfig) {
    if let Some(buffer_size) = cfg.buffer_size {
        if buffer_size == 0 || buffer_size > MAX_BUFFER_SIZE {
            tracing::warn!(
                buffer_size,
                reset_to = DEFAULT_BUFFER_SIZE,
                "persisted buffer size out of range; resetting"
            );
            cfg.buffer_size = Some(DEFAULT_BUFFER_SIZE);
        }
    }
    if let Some(sample_rate) = cfg.sample_rate {
        if sample_rate == 0 {
            cfg.sample_rate = None;
        }
    }
}
