//! Cached audio device catalog.
//!
//! Device enumeration can take hundreds of milliseconds on some drivers, so
//! results are cached until the caller asks for a refresh.

use std::sync::Arc;

use engine_protocol::DeviceInfo;

use crate::buffer_sizes::resolve_buffer_sizes;
use crate::transport::{EngineTransport, TransportError};

/// Device list with caching and per-device buffer-size option resolution.
#[derive(Clone)]
pub struct DeviceCatalog {
    transport: Arc<dyn EngineTransport>,
    cache: Arc<tokio::sync::Mutex<Option<Vec<DeviceInfo>>>>,
}

impl DeviceCatalog {
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self {
            transport,
            cache: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// All devices, from cache unless `force_refresh` is set or the cache is
    /// cold.
    pub async fn devices(&self, force_refresh: bool) -> Result<Vec<DeviceInfo>, TransportError> {
        let mut cache = self.cache.lock().await;
        if force_refresh || cache.is_none() {
            let devices = self.transport.list_devices().await?;
            tracing::debug!(count = devices.len(), force_refresh, "device list refreshed");
            *cache = Some(devices);
        }
        Ok(cache.clone().unwrap_or_default())
    }

    /// Capture devices only.
    pub async fn inputs(&self, force_refresh: bool) -> Result<Vec<DeviceInfo>, TransportError> {
        Ok(self
            .devices(force_refresh)
            .await?
            .into_iter()
            .filter(|d| d.is_input)
            .collect())
    }

    /// Playback devices only.
    pub async fn outputs(&self, force_refresh: bool) -> Result<Vec<DeviceInfo>, TransportError> {
        Ok(self
            .devices(force_refresh)
            .await?
            .into_iter()
            .filter(|d| !d.is_input)
            .collect())
    }

    /// Buffer sizes worth offering for the named output device.
    ///
    /// Matches by stable id first, then by name. An unknown device yields the
    /// resolution for "no reported range".
    pub async fn buffer_size_options(
        &self,
        device: &str,
        exclusive_mode: bool,
        active: Option<u32>,
    ) -> Result<Vec<u32>, TransportError> {
        let range = self
            .devices(false)
            .await?
            .into_iter()
            .filter(|d| !d.is_input)
            .find(|d| d.id.as_deref() == Some(device) || d.name == device)
            .and_then(|d| d.buffer_size_range);
        Ok(resolve_buffer_sizes(range, exclusive_mode, active))
    }
}
