//! Shared test doubles for coordinator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use engine_protocol::{DeviceInfo, EngineEvent, NegotiatedConfig};

use crate::transport::{
    EngineStateSnapshot, EngineTransport, LoadedPlugin, StartRequest, TransportError,
};

/// Scriptable engine transport that records every call.
pub(crate) struct MockTransport {
    pub start_calls: Mutex<Vec<StartRequest>>,
    pub restart_calls: Mutex<Vec<StartRequest>>,
    pub stop_calls: AtomicUsize,
    pub input_channel_calls: Mutex<Vec<(u16, u16)>>,
    pub mute_calls: Mutex<Vec<bool>>,
    pub load_calls: Mutex<Vec<String>>,
    pub unload_calls: Mutex<Vec<String>>,
    pub reorder_calls: Mutex<Vec<Vec<String>>>,
    pub device_list_calls: AtomicUsize,
    /// Queued results; when empty, calls succeed with defaults.
    pub start_results: Mutex<VecDeque<Result<NegotiatedConfig, TransportError>>>,
    pub restart_results: Mutex<VecDeque<Result<NegotiatedConfig, TransportError>>>,
    pub load_results: Mutex<VecDeque<Result<LoadedPlugin, TransportError>>>,
    pub state_snapshot: Mutex<EngineStateSnapshot>,
    pub devices: Mutex<Vec<DeviceInfo>>,
    /// Artificial latency for start/restart, to exercise concurrency.
    pub start_delay: Mutex<Option<Duration>>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            start_calls: Mutex::new(Vec::new()),
            restart_calls: Mutex::new(Vec::new()),
            stop_calls: AtomicUsize::new(0),
            input_channel_calls: Mutex::new(Vec::new()),
            mute_calls: Mutex::new(Vec::new()),
            load_calls: Mutex::new(Vec::new()),
            unload_calls: Mutex::new(Vec::new()),
            reorder_calls: Mutex::new(Vec::new()),
            device_list_calls: AtomicUsize::new(0),
            start_results: Mutex::new(VecDeque::new()),
            restart_results: Mutex::new(VecDeque::new()),
            load_results: Mutex::new(VecDeque::new()),
            state_snapshot: Mutex::new(EngineStateSnapshot::default()),
            devices: Mutex::new(Vec::new()),
            start_delay: Mutex::new(None),
            events_tx,
        })
    }

    pub fn default_negotiated() -> NegotiatedConfig {
        NegotiatedConfig {
            sample_rate: 48000,
            buffer_size: 256,
        }
    }

    pub fn queue_start_result(&self, result: Result<NegotiatedConfig, TransportError>) {
        self.start_results.lock().unwrap().push_back(result);
    }

    pub fn queue_restart_result(&self, result: Result<NegotiatedConfig, TransportError>) {
        self.restart_results.lock().unwrap().push_back(result);
    }

    pub fn queue_load_result(&self, result: Result<LoadedPlugin, TransportError>) {
        self.load_results.lock().unwrap().push_back(result);
    }

    /// Push a notification to all subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn apply_start_delay(&self) {
        let delay = *self.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EngineTransport for MockTransport {
    async fn start(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError> {
        self.start_calls.lock().unwrap().push(req);
        self.apply_start_delay().await;
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Self::default_negotiated()))
    }

    async fn restart(&self, req: StartRequest) -> Result<NegotiatedConfig, TransportError> {
        self.restart_calls.lock().unwrap().push(req);
        self.apply_start_delay().await;
        self.restart_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Self::default_negotiated()))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn engine_state(&self) -> Result<EngineStateSnapshot, TransportError> {
        Ok(self.state_snapshot.lock().unwrap().clone())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        self.device_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn set_input_channels(&self, left: u16, right: u16) -> Result<(), TransportError> {
        self.input_channel_calls.lock().unwrap().push((left, right));
        Ok(())
    }

    async fn set_global_mute(&self, active: bool) -> Result<(), TransportError> {
        self.mute_calls.lock().unwrap().push(active);
        Ok(())
    }

    async fn load_plugin(&self, path: &str) -> Result<LoadedPlugin, TransportError> {
        let count = {
            let mut calls = self.load_calls.lock().unwrap();
            calls.push(path.to_string());
            calls.len()
        };
        self.load_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(LoadedPlugin {
                    id: format!("plugin-{count}"),
                    name: format!("Plugin {count}"),
                    vendor: "Test".to_string(),
                })
            })
    }

    async fn unload_plugin(&self, id: &str) -> Result<(), TransportError> {
        self.unload_calls.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn reorder_plugins(&self, order: Vec<String>) -> Result<(), TransportError> {
        self.reorder_calls.lock().unwrap().push(order);
        Ok(())
    }

    fn notifications(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }
}

/// A config store backed by a unique temp file.
pub(crate) fn temp_config_store(tag: &str) -> crate::config::ConfigStore {
    let path = std::env::temp_dir().join(format!(
        "engine-host-{tag}-{}.toml",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    crate::config::ConfigStore::new(path)
}
