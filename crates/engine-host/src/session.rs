//! Plugin session bookkeeping and crash attribution markers.
//!
//! Tracks which plugins are live in the engine, which load is in flight, and
//! the one-shot snapshot of the load that was in flight when the engine died.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A plugin instance the session considers loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginRecord {
    /// Instance id assigned by the engine.
    pub id: String,
    /// Filesystem path the plugin was loaded from.
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct SessionInner {
    loaded: Vec<PluginRecord>,
    /// Path of the load currently in flight, if any.
    pending_load: Option<PathBuf>,
    /// Snapshot of `pending_load` captured at crash time. Consumed once.
    crash_cause: Option<PathBuf>,
    /// Plugin list as it stood when the last crash was detected.
    last_session: Vec<PluginRecord>,
}

/// Shared, mutable view of the plugin session.
#[derive(Clone, Default)]
pub struct PluginSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl PluginSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a plugin load as in flight. Called immediately before the remote
    /// load command is issued.
    pub fn begin_load(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_load = Some(path.to_path_buf());
    }

    /// Record a completed load and clear the in-flight marker.
    pub fn finish_load(&self, record: PluginRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_load = None;
        inner.loaded.push(record);
    }

    /// Clear the in-flight marker after a load the engine rejected without
    /// crashing. A stale marker would misattribute a later crash.
    pub fn abort_load(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_load = None;
    }

    /// Remove a plugin from the live list.
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.loaded.retain(|p| p.id != id);
    }

    /// Reorder the live list to match the given instance id order. Ids not
    /// present in the list are ignored.
    pub fn set_order(&self, order: &[String]) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .loaded
            .sort_by_key(|p| order.iter().position(|id| *id == p.id).unwrap_or(usize::MAX));
    }

    /// Snapshot of the live plugin list.
    pub fn loaded(&self) -> Vec<PluginRecord> {
        self.inner.lock().unwrap().loaded.clone()
    }

    /// Capture crash state: snapshot the in-flight marker as the suspected
    /// cause, stash the live list as the prior session, and reset both.
    ///
    /// Returns the suspected cause for immediate surfacing; the same value
    /// stays available to [`PluginSession::take_crash_cause`] exactly once.
    pub fn capture_crash(&self) -> Option<PathBuf> {
        let mut inner = self.inner.lock().unwrap();
        inner.crash_cause = inner.pending_load.take();
        inner.last_session = std::mem::take(&mut inner.loaded);
        inner.crash_cause.clone()
    }

    /// Consume the crash-cause snapshot. Subsequent calls return `None`.
    pub fn take_crash_cause(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().crash_cause.take()
    }

    /// The plugin list as it stood at the last crash.
    pub fn last_session(&self) -> Vec<PluginRecord> {
        self.inner.lock().unwrap().last_session.clone()
    }
}
