//! Bounded automatic recovery from device-level stream faults.
//!
//! Recoverable stream errors trigger restart attempts with linear backoff.
//! Rapid repeats of the same fault are debounced down to one scheduled
//! attempt, and the whole cycle gives up after a fixed number of failures.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::lifecycle::EngineLifecycleController;

/// Maximum automatic restart attempts before giving up.
pub const MAX_RETRIES: u32 = 3;

/// Base backoff step; attempt `n` waits `n * RETRY_BACKOFF`.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(2000);

/// Substring marking an engine notification as a recoverable device fault.
const DEVICE_FAULT_PATTERN: &str = "Stream Error";

#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    retry_scheduled: bool,
}

struct MonitorInner {
    controller: EngineLifecycleController,
    retry: Mutex<RetryState>,
}

/// Reacts to recoverable stream errors with bounded, backing-off restarts.
#[derive(Clone)]
pub struct StreamHealthMonitor {
    inner: Arc<MonitorInner>,
}

impl StreamHealthMonitor {
    pub fn new(controller: EngineLifecycleController) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                controller,
                retry: Mutex::new(RetryState::default()),
            }),
        }
    }

    /// Whether a stream-error message matches the known device-fault shape.
    pub fn is_recoverable(message: &str) -> bool {
        message.contains(DEVICE_FAULT_PATTERN)
    }

    /// Handle a stream-error notification from the engine.
    ///
    /// Non-matching messages are ignored. A qualifying error schedules one
    /// restart after `attempts * 2s`, unless a retry is already pending
    /// (debounce) or the retry budget is exhausted.
    pub fn handle_stream_error(&self, message: &str) {
        if !Self::is_recoverable(message) {
            tracing::debug!(message, "ignoring non-recoverable stream notification");
            return;
        }

        let (attempt, delay) = {
            let mut retry = self.inner.retry.lock().unwrap();
            if retry.retry_scheduled {
                tracing::debug!("restart already scheduled; debouncing repeated error");
                return;
            }
            retry.attempts += 1;
            if retry.attempts > MAX_RETRIES {
                retry.attempts = 0;
                drop(retry);
                tracing::error!(
                    max_retries = MAX_RETRIES,
                    "stream error retries exhausted; giving up"
                );
                self.inner.controller.events().stream_retries_exhausted(format!(
                    "audio stream failed after {MAX_RETRIES} automatic restarts: {message}"
                ));
                return;
            }
            retry.retry_scheduled = true;
            (retry.attempts, RETRY_BACKOFF * retry.attempts)
        };

        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            message,
            "stream error; scheduling automatic restart"
        );
        self.inner
            .controller
            .events()
            .stream_retry_scheduled(attempt, delay.as_millis() as u64);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let cfg = inner.controller.persisted_config().unwrap_or_default();
            let result = inner.controller.restart(cfg).await;
            let mut retry = inner.retry.lock().unwrap();
            retry.retry_scheduled = false;
            match result {
                Ok(negotiated) => {
                    retry.attempts = 0;
                    tracing::info!(
                        sample_rate = negotiated.sample_rate,
                        buffer_size = negotiated.buffer_size,
                        "automatic restart succeeded"
                    );
                }
                Err(e) => {
                    // No immediate follow-up: if the device is still faulty
                    // the next stream error re-enters the cycle with the
                    // incremented counter.
                    tracing::warn!(attempt, error = %e, "automatic restart failed");
                }
            }
        });
    }

    /// Attempt count, exposed for diagnostics.
    pub fn attempts(&self) -> u32 {
        self.inner.retry.lock().unwrap().attempts
    }
}
