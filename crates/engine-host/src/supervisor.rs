//! Routes asynchronous engine notifications to their handlers.
//!
//! One background task per transport: stream errors go to the health
//! monitor, fatal errors to the crash coordinator, everything else to the
//! log and the host event bus.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use engine_protocol::{EngineEvent, NegotiatedConfig};

use crate::crash_recovery::CrashRecoveryCoordinator;
use crate::lifecycle::EngineLifecycleController;
use crate::stream_health::StreamHealthMonitor;
use crate::transport::EngineTransport;

/// Spawn the notification pump. Runs until cancelled or the transport's
/// notification channel closes.
pub fn spawn_notification_router(
    transport: Arc<dyn EngineTransport>,
    controller: EngineLifecycleController,
    health: StreamHealthMonitor,
    recovery: CrashRecoveryCoordinator,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = transport.notifications();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("notification router shutting down");
                    break;
                }
                msg = rx.recv() => match msg {
                    Ok(EngineEvent::StreamError(message)) => {
                        health.handle_stream_error(&message);
                    }
                    Ok(EngineEvent::FatalError(diagnostic)) => {
                        recovery.on_fatal(&diagnostic);
                    }
                    Ok(EngineEvent::Started { sample_rate, buffer_size }) => {
                        tracing::info!(sample_rate, buffer_size, "engine reported stream start");
                        controller.events().engine_started(NegotiatedConfig {
                            sample_rate,
                            buffer_size,
                        });
                    }
                    Ok(EngineEvent::Log(line)) => {
                        tracing::info!(target: "engine", "{line}");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notification channel lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("notification channel closed");
                        break;
                    }
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ConfigPatch;
    use crate::events::{EventBus, HostEvent};
    use crate::lifecycle::EngineState;
    use crate::session::PluginSession;
    use crate::test_support::{MockTransport, temp_config_store};

    struct Fixture {
        transport: Arc<MockTransport>,
        controller: EngineLifecycleController,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_fixture(tag: &str) -> Fixture {
        let transport = MockTransport::new();
        let controller = EngineLifecycleController::new(
            transport.clone(),
            temp_config_store(tag),
            EventBus::new(),
            PluginSession::new(),
        );
        controller
            .apply_config(ConfigPatch {
                host: Some("ASIO".to_string()),
                ..ConfigPatch::default()
            })
            .unwrap();
        let token = CancellationToken::new();
        let handle = spawn_notification_router(
            transport.clone(),
            controller.clone(),
            StreamHealthMonitor::new(controller.clone()),
            CrashRecoveryCoordinator::new(controller.clone()),
            token.clone(),
        );
        Fixture {
            transport,
            controller,
            token,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stream_errors_reach_the_health_monitor() {
        let fixture = spawn_fixture("router-stream");
        let mut rx = fixture.controller.events().subscribe();

        fixture
            .transport
            .emit(EngineEvent::StreamError("Stream Error: glitch".to_string()));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(fixture.transport.restart_calls.lock().unwrap().len(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(HostEvent::StreamRetryScheduled { attempt: 1, .. })
        ));
        fixture.token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_reach_the_crash_coordinator() {
        let fixture = spawn_fixture("router-fatal");

        fixture
            .transport
            .emit(EngineEvent::FatalError("engine died".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fixture.controller.state(), EngineState::Crashed);
        fixture.token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn started_notifications_are_republished() {
        let fixture = spawn_fixture("router-started");
        let mut rx = fixture.controller.events().subscribe();

        fixture.transport.emit(EngineEvent::Started {
            sample_rate: 44100,
            buffer_size: 512,
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        match rx.try_recv() {
            Ok(HostEvent::EngineStarted(negotiated)) => {
                assert_eq!(negotiated.sample_rate, 44100);
                assert_eq!(negotiated.buffer_size, 512);
            }
            other => panic!("unexpected: {other:?}"),
        }
        fixture.token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_router() {
        let fixture = spawn_fixture("router-cancel");

        fixture.token.cancel();
        fixture.handle.await.unwrap();
    }
}
