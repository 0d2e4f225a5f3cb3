//! Fatal-crash handling: attribution, restart, and session restore.
//!
//! When the engine dies, the load that was in flight at that moment is the
//! prime suspect. The coordinator snapshots that marker, surfaces it with the
//! crash notification, and later replays the prior plugin session according
//! to the recovery mode the caller picked.

use std::path::PathBuf;

use crate::lifecycle::EngineLifecycleController;

/// How to treat the prior plugin session when recovering from a crash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Reload every plugin except the one suspected of causing the crash.
    ExcludeSuspect,
    /// Reload the full prior session, suspect included.
    ReloadAll,
    /// Restart the engine with an empty chain.
    Discard,
}

/// Result of a recovery pass.
#[derive(Clone, Debug)]
pub struct RecoveryReport {
    pub mode: RecoveryMode,
    /// Plugins successfully reloaded.
    pub restored: usize,
    /// The suspect that was deliberately left out, if any.
    pub skipped: Option<PathBuf>,
    /// Combined diagnostic when part of the sequence failed.
    pub diagnostic: Option<String>,
}

/// Drives crash attribution and the subsequent restart-and-restore pass.
#[derive(Clone)]
pub struct CrashRecoveryCoordinator {
    controller: EngineLifecycleController,
}

impl CrashRecoveryCoordinator {
    pub fn new(controller: EngineLifecycleController) -> Self {
        Self { controller }
    }

    /// Handle a fatal engine termination.
    ///
    /// Snapshots the in-flight load marker as the suspected cause, moves the
    /// state machine to Crashed, and publishes the crash with attribution.
    /// Recovery itself is a separate, caller-initiated step.
    pub fn on_fatal(&self, diagnostic: &str) {
        let suspect = self.controller.session().capture_crash();
        self.controller.mark_crashed();
        match &suspect {
            Some(path) => tracing::error!(
                diagnostic,
                suspect = %path.display(),
                "engine crashed during plugin load"
            ),
            None => tracing::error!(diagnostic, "engine crashed"),
        }
        self.controller
            .events()
            .engine_crashed(diagnostic.to_string(), suspect);
    }

    /// Restart the engine and restore the prior session per `mode`.
    ///
    /// The restart uses the last persisted configuration. A failed restart
    /// does not abort the pass: the transport may bring the engine back on
    /// the next command, so reloads are still attempted and every failure is
    /// folded into one combined diagnostic.
    pub async fn recover(&self, mode: RecoveryMode) -> RecoveryReport {
        tracing::info!(mode = ?mode, "starting crash recovery");
        let mut failures: Vec<String> = Vec::new();

        let cfg = self.controller.persisted_config().unwrap_or_default();
        if let Err(e) = self.controller.restart(cfg).await {
            failures.push(format!("engine restart: {e}"));
        }

        let suspect = self.controller.session().take_crash_cause();
        let prior = self.controller.session().last_session();
        let (to_restore, skipped) = match mode {
            RecoveryMode::Discard => (Vec::new(), None),
            RecoveryMode::ReloadAll => (prior, None),
            RecoveryMode::ExcludeSuspect => match suspect {
                Some(path) => (
                    prior.into_iter().filter(|p| p.path != path).collect(),
                    Some(path),
                ),
                None => (prior, None),
            },
        };

        let mut restored = 0;
        for record in to_restore {
            match self.controller.load_plugin(&record.path).await {
                Ok(_) => restored += 1,
                Err(e) => failures.push(format!("reload {}: {e}", record.path.display())),
            }
        }

        let diagnostic = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };
        tracing::info!(
            mode = ?mode,
            restored,
            skipped = ?skipped,
            diagnostic = ?diagnostic,
            "crash recovery finished"
        );
        self.controller.events().recovery_finished(
            mode,
            restored,
            skipped.clone(),
            diagnostic.clone(),
        );
        RecoveryReport {
            mode,
            restored,
            skipped,
            diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use crate::config::ConfigPatch;
    use crate::events::{EventBus, HostEvent};
    use crate::lifecycle::EngineState;
    use crate::session::PluginSession;
    use crate::test_support::{MockTransport, temp_config_store};
    use crate::transport::TransportError;

    fn make_coordinator(
        transport: Arc<MockTransport>,
        tag: &str,
    ) -> (CrashRecoveryCoordinator, EngineLifecycleController) {
        let controller = EngineLifecycleController::new(
            transport,
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
        (CrashRecoveryCoordinator::new(controller.clone()), controller)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<HostEvent>) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Load one plugin successfully, then crash the engine mid-load of a second.
    async fn crash_during_load(
        transport: &MockTransport,
        coordinator: &CrashRecoveryCoordinator,
        controller: &EngineLifecycleController,
    ) {
        controller
            .load_plugin(Path::new("/plugins/eq.vst3"))
            .await
            .unwrap();
        transport.queue_load_result(Err(TransportError::Io("pipe closed".to_string())));
        controller
            .load_plugin(Path::new("/plugins/reverb.vst3"))
            .await
            .unwrap_err();
        coordinator.on_fatal("engine exited unexpectedly");
    }

    #[tokio::test]
    async fn fatal_error_attributes_in_flight_load() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-attr");
        let mut rx = controller.events().subscribe();

        crash_during_load(&transport, &coordinator, &controller).await;

        assert_eq!(controller.state(), EngineState::Crashed);
        let crashed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::EngineCrashed {
                    suspected_plugin, ..
                } => Some(suspected_plugin),
                _ => None,
            })
            .collect();
        assert_eq!(
            crashed,
            vec![Some(PathBuf::from("/plugins/reverb.vst3"))]
        );
    }

    #[tokio::test]
    async fn fatal_error_without_pending_load_has_no_suspect() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-nosuspect");
        let mut rx = controller.events().subscribe();

        coordinator.on_fatal("engine exited unexpectedly");

        let crashed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::EngineCrashed {
                    suspected_plugin, ..
                } => Some(suspected_plugin),
                _ => None,
            })
            .collect();
        assert_eq!(crashed, vec![None]);
    }

    #[tokio::test]
    async fn exclude_suspect_reloads_everything_else() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-exclude");
        crash_during_load(&transport, &coordinator, &controller).await;

        let report = coordinator.recover(RecoveryMode::ExcludeSuspect).await;

        assert_eq!(report.restored, 1);
        assert_eq!(report.skipped, Some(PathBuf::from("/plugins/reverb.vst3")));
        assert_eq!(report.diagnostic, None);
        assert_eq!(transport.restart_calls.lock().unwrap().len(), 1);
        // Setup loads eq then reverb; recovery reloads only eq.
        assert_eq!(
            *transport.load_calls.lock().unwrap(),
            vec![
                "/plugins/eq.vst3",
                "/plugins/reverb.vst3",
                "/plugins/eq.vst3"
            ]
        );
        assert_eq!(controller.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn reload_all_restores_the_suspect_too() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-all");
        crash_during_load(&transport, &coordinator, &controller).await;

        let report = coordinator.recover(RecoveryMode::ReloadAll).await;

        // Only eq was in the live list; reverb never finished loading.
        assert_eq!(report.restored, 1);
        assert_eq!(report.skipped, None);
        assert_eq!(controller.session().loaded().len(), 1);
    }

    #[tokio::test]
    async fn discard_restarts_with_empty_chain() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-discard");
        crash_during_load(&transport, &coordinator, &controller).await;
        let loads_before = transport.load_calls.lock().unwrap().len();

        let report = coordinator.recover(RecoveryMode::Discard).await;

        assert_eq!(report.restored, 0);
        assert_eq!(transport.restart_calls.lock().unwrap().len(), 1);
        assert_eq!(transport.load_calls.lock().unwrap().len(), loads_before);
        assert!(controller.session().loaded().is_empty());
    }

    #[tokio::test]
    async fn failed_restart_still_attempts_restore_and_reports_combined_diagnostic() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-partial");
        crash_during_load(&transport, &coordinator, &controller).await;
        transport.queue_restart_result(Err(TransportError::Rejected(
            "device unavailable".to_string(),
        )));
        let mut rx = controller.events().subscribe();

        let report = coordinator.recover(RecoveryMode::ExcludeSuspect).await;

        // Reload still ran (default mock result succeeds).
        assert_eq!(report.restored, 1);
        let diagnostic = report.diagnostic.unwrap();
        assert!(diagnostic.contains("engine restart"));
        assert!(diagnostic.contains("device unavailable"));
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, HostEvent::RecoveryFinished { .. }))
        );
    }

    #[tokio::test]
    async fn crash_cause_does_not_leak_into_the_next_crash() {
        let transport = MockTransport::new();
        let (coordinator, controller) = make_coordinator(transport.clone(), "crash-oneshot");
        crash_during_load(&transport, &coordinator, &controller).await;
        coordinator.recover(RecoveryMode::ExcludeSuspect).await;
        let mut rx = controller.events().subscribe();

        coordinator.on_fatal("second crash");

        let crashed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::EngineCrashed {
                    suspected_plugin, ..
                } => Some(suspected_plugin),
                _ => None,
            })
            .collect();
        assert_eq!(crashed, vec![None]);
    }
}
