//! Post-grant restart coordination.
//!
//! Some grants only take effect in a freshly launched process. After the
//! first acquisition pass grants such a kind, [`RestartCoordinator`] writes
//! the `restart_completed` marker and walks the strategy cascade until one
//! succeeds. It attempts at most once per process and never after a
//! relaunch, which is what keeps restarts from looping.

mod strategy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{error, info, warn};

use permctl_core::Error;

use crate::first_run::FirstRunState;
use crate::orchestrator::EnsureReport;
use crate::startup::LaunchContext;

pub use strategy::{
    BundleRelaunch, Entrypoint, ExecInPlace, ExitProcess, ProcessExit, RESTART_ENV_VAR,
    RestartStrategy, SpawnAndExit, bundle_for_exe, default_cascade,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartState {
    Stable,
    AwaitingRestart,
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    PermissionKindRequiresRelaunch,
    None,
}

/// Computed on demand; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartDecision {
    pub required: bool,
    pub reason: RestartReason,
}

impl RestartDecision {
    const NOT_REQUIRED: Self = Self {
        required: false,
        reason: RestartReason::None,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    NotRequired,
    /// A strategy started the new instance and exit was requested.
    Relaunched { strategy: &'static str },
    /// Every strategy failed; the current process keeps running.
    Unavailable,
}

pub struct RestartCoordinator {
    markers: FirstRunState,
    strategies: Vec<Box<dyn RestartStrategy>>,
    exit: Arc<dyn ProcessExit>,
    enabled: bool,
    launch: LaunchContext,
    state: Mutex<RestartState>,
    attempted: AtomicBool,
}

impl RestartCoordinator {
    pub fn new(
        markers: FirstRunState,
        strategies: Vec<Box<dyn RestartStrategy>>,
        exit: Arc<dyn ProcessExit>,
        enabled: bool,
        launch: LaunchContext,
    ) -> Self {
        Self {
            markers,
            strategies,
            exit,
            enabled,
            launch,
            state: Mutex::new(RestartState::Stable),
            attempted: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RestartState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: RestartState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        info!(from = ?*state, to = ?next, "Restart state transition");
        *state = next;
    }

    /// Whether `report` warrants relaunching this process.
    pub fn decide(&self, report: &EnsureReport) -> RestartDecision {
        if !self.enabled
            || self.launch.already_restarted()
            || self.launch.first_run_completed
            || self.attempted.load(Ordering::SeqCst)
            || !report.all_critical_granted()
        {
            return RestartDecision::NOT_REQUIRED;
        }
        if report.newly_granted.iter().any(|k| k.requires_relaunch()) {
            RestartDecision {
                required: true,
                reason: RestartReason::PermissionKindRequiresRelaunch,
            }
        } else {
            RestartDecision::NOT_REQUIRED
        }
    }

    /// Relaunch if [`decide`](Self::decide) says so. Never panics and never
    /// retries; on total failure the process carries on as it is.
    pub fn maybe_restart(&self, report: &EnsureReport) -> RestartOutcome {
        let decision = self.decide(report);
        if !decision.required {
            return RestartOutcome::NotRequired;
        }
        if self.attempted.swap(true, Ordering::SeqCst) {
            return RestartOutcome::NotRequired;
        }

        info!(
            newly_granted = ?report.newly_granted,
            reason = ?decision.reason,
            "Relaunch required for new grants to take effect"
        );
        self.set_state(RestartState::AwaitingRestart);
        self.set_state(RestartState::Restarting);

        if let Err(e) = self.markers.set_restart_completed(true) {
            warn!(error = %e, "Failed to write restart marker; relaunching anyway");
        }

        let mut attempted = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.is_available() {
                info!(strategy = name, "Restart strategy unavailable; skipping");
                attempted.push(format!("{name}: unavailable"));
                continue;
            }
            info!(strategy = name, "Attempting restart");
            match strategy.launch() {
                Ok(()) => {
                    info!(strategy = name, "Replacement instance launched; exiting");
                    self.exit.exit(0);
                    return RestartOutcome::Relaunched { strategy: name };
                }
                Err(e) => {
                    warn!(strategy = name, error = %e, "Restart strategy failed");
                    attempted.push(format!("{name}: {e}"));
                }
            }
        }

        let e = Error::RestartUnavailable { attempted };
        error!(error = %e, "Continuing without restart");
        if let Err(e) = self.markers.set_restart_completed(false) {
            warn!(error = %e, "Failed to clear restart marker");
        }
        self.set_state(RestartState::Stable);
        RestartOutcome::Unavailable
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use permctl_core::PermissionKind;

    use super::*;

    struct NoExit;

    impl ProcessExit for NoExit {
        fn exit(&self, _code: i32) {}
    }

    fn coordinator(dir: &std::path::Path, launch: LaunchContext) -> RestartCoordinator {
        RestartCoordinator::new(
            FirstRunState::new(dir),
            Vec::new(),
            Arc::new(NoExit),
            true,
            launch,
        )
    }

    fn granted(kinds: &[PermissionKind]) -> EnsureReport {
        let kinds: BTreeSet<_> = kinds.iter().copied().collect();
        EnsureReport {
            initially_missing: kinds.clone(),
            requested: kinds.iter().copied().collect(),
            newly_granted: kinds,
            still_missing: BTreeSet::new(),
        }
    }

    #[test]
    fn first_grant_of_relaunch_kind_requires_restart() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), LaunchContext::default());
        let decision = c.decide(&granted(&[
            PermissionKind::Microphone,
            PermissionKind::Accessibility,
        ]));
        assert!(decision.required);
        assert_eq!(decision.reason, RestartReason::PermissionKindRequiresRelaunch);
    }

    #[test]
    fn microphone_alone_never_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), LaunchContext::default());
        assert!(!c.decide(&granted(&[PermissionKind::Microphone])).required);
    }

    #[test]
    fn partial_grant_does_not_restart() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), LaunchContext::default());
        let mut report = granted(&[PermissionKind::InputMonitoring]);
        report.still_missing.insert(PermissionKind::Accessibility);
        assert_eq!(c.decide(&report), RestartDecision::NOT_REQUIRED);
    }

    #[test]
    fn relaunched_or_returning_process_never_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let report = granted(&[PermissionKind::Accessibility]);

        let relaunched = LaunchContext {
            relaunched: true,
            ..LaunchContext::default()
        };
        assert!(!coordinator(dir.path(), relaunched).decide(&report).required);

        let stale = LaunchContext {
            stale_restart_marker: true,
            ..LaunchContext::default()
        };
        assert!(!coordinator(dir.path(), stale).decide(&report).required);

        let returning = LaunchContext {
            first_run_completed: true,
            ..LaunchContext::default()
        };
        assert!(!coordinator(dir.path(), returning).decide(&report).required);
    }

    #[test]
    fn empty_cascade_is_unavailable_and_clears_marker() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), LaunchContext::default());
        let report = granted(&[PermissionKind::ScreenCapture]);

        assert_eq!(c.maybe_restart(&report), RestartOutcome::Unavailable);
        assert_eq!(c.state(), RestartState::Stable);
        assert!(!FirstRunState::new(dir.path()).restart_completed());
        // One attempt per process.
        assert_eq!(c.maybe_restart(&report), RestartOutcome::NotRequired);
    }

    #[test]
    fn disabled_coordinator_stays_stable() {
        let dir = tempfile::tempdir().unwrap();
        let c = RestartCoordinator::new(
            FirstRunState::new(dir.path()),
            Vec::new(),
            Arc::new(NoExit),
            false,
            LaunchContext::default(),
        );
        assert_eq!(
            c.maybe_restart(&granted(&[PermissionKind::Accessibility])),
            RestartOutcome::NotRequired
        );
        assert_eq!(c.state(), RestartState::Stable);
    }
}
