//! Process re-entry and the startup acquisition pass.
//!
//! Order matters here: the relaunch marker is consumed and the
//! `restart_completed` flag cleared before any other subsystem starts, so a
//! new instance that crashes later cannot re-trigger a restart.

use std::sync::Arc;

use tracing::{info, warn};

use permctl_core::Config;

use crate::first_run::FirstRunState;
use crate::orchestrator::{EnsureReport, PermissionOrchestrator};
use crate::platform::Platform;
use crate::restart::{
    ExitProcess, ProcessExit, RESTART_ENV_VAR, RestartCoordinator, RestartOutcome,
    RestartStrategy, default_cascade,
};

/// What the process learned about itself at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    /// Started by the restart cascade (`RESTARTED=1`).
    pub relaunched: bool,
    /// A `restart_completed` marker was present without the env marker.
    pub stale_restart_marker: bool,
    /// `first_run_completed` as it was at process start.
    pub first_run_completed: bool,
    /// Clearing the restart marker failed; reported once logging is up.
    pub marker_clear_error: Option<String>,
}

impl LaunchContext {
    /// Read the relaunch env marker. Call once, first thing in `main`.
    pub fn detect() -> bool {
        std::env::var_os(RESTART_ENV_VAR).is_some_and(|v| v == "1")
    }

    /// Consume the restart marker and snapshot the first-run flag.
    pub fn reenter(relaunched: bool, markers: &FirstRunState) -> Self {
        let stale_restart_marker = !relaunched && markers.restart_completed();
        let marker_clear_error = if relaunched || stale_restart_marker {
            markers
                .set_restart_completed(false)
                .err()
                .map(|e| e.to_string())
        } else {
            None
        };
        Self {
            relaunched,
            stale_restart_marker,
            first_run_completed: markers.first_run_completed(),
            marker_clear_error,
        }
    }

    /// This instance must not restart itself again.
    pub const fn already_restarted(&self) -> bool {
        self.relaunched || self.stale_restart_marker
    }
}

/// Result of the startup sequence; kept alive for the process lifetime.
pub struct Agent {
    pub orchestrator: Arc<PermissionOrchestrator>,
    pub coordinator: RestartCoordinator,
    pub report: EnsureReport,
    pub restart: RestartOutcome,
}

pub struct Startup {
    config: Config,
    markers: FirstRunState,
    cascade: Vec<Box<dyn RestartStrategy>>,
    exit: Arc<dyn ProcessExit>,
    orchestrator: Arc<PermissionOrchestrator>,
}

impl Startup {
    pub fn new(config: Config, platform: &Platform, markers: FirstRunState) -> Self {
        let orchestrator = Arc::new(PermissionOrchestrator::new(platform, &config));
        Self {
            cascade: default_cascade(&config.restart),
            exit: Arc::new(ExitProcess),
            config,
            markers,
            orchestrator,
        }
    }

    #[must_use]
    pub fn with_cascade(mut self, cascade: Vec<Box<dyn RestartStrategy>>) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub fn with_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    /// Available before [`run`](Self::run) so consumers can subscribe to the
    /// startup pass's events.
    pub const fn orchestrator(&self) -> &Arc<PermissionOrchestrator> {
        &self.orchestrator
    }

    /// Acquire permissions, record the first run, then restart if needed.
    pub async fn run(self, launch: &LaunchContext) -> Agent {
        if let Some(e) = &launch.marker_clear_error {
            warn!(
                error = %e,
                dir = %self.markers.dir().display(),
                "Failed to clear restart marker"
            );
        }
        if launch.relaunched {
            info!("Post-grant relaunch detected; restart marker cleared");
        } else if launch.stale_restart_marker {
            warn!("Stale restart marker found; treating this launch as already restarted");
        }

        let report = self.orchestrator.ensure_permissions().await;
        info!(
            requested = ?report.requested,
            newly_granted = ?report.newly_granted,
            still_missing = ?report.still_missing,
            "Permission pass complete"
        );

        if let Err(e) = self.markers.set_first_run_completed(true) {
            warn!(error = %e, "Failed to record first-run completion");
        }

        let coordinator = RestartCoordinator::new(
            self.markers,
            self.cascade,
            self.exit,
            self.config.restart.enabled,
            launch.clone(),
        );
        let restart = coordinator.maybe_restart(&report);

        Agent {
            orchestrator: self.orchestrator,
            coordinator,
            report,
            restart,
        }
    }
}
