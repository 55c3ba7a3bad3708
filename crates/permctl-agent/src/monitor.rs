//! Background status monitor.
//!
//! Grants can be revoked (or given) in System Settings while the agent runs.
//! Every tick forces a fresh probe batch through the cache and publishes a
//! new `permissions.*` event whenever the missing set changes. With a period
//! no longer than the cache TTL, a revocation is published within one TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::{PermissionOrchestrator, evaluate};

/// Spawn the monitor. It stops once `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_status_monitor(
    orchestrator: Arc<PermissionOrchestrator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?interval, "Permission status monitor started");

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The startup pass has just published; skip the immediate tick.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let snapshot = orchestrator.query(true).await;
                    let evaluation = evaluate(&snapshot);
                    if orchestrator.publish_if_changed(&evaluation) {
                        info!(missing = ?evaluation.missing_critical, "Permission state changed");
                    } else {
                        debug!("Permission state unchanged");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Permission status monitor stopped");
                        return;
                    }
                }
            }
        }
    })
}
