//! Permission orchestrator.
//!
//! [`PermissionOrchestrator`] owns the status cache and the per-kind grant
//! requesters, runs the acquisition pass, and publishes `permissions.*`
//! events. Consumers only ever see immutable snapshots.
//!
//! Consent requests are strictly sequential: overlapping native prompts
//! compete for the same modal presentation layer and can be dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{Instrument, debug, info, info_span, warn};

use permctl_core::{Config, PermissionKind, PermissionStatus};

use crate::cache::{Snapshot, StatusCache};
use crate::events::{EVENT_BROADCAST_CAPACITY, PermissionEvent};
use crate::grant::GrantRequester;
use crate::platform::Platform;
use crate::probe::{AuthorizationProbe, ProbeBatch};

/// Result of evaluating a snapshot against the critical set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub missing_critical: BTreeSet<PermissionKind>,
    pub all_critical_granted: bool,
}

/// Which critical kinds a snapshot is missing. A kind absent from the
/// snapshot counts as missing.
pub fn evaluate(results: &ProbeBatch) -> Evaluation {
    let missing_critical: BTreeSet<PermissionKind> = PermissionKind::ALL
        .into_iter()
        .filter(|kind| kind.is_critical())
        .filter(|kind| !results.get(kind).is_some_and(|r| r.status.is_granted()))
        .collect();
    Evaluation {
        all_critical_granted: missing_critical.is_empty(),
        missing_critical,
    }
}

/// Outcome of one [`PermissionOrchestrator::ensure_permissions`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Critical kinds missing when the pass started.
    pub initially_missing: BTreeSet<PermissionKind>,
    /// Kinds for which a consent request was made, in order.
    pub requested: Vec<PermissionKind>,
    /// Kinds that went from not granted to a re-verified grant.
    pub newly_granted: BTreeSet<PermissionKind>,
    /// Critical kinds still missing after the pass.
    pub still_missing: BTreeSet<PermissionKind>,
}

impl EnsureReport {
    pub fn all_critical_granted(&self) -> bool {
        self.still_missing.is_empty()
    }
}

pub struct PermissionOrchestrator {
    cache: StatusCache,
    requesters: BTreeMap<PermissionKind, GrantRequester>,
    events: broadcast::Sender<PermissionEvent>,
    request_optional: bool,
    /// Missing set carried by the last published event.
    last_published: Mutex<Option<BTreeSet<PermissionKind>>>,
    /// Serialises acquisition passes so prompts never overlap.
    pass: tokio::sync::Mutex<()>,
}

impl PermissionOrchestrator {
    pub fn new(platform: &Platform, config: &Config) -> Self {
        let probe = AuthorizationProbe::new(Arc::clone(&platform.backend));
        let requesters = platform
            .consent
            .iter()
            .map(|(kind, primitive)| {
                let requester = GrantRequester::new(
                    *kind,
                    Arc::clone(primitive),
                    probe.clone(),
                    Arc::clone(&platform.settings),
                    &config.grants,
                );
                (*kind, requester)
            })
            .collect();
        let (events, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);

        Self {
            cache: StatusCache::new(probe, config.cache.ttl()),
            requesters,
            events,
            request_optional: config.grants.request_optional,
            last_published: Mutex::new(None),
            pass: tokio::sync::Mutex::new(()),
        }
    }

    /// Cache-aware read of every kind.
    pub async fn query(&self, force: bool) -> Snapshot {
        self.cache.refresh(force).await
    }

    /// Status of one kind; answered from the cache when it is fresh.
    pub async fn get_status(&self, kind: PermissionKind) -> PermissionStatus {
        let snapshot = match self.cache.cached() {
            Some(hit) => hit,
            None => self.query(false).await,
        };
        snapshot
            .get(&kind)
            .map_or(PermissionStatus::Denied, |r| r.status)
    }

    /// Drop cached results so the next query re-probes.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Subscribe to `permissions.missing` / `permissions.all_granted`.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionEvent> {
        self.events.subscribe()
    }

    /// Acquisition pass: probe, request each missing kind in priority order,
    /// then publish the outcome. Never fails; a second concurrent call waits
    /// for the first to finish.
    pub async fn ensure_permissions(&self) -> EnsureReport {
        let _pass = self.pass.lock().await;
        let pass_id = uuid::Uuid::new_v4();
        self.run_pass()
            .instrument(info_span!("ensure_permissions", %pass_id))
            .await
    }

    async fn run_pass(&self) -> EnsureReport {
        let results = self.query(true).await;
        let mut missing = evaluate(&results).missing_critical;
        let mut report = EnsureReport {
            initially_missing: missing.clone(),
            ..EnsureReport::default()
        };

        if missing.is_empty() {
            info!("All critical permissions granted");
            self.publish(PermissionEvent::AllGranted);
            return report;
        }
        info!(missing = ?missing, "Critical permissions missing; requesting consent");

        for kind in PermissionKind::REQUEST_ORDER {
            let wanted = if kind.is_critical() {
                missing.contains(&kind)
            } else {
                self.request_optional && !results.get(&kind).is_some_and(|r| r.status.is_granted())
            };
            if !wanted {
                continue;
            }
            let Some(requester) = self.requesters.get(&kind) else {
                warn!(kind = %kind, "No consent primitive for this platform; skipping");
                continue;
            };

            report.requested.push(kind);
            let status = requester.request(requester.default_timeout()).await;
            if status.is_granted() {
                missing.remove(&kind);
                report.newly_granted.insert(kind);
            } else {
                info!(kind = %kind, status = %status, "Permission still not granted");
            }
        }

        // Grants changed under the cache; the next query must see them.
        self.cache.invalidate();
        report.still_missing.clone_from(&missing);
        self.publish(PermissionEvent::from_missing(missing));
        report
    }

    /// Publish the event for `evaluation` only if its missing set differs
    /// from the last published one. Returns whether an event was sent.
    pub fn publish_if_changed(&self, evaluation: &Evaluation) -> bool {
        let unchanged = self
            .last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            == Some(&evaluation.missing_critical);
        if unchanged {
            return false;
        }
        self.publish(PermissionEvent::from_missing(
            evaluation.missing_critical.clone(),
        ));
        true
    }

    fn publish(&self, event: PermissionEvent) {
        let missing = match &event {
            PermissionEvent::Missing { kinds } => kinds.clone(),
            PermissionEvent::AllGranted => BTreeSet::new(),
        };
        *self
            .last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(missing);

        let name = event.name();
        match self.events.send(event) {
            Ok(receivers) => info!(event = name, receivers, "Published permission event"),
            Err(_) => debug!(event = name, "No subscribers for permission event"),
        }
    }
}
