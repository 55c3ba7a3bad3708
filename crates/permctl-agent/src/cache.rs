//! TTL status cache with single-flight refresh.
//!
//! All kinds are refreshed together and share one `last_refresh` instant.
//! Concurrent refreshes join the probe already in flight instead of starting
//! another one. The probe itself runs in a spawned task so an abandoned
//! caller cannot strand the others.
//!
//! Every caller inside one TTL window, including the one that triggered the
//! probe, receives the same stored snapshot tagged `source = cache`. Only
//! direct [`AuthorizationProbe`] reads carry `source = probe`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::probe::{AuthorizationProbe, ProbeBatch};

/// Immutable, shareable probe batch handed to consumers.
pub type Snapshot = Arc<ProbeBatch>;

struct Stored {
    refreshed_at: Instant,
    /// Results re-tagged as cache-sourced; handed out as-is until expiry.
    cached: Snapshot,
}

#[derive(Default)]
struct CacheState {
    stored: Option<Stored>,
    inflight: Option<watch::Receiver<Option<Snapshot>>>,
}

impl CacheState {
    fn fresh(&self, ttl: Duration) -> Option<Snapshot> {
        self.stored
            .as_ref()
            .filter(|s| s.refreshed_at.elapsed() < ttl)
            .map(|s| Arc::clone(&s.cached))
    }
}

/// Status cache owned by the orchestrator.
#[derive(Clone)]
pub struct StatusCache {
    probe: AuthorizationProbe,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl StatusCache {
    pub fn new(probe: AuthorizationProbe, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub const fn probe(&self) -> &AuthorizationProbe {
        &self.probe
    }

    /// Return the stored batch if it is still within the TTL. Never probes.
    pub fn cached(&self) -> Option<Snapshot> {
        lock(&self.state).fresh(self.ttl)
    }

    /// Serve from cache, or probe every kind when expired or `force` is set.
    ///
    /// A hit completes without suspending. Callers that arrive while a probe
    /// is running all receive that probe's snapshot.
    pub async fn refresh(&self, force: bool) -> Snapshot {
        let mut rx = {
            let mut state = lock(&self.state);
            if !force {
                if let Some(hit) = state.fresh(self.ttl) {
                    return hit;
                }
            }
            match &state.inflight {
                Some(rx) => {
                    debug!("Joining in-flight authorization probe");
                    rx.clone()
                }
                None => self.start_probe(&mut state),
            }
        };

        let joined = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
        match joined {
            Ok(Some(snapshot)) => snapshot,
            _ => {
                warn!("In-flight authorization probe vanished; probing directly");
                let batch = self.probe.probe_all_async().await;
                self.store(&batch)
            }
        }
    }

    /// Drop the stored batch so the next query re-probes.
    pub fn invalidate(&self) {
        lock(&self.state).stored = None;
    }

    fn start_probe(&self, state: &mut CacheState) -> watch::Receiver<Option<Snapshot>> {
        let (tx, rx) = watch::channel(None);
        state.inflight = Some(rx.clone());

        let cache = self.clone();
        tokio::spawn(async move {
            let batch = cache.probe.probe_all_async().await;
            let snapshot = cache.store(&batch);
            lock(&cache.state).inflight = None;
            // Nobody left waiting is fine: the batch is already stored.
            let _ = tx.send(Some(snapshot));
        });
        rx
    }

    fn store(&self, fresh: &ProbeBatch) -> Snapshot {
        let cached: Snapshot = Arc::new(fresh.iter().map(|(k, r)| (*k, r.as_cached())).collect());
        lock(&self.state).stored = Some(Stored {
            refreshed_at: Instant::now(),
            cached: Arc::clone(&cached),
        });
        cached
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
