//! Consent requests.
//!
//! A [`ConsentPrimitive`] starts the OS consent flow for one kind and
//! resolves a single-use [`ConsentReply`] from whatever thread the native
//! callback lands on. [`GrantRequester`] bridges that into an awaitable
//! with a hard timeout, waits out the settle delay, and re-verifies through
//! the probe. The re-verified status is what gets returned.
//!
//! Kinds granted through a System Settings toggle answer "not yet" right
//! away, so for those the requester keeps re-checking on a short interval
//! until the grant shows up or the budget is spent.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use permctl_core::config::GrantConfig;
use permctl_core::{Error, PermissionKind, PermissionStatus};

use crate::probe::AuthorizationProbe;

pub use settings::{SettingsOpener, SystemSettings, settings_url};

/// Single-resolution handoff from a native callback to the async side.
///
/// Resolving never blocks, so it is safe on the OS callback-delivery thread.
#[derive(Debug)]
pub struct ConsentReply {
    tx: oneshot::Sender<PermissionStatus>,
}

impl ConsentReply {
    pub fn channel() -> (Self, oneshot::Receiver<PermissionStatus>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the raw result of the native flow. Late replies are dropped.
    pub fn resolve(self, status: PermissionStatus) {
        let _ = self.tx.send(status);
    }

    /// True once the requester has stopped waiting for this reply.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes when the requester stops waiting, either because its
    /// budget ran out or because the whole request was dropped.
    pub async fn abandoned(&mut self) {
        self.tx.closed().await;
    }
}

/// Native consent trigger for one permission kind.
pub trait ConsentPrimitive: Send + Sync {
    /// Start the consent flow and resolve `reply` exactly once, from any
    /// thread. An `Err` means the flow could not be started at all (for
    /// example a missing entitlement).
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()>;
}

/// Consent strategy for one kind.
pub struct GrantRequester {
    kind: PermissionKind,
    primitive: Arc<dyn ConsentPrimitive>,
    probe: AuthorizationProbe,
    settings: Arc<dyn SettingsOpener>,
    timeout: Duration,
    settle_delay: Duration,
    poll_interval: Duration,
    open_settings_on_failure: bool,
}

impl GrantRequester {
    pub fn new(
        kind: PermissionKind,
        primitive: Arc<dyn ConsentPrimitive>,
        probe: AuthorizationProbe,
        settings: Arc<dyn SettingsOpener>,
        config: &GrantConfig,
    ) -> Self {
        Self {
            kind,
            primitive,
            probe,
            settings,
            timeout: config.timeout_for(kind),
            settle_delay: config.settle_delay(),
            poll_interval: config.poll_interval(),
            open_settings_on_failure: config.open_settings_on_failure,
        }
    }

    pub const fn kind(&self) -> PermissionKind {
        self.kind
    }

    /// Budget used by the orchestrator for this kind.
    pub const fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the consent flow and return the best-known status.
    ///
    /// Never retries. Anything short of a re-verified grant deep-links the
    /// user into the matching System Settings pane. When this returns, the
    /// reply handed to the primitive has been abandoned.
    pub async fn request(&self, timeout: Duration) -> PermissionStatus {
        let kind = self.kind;
        if self.probe.probe_async(kind).await.is_granted() {
            debug!(kind = %kind, "Already granted; skipping consent flow");
            return PermissionStatus::Granted;
        }

        info!(kind = %kind, timeout = ?timeout, "Requesting consent");
        match self.await_consent(timeout).await {
            Ok(raw) => debug!(kind = %kind, raw = %raw, "Consent flow answered"),
            Err(e @ Error::RequestTimedOut { .. }) => warn!(error = %e, "Consent flow timed out"),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Consent flow failed; treating as denied");
                self.open_settings().await;
                return PermissionStatus::Denied;
            }
        }

        // The authorization database may lag behind the callback.
        tokio::time::sleep(self.settle_delay).await;
        let verified = self.probe.probe_async(kind).await;
        if verified.is_granted() {
            info!(kind = %kind, "Consent granted");
        } else {
            let e = Error::RequestDenied {
                kind,
                status: verified,
            };
            warn!(error = %e, "Consent not granted");
            self.open_settings().await;
        }
        verified
    }

    async fn await_consent(&self, timeout: Duration) -> permctl_core::Result<PermissionStatus> {
        let kind = self.kind;
        let (reply, rx) = ConsentReply::channel();
        let primitive = Arc::clone(&self.primitive);

        let flow = async move {
            // Synchronous primitives may block inside the OS call.
            tokio::task::spawn_blocking(move || primitive.trigger(reply))
                .await
                .map_err(|e| Error::ProbeUnavailable {
                    kind,
                    reason: format!("consent primitive aborted: {e}"),
                })??;
            let raw = rx.await.map_err(|_| Error::ProbeUnavailable {
                kind,
                reason: "consent primitive dropped its reply".into(),
            })?;
            if raw.is_granted() || !kind.grant_lands_in_settings() {
                return Ok(raw);
            }
            debug!(kind = %kind, raw = %raw, "Waiting for the System Settings toggle");
            Ok(self.watch_for_grant().await)
        };

        // Dropping the flow on timeout drops the receiver, which abandons the reply.
        tokio::time::timeout(timeout, flow)
            .await
            .unwrap_or_else(|_| Err(Error::RequestTimedOut { kind, timeout }))
    }

    /// Re-check on every poll tick until the kind reads as granted. Ends
    /// only through the caller's timeout otherwise.
    async fn watch_for_grant(&self) -> PermissionStatus {
        let mut ticks = tokio::time::interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticks.tick().await;
        loop {
            ticks.tick().await;
            let status = self.probe.probe_async(self.kind).await;
            if status.is_granted() {
                return status;
            }
        }
    }

    async fn open_settings(&self) {
        if !self.open_settings_on_failure {
            return;
        }
        let (kind, settings) = (self.kind, Arc::clone(&self.settings));
        // The opener waits for open(1) to exit.
        match tokio::task::spawn_blocking(move || settings.open(kind)).await {
            Ok(Ok(())) => info!(kind = %kind, url = %settings_url(kind), "Opened System Settings"),
            Ok(Err(e)) => warn!(kind = %kind, error = %e, "Failed to open System Settings"),
            Err(e) => warn!(kind = %kind, error = %e, "Settings opener aborted"),
        }
    }
}
