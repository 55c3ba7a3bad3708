//! Read-only authorization probing.
//!
//! [`AuthorizationProbe`] wraps a platform [`AuthorizationBackend`] and
//! guarantees that no failure crosses its boundary: an unreachable
//! subsystem, an error, or a panicking backend all yield
//! [`PermissionStatus::Denied`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use permctl_core::{PermissionKind, PermissionResult, PermissionStatus};

/// One result per [`PermissionKind`], always covering every kind.
pub type ProbeBatch = BTreeMap<PermissionKind, PermissionResult>;

/// Status-check primitive of the OS privacy-authorization subsystem.
///
/// Implementations must not mutate state or show a consent prompt.
pub trait AuthorizationBackend: Send + Sync {
    fn check(&self, kind: PermissionKind) -> permctl_core::Result<PermissionStatus>;
}

/// Side-effect-free status reader.
#[derive(Clone)]
pub struct AuthorizationProbe {
    backend: Arc<dyn AuthorizationBackend>,
}

impl AuthorizationProbe {
    pub fn new(backend: Arc<dyn AuthorizationBackend>) -> Self {
        Self { backend }
    }

    /// Query one kind. Failures are logged and reported as `Denied`.
    pub fn probe(&self, kind: PermissionKind) -> PermissionStatus {
        match self.backend.check(kind) {
            Ok(status) => status,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Authorization probe failed; treating as denied");
                PermissionStatus::Denied
            }
        }
    }

    /// Query every kind in one batch.
    pub fn probe_all(&self) -> ProbeBatch {
        PermissionKind::ALL
            .into_iter()
            .map(|kind| (kind, PermissionResult::probed(kind, self.probe(kind))))
            .collect()
    }

    /// [`probe_all`](Self::probe_all) on the blocking pool, since the OS call
    /// may not return instantly.
    pub async fn probe_all_async(&self) -> ProbeBatch {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.probe_all()).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(
                    error = %e,
                    "Authorization probe batch aborted; treating all kinds as denied"
                );
                denied_batch()
            }
        }
    }

    /// [`probe`](Self::probe) on the blocking pool.
    pub async fn probe_async(&self, kind: PermissionKind) -> PermissionStatus {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.probe(kind)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Authorization probe aborted; treating as denied");
                PermissionStatus::Denied
            }
        }
    }
}

fn denied_batch() -> ProbeBatch {
    PermissionKind::ALL
        .into_iter()
        .map(|kind| (kind, PermissionResult::probed(kind, PermissionStatus::Denied)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    use permctl_core::Error;

    struct FlakyScreen;

    impl AuthorizationBackend for FlakyScreen {
        fn check(&self, kind: PermissionKind) -> permctl_core::Result<PermissionStatus> {
            match kind {
                PermissionKind::ScreenCapture => Err(Error::ProbeUnavailable {
                    kind,
                    reason: "tccd unreachable".into(),
                }),
                _ => Ok(PermissionStatus::Granted),
            }
        }
    }

    struct Panicking;

    impl AuthorizationBackend for Panicking {
        fn check(&self, _kind: PermissionKind) -> permctl_core::Result<PermissionStatus> {
            panic!("native check blew up");
        }
    }

    #[test]
    fn unreachable_subsystem_reads_as_denied() {
        let probe = AuthorizationProbe::new(Arc::new(FlakyScreen));
        assert_eq!(
            probe.probe(PermissionKind::ScreenCapture),
            PermissionStatus::Denied
        );
        assert_eq!(
            probe.probe(PermissionKind::Microphone),
            PermissionStatus::Granted
        );
    }

    #[test]
    fn batch_covers_every_kind() {
        let probe = AuthorizationProbe::new(Arc::new(FlakyScreen));
        let batch = probe.probe_all();
        assert_eq!(batch.len(), PermissionKind::ALL.len());
        assert_eq!(
            batch[&PermissionKind::ScreenCapture].status,
            PermissionStatus::Denied
        );
        assert!(batch.iter().all(|(k, r)| *k == r.kind));
    }

    #[tokio::test]
    async fn panicking_backend_never_escapes() {
        let probe = AuthorizationProbe::new(Arc::new(Panicking));
        let batch = probe.probe_all_async().await;
        assert!(
            batch
                .values()
                .all(|r| r.status == PermissionStatus::Denied)
        );
        assert_eq!(
            probe.probe_async(PermissionKind::Accessibility).await,
            PermissionStatus::Denied
        );
    }
}
