//! Native adapters bundled per platform.

#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod ungated;

use std::collections::BTreeMap;
use std::sync::Arc;

use permctl_core::PermissionKind;

use crate::grant::{ConsentPrimitive, SettingsOpener, SystemSettings};
use crate::probe::AuthorizationBackend;

#[cfg(target_os = "macos")]
pub use macos::{
    AccessibilityConsent, InputMonitoringConsent, MacosBackend, MicrophoneConsent,
    ScreenCaptureConsent,
};
#[cfg(not(target_os = "macos"))]
pub use ungated::{UngatedBackend, UngatedConsent};

/// Status backend, one consent primitive per kind, and the settings opener.
#[derive(Clone)]
pub struct Platform {
    pub backend: Arc<dyn AuthorizationBackend>,
    pub consent: BTreeMap<PermissionKind, Arc<dyn ConsentPrimitive>>,
    pub settings: Arc<dyn SettingsOpener>,
}

impl Platform {
    #[cfg(target_os = "macos")]
    pub fn native() -> Self {
        let consent: BTreeMap<PermissionKind, Arc<dyn ConsentPrimitive>> = BTreeMap::from([
            (
                PermissionKind::Microphone,
                Arc::new(MicrophoneConsent) as Arc<dyn ConsentPrimitive>,
            ),
            (PermissionKind::Accessibility, Arc::new(AccessibilityConsent)),
            (PermissionKind::InputMonitoring, Arc::new(InputMonitoringConsent)),
            (PermissionKind::ScreenCapture, Arc::new(ScreenCaptureConsent)),
        ]);
        Self {
            backend: Arc::new(MacosBackend),
            consent,
            settings: Arc::new(SystemSettings),
        }
    }

    #[cfg(not(target_os = "macos"))]
    pub fn native() -> Self {
        let consent = PermissionKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(UngatedConsent) as Arc<dyn ConsentPrimitive>))
            .collect();
        Self {
            backend: Arc::new(UngatedBackend),
            consent,
            settings: Arc::new(SystemSettings),
        }
    }
}
