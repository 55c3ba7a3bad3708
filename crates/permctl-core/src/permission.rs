//! Permission kinds, authorization statuses and probe results.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A sensitive capability gated by the OS privacy-authorization subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// Audio input.
    Microphone,
    /// Global input-event capture (HID listen-event access).
    InputMonitoring,
    /// Accessibility-level input monitoring and control.
    Accessibility,
    /// Screen content capture.
    ScreenCapture,
}

impl PermissionKind {
    /// Every kind, in declaration order. Probes always cover this full set.
    pub const ALL: [Self; 4] = [
        Self::Microphone,
        Self::InputMonitoring,
        Self::Accessibility,
        Self::ScreenCapture,
    ];

    /// Order in which consent is requested. Optional kinds come last.
    pub const REQUEST_ORDER: [Self; 4] = [
        Self::Microphone,
        Self::Accessibility,
        Self::InputMonitoring,
        Self::ScreenCapture,
    ];

    /// Whether the absence of this kind blocks the "ready" signal.
    pub const fn is_critical(self) -> bool {
        !matches!(self, Self::ScreenCapture)
    }

    /// Whether a grant only takes effect in a freshly launched process.
    pub const fn requires_relaunch(self) -> bool {
        !matches!(self, Self::Microphone)
    }

    /// Whether the native request returns before the user decides, leaving
    /// the grant to a later System Settings toggle that has to be watched for.
    pub const fn grant_lands_in_settings(self) -> bool {
        !matches!(self, Self::Microphone)
    }

    /// Anchor of the System Settings privacy pane for this kind.
    pub const fn settings_anchor(self) -> &'static str {
        match self {
            Self::Microphone => "Privacy_Microphone",
            Self::InputMonitoring => "Privacy_ListenEvent",
            Self::Accessibility => "Privacy_Accessibility",
            Self::ScreenCapture => "Privacy_ScreenCapture",
        }
    }

    /// Stable snake_case name used in logs, config and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Microphone => "microphone",
            Self::InputMonitoring => "input_monitoring",
            Self::Accessibility => "accessibility",
            Self::ScreenCapture => "screen_capture",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "microphone" | "mic" => Ok(Self::Microphone),
            "input_monitoring" | "input" => Ok(Self::InputMonitoring),
            "accessibility" => Ok(Self::Accessibility),
            "screen_capture" | "screen" => Ok(Self::ScreenCapture),
            other => Err(format!("unknown permission kind: {other}")),
        }
    }
}

/// Authorization state reported by the OS.
///
/// Only [`PermissionStatus::Granted`] permits use of the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    #[default]
    NotDetermined,
    Denied,
    Granted,
    Restricted,
}

impl PermissionStatus {
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotDetermined => "not_determined",
            Self::Denied => "denied",
            Self::Granted => "granted",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`PermissionResult`] handed to a caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Served from the status cache without touching the OS.
    Cache,
    /// Produced by a probe performed for this call.
    Probe,
}

/// Immutable snapshot of one kind's authorization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    pub kind: PermissionKind,
    pub status: PermissionStatus,
    pub checked_at: SystemTime,
    pub source: ResultSource,
}

impl PermissionResult {
    /// A freshly probed result stamped with the current time.
    pub fn probed(kind: PermissionKind, status: PermissionStatus) -> Self {
        Self {
            kind,
            status,
            checked_at: SystemTime::now(),
            source: ResultSource::Probe,
        }
    }

    /// The same observation, re-tagged as served from the cache.
    #[must_use]
    pub const fn as_cached(self) -> Self {
        Self {
            source: ResultSource::Cache,
            ..self
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn screen_capture_is_the_only_optional_kind() {
        let optional: Vec<_> = PermissionKind::ALL
            .into_iter()
            .filter(|k| !k.is_critical())
            .collect();
        assert_eq!(optional, vec![PermissionKind::ScreenCapture]);
    }

    #[test]
    fn request_order_puts_optional_last() {
        assert_eq!(
            PermissionKind::REQUEST_ORDER,
            [
                PermissionKind::Microphone,
                PermissionKind::Accessibility,
                PermissionKind::InputMonitoring,
                PermissionKind::ScreenCapture,
            ]
        );
    }

    #[test]
    fn microphone_grant_applies_without_relaunch() {
        assert!(!PermissionKind::Microphone.requires_relaunch());
        assert!(PermissionKind::Accessibility.requires_relaunch());
        assert!(PermissionKind::InputMonitoring.requires_relaunch());
    }

    #[test]
    fn only_microphone_answers_from_its_own_dialog() {
        let watched: Vec<_> = PermissionKind::ALL
            .into_iter()
            .filter(|k| k.grant_lands_in_settings())
            .collect();
        assert_eq!(
            watched,
            vec![
                PermissionKind::InputMonitoring,
                PermissionKind::Accessibility,
                PermissionKind::ScreenCapture
            ]
        );
    }

    #[test]
    fn kind_parses_cli_spellings() {
        assert_eq!(
            "input-monitoring".parse::<PermissionKind>(),
            Ok(PermissionKind::InputMonitoring)
        );
        assert_eq!("Mic".parse::<PermissionKind>(), Ok(PermissionKind::Microphone));
        assert!("camera".parse::<PermissionKind>().is_err());
    }

    #[test]
    fn only_granted_is_granted() {
        assert!(PermissionStatus::Granted.is_granted());
        for status in [
            PermissionStatus::NotDetermined,
            PermissionStatus::Denied,
            PermissionStatus::Restricted,
        ] {
            assert!(!status.is_granted());
        }
    }

    #[test]
    fn cached_copy_keeps_observation() {
        let fresh = PermissionResult::probed(PermissionKind::Microphone, PermissionStatus::Denied);
        let cached = fresh.as_cached();
        assert_eq!(cached.source, ResultSource::Cache);
        assert_eq!(cached.status, fresh.status);
        assert_eq!(cached.checked_at, fresh.checked_at);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&PermissionKind::InputMonitoring).unwrap();
        assert_eq!(json, "\"input_monitoring\"");
        let json = serde_json::to_string(&PermissionStatus::NotDetermined).unwrap();
        assert_eq!(json, "\"not_determined\"");
    }
}
