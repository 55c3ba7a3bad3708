//! Notifications published to consumer modules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use permctl_core::PermissionKind;

/// Broadcast channel buffer size for permission events.
pub const EVENT_BROADCAST_CAPACITY: usize = 16;

/// `permissions.*` notification.
///
/// Consumers degrade on `Missing` for any kind they depend on and restore
/// full functionality on `AllGranted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PermissionEvent {
    #[serde(rename = "permissions.missing")]
    Missing { kinds: BTreeSet<PermissionKind> },
    #[serde(rename = "permissions.all_granted")]
    AllGranted,
}

impl PermissionEvent {
    /// `AllGranted` for an empty set, `Missing` otherwise.
    pub fn from_missing(kinds: BTreeSet<PermissionKind>) -> Self {
        if kinds.is_empty() {
            Self::AllGranted
        } else {
            Self::Missing { kinds }
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "permissions.missing",
            Self::AllGranted => "permissions.all_granted",
        }
    }

    /// Whether a consumer depending on `kind` should run degraded.
    pub fn blocks(&self, kind: PermissionKind) -> bool {
        match self {
            Self::Missing { kinds } => kinds.contains(&kind),
            Self::AllGranted => false,
        }
    }
}
