//! Platforms without a privacy-authorization database.

use permctl_core::{PermissionKind, PermissionStatus};

use crate::grant::{ConsentPrimitive, ConsentReply};
use crate::probe::AuthorizationBackend;

/// Every capability is available to every process.
#[derive(Debug, Default)]
pub struct UngatedBackend;

impl AuthorizationBackend for UngatedBackend {
    fn check(&self, _kind: PermissionKind) -> permctl_core::Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }
}

#[derive(Debug, Default)]
pub struct UngatedConsent;

impl ConsentPrimitive for UngatedConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        reply.resolve(PermissionStatus::Granted);
        Ok(())
    }
}
