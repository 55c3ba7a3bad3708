//! System Settings deep-links.

use std::io;
use std::process::Command;

use permctl_core::PermissionKind;

/// Opens the OS settings pane for a permission kind.
pub trait SettingsOpener: Send + Sync {
    fn open(&self, kind: PermissionKind) -> io::Result<()>;
}

/// Privacy pane URL for a kind.
pub fn settings_url(kind: PermissionKind) -> String {
    format!(
        "x-apple.systempreferences:com.apple.preference.security?{}",
        kind.settings_anchor()
    )
}

/// Run `program url` to completion so the child is reaped.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn open_url(program: &str, url: &str) -> io::Result<()> {
    let status = Command::new(program).arg(url).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{program} exited with {status}")))
    }
}

/// Deep-links through `open(1)`; a no-op where no such pane exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSettings;

impl SettingsOpener for SystemSettings {
    #[cfg(target_os = "macos")]
    fn open(&self, kind: PermissionKind) -> io::Result<()> {
        open_url("open", &settings_url(kind))
    }

    #[cfg(not(target_os = "macos"))]
    fn open(&self, kind: PermissionKind) -> io::Result<()> {
        tracing::debug!(kind = %kind, "No privacy settings pane on this platform");
        Ok(())
    }
}
