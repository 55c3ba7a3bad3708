//! `permctl status`: read-only permission and marker diagnostics.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use permctl_agent::{FirstRunState, MarkerSnapshot, PermissionOrchestrator, Platform, evaluate};
use permctl_core::{Config, PermissionKind, PermissionResult};

/// Everything `status` prints.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub permissions: Vec<PermissionResult>,
    pub missing_critical: BTreeSet<PermissionKind>,
    pub markers: MarkerSnapshot,
    pub support_dir: PathBuf,
}

/// Probe every kind through the cache and read both markers. Never prompts.
pub async fn collect(config: &Config, platform: &Platform) -> anyhow::Result<StatusReport> {
    let support_dir = config
        .support_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine application support directory"))?;
    let markers = FirstRunState::new(&support_dir).snapshot();

    let orchestrator = PermissionOrchestrator::new(platform, config);
    let snapshot = orchestrator.query(false).await;
    debug!(kinds = snapshot.len(), "Collected permission statuses");

    Ok(StatusReport {
        permissions: snapshot.values().copied().collect(),
        missing_critical: evaluate(&snapshot).missing_critical,
        markers,
        support_dir,
    })
}

pub fn render_text(report: &StatusReport, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:<18} {:<15} {:<7} {:<8}", "KIND", "STATUS", "SOURCE", "CRITICAL")?;
    for result in &report.permissions {
        let source = match result.source {
            permctl_core::ResultSource::Cache => "cache",
            permctl_core::ResultSource::Probe => "probe",
        };
        let critical = if result.kind.is_critical() { "yes" } else { "no" };
        writeln!(
            out,
            "{:<18} {:<15} {:<7} {:<8}",
            result.kind.as_str(),
            result.status.as_str(),
            source,
            critical
        )?;
    }
    writeln!(out)?;
    if report.missing_critical.is_empty() {
        writeln!(out, "All critical permissions granted")?;
    } else {
        let missing: Vec<_> = report.missing_critical.iter().map(|k| k.as_str()).collect();
        writeln!(out, "Missing critical: {}", missing.join(", "))?;
    }
    writeln!(out, "first_run_completed: {}", report.markers.first_run_completed)?;
    writeln!(out, "restart_completed:   {}", report.markers.restart_completed)?;
    writeln!(out, "support_dir:         {}", report.support_dir.display())?;
    Ok(())
}

/// Collect and print the report as text or JSON.
pub async fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let report = collect(config, &Platform::native()).await?;
    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        render_text(&report, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use permctl_core::PermissionStatus;

    use super::*;

    fn report() -> StatusReport {
        StatusReport {
            permissions: vec![
                PermissionResult::probed(PermissionKind::Microphone, PermissionStatus::Granted),
                PermissionResult::probed(PermissionKind::Accessibility, PermissionStatus::Denied),
            ],
            missing_critical: BTreeSet::from([PermissionKind::Accessibility]),
            markers: MarkerSnapshot {
                first_run_completed: true,
                restart_completed: false,
            },
            support_dir: PathBuf::from("/tmp/permctl"),
        }
    }

    #[test]
    fn text_lists_kinds_and_markers() {
        let mut buf = Vec::new();
        render_text(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("microphone"));
        assert!(text.contains("denied"));
        assert!(text.contains("Missing critical: accessibility"));
        assert!(text.contains("first_run_completed: true"));
        assert!(text.contains("restart_completed:   false"));
    }

    #[test]
    fn json_carries_markers_and_missing_set() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(value["markers"]["first_run_completed"], true);
        assert_eq!(value["missing_critical"][0], "accessibility");
        assert_eq!(value["permissions"][1]["status"], "denied");
    }

    #[tokio::test]
    async fn collect_reads_markers_without_creating_them() {
        let dir = tempfile::tempdir().unwrap();
        let support = dir.path().join("support");
        let config = Config {
            support_dir: Some(support.clone()),
            ..Config::default()
        };

        let report = collect(&config, &Platform::native()).await.unwrap();

        assert_eq!(report.permissions.len(), PermissionKind::ALL.len());
        assert!(!report.markers.first_run_completed);
        assert!(!support.exists());
    }
}
