//! Configuration resolution for permctl.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/permctl/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binaries, highest priority)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::permission::PermissionKind;

/// Application directory name under the platform config/data dirs.
pub const APP_DIR: &str = "permctl";

/// Complete permctl configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub grants: GrantConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Directory holding the first-run and restart markers.
    #[serde(default)]
    pub support_dir: Option<PathBuf>,
}

/// Status cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a probe batch is served before re-probing (milliseconds).
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 2_000 }
    }
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Consent request configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrantConfig {
    /// Budget for the one-shot microphone consent dialog (seconds).
    pub microphone_timeout_secs: u64,
    /// Budget for kinds whose native primitive answers synchronously (seconds).
    pub prompt_timeout_secs: u64,
    /// Wait between a consent signal and the authoritative re-check (milliseconds).
    pub settle_delay_ms: u64,
    /// Re-check period while waiting for a System Settings toggle (milliseconds).
    pub poll_interval_ms: u64,
    /// Whether optional kinds are requested during the startup pass.
    pub request_optional: bool,
    /// Deep-link into System Settings when a request ends without a grant.
    pub open_settings_on_failure: bool,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            microphone_timeout_secs: 30,
            prompt_timeout_secs: 15,
            settle_delay_ms: 750,
            poll_interval_ms: 250,
            request_optional: true,
            open_settings_on_failure: true,
        }
    }
}

impl GrantConfig {
    /// Consent budget for the given kind.
    pub const fn timeout_for(&self, kind: PermissionKind) -> Duration {
        match kind {
            PermissionKind::Microphone => Duration::from_secs(self.microphone_timeout_secs),
            PermissionKind::InputMonitoring
            | PermissionKind::Accessibility
            | PermissionKind::ScreenCapture => Duration::from_secs(self.prompt_timeout_secs),
        }
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Never zero, so a polling loop always yields between checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Restart coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestartConfig {
    /// Allow the coordinator to relaunch the process after a first grant.
    pub enabled: bool,
    /// Installed application bundle; auto-detected from the executable when unset.
    pub bundle_path: Option<PathBuf>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bundle_path: None,
        }
    }
}

/// Background status monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Re-check interval in milliseconds; 0 disables the monitor.
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 2_000 }
    }
}

impl MonitorConfig {
    pub const fn interval(&self) -> Option<Duration> {
        if self.interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.interval_ms))
        }
    }
}

impl Config {
    /// Effective monitor period, capped at the cache TTL so a revocation is
    /// published within one cache lifetime.
    pub fn monitor_interval(&self) -> Option<Duration> {
        let ttl = self.cache.ttl().max(Duration::from_millis(1));
        self.monitor.interval().map(|interval| interval.min(ttl))
    }

    /// Directory holding the on-disk markers, falling back to the platform data dir.
    pub fn support_dir(&self) -> Option<PathBuf> {
        self.support_dir.clone().or_else(default_support_dir)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    if let Some(path) = explicit {
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("settings.json"))
}

/// Default marker directory: `~/Library/Application Support/permctl` on macOS.
pub fn default_support_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.cache = overlay.cache;
    base.grants = overlay.grants;
    base.monitor = overlay.monitor;

    base.restart.enabled = overlay.restart.enabled;
    if overlay.restart.bundle_path.is_some() {
        base.restart.bundle_path = overlay.restart.bundle_path;
    }
    if overlay.support_dir.is_some() {
        base.support_dir = overlay.support_dir;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    raw.parse().map_or_else(
        |_| {
            warn!(key, value = raw, "Ignoring unparsable environment override");
            None
        },
        Some,
    )
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(n) =
        lookup("PERMCTL_CACHE_TTL_MS").and_then(|v| parse_env("PERMCTL_CACHE_TTL_MS", &v))
    {
        config.cache.ttl_ms = n;
    }
    if let Some(n) =
        lookup("PERMCTL_SETTLE_DELAY_MS").and_then(|v| parse_env("PERMCTL_SETTLE_DELAY_MS", &v))
    {
        config.grants.settle_delay_ms = n;
    }
    if let Some(n) = lookup("PERMCTL_MICROPHONE_TIMEOUT_SECS")
        .and_then(|v| parse_env("PERMCTL_MICROPHONE_TIMEOUT_SECS", &v))
    {
        config.grants.microphone_timeout_secs = n;
    }
    if let Some(n) = lookup("PERMCTL_PROMPT_TIMEOUT_SECS")
        .and_then(|v| parse_env("PERMCTL_PROMPT_TIMEOUT_SECS", &v))
    {
        config.grants.prompt_timeout_secs = n;
    }
    if let Some(n) =
        lookup("PERMCTL_POLL_INTERVAL_MS").and_then(|v| parse_env("PERMCTL_POLL_INTERVAL_MS", &v))
    {
        config.grants.poll_interval_ms = n;
    }
    if let Some(flag) =
        lookup("PERMCTL_RESTART_ENABLED").and_then(|v| parse_env("PERMCTL_RESTART_ENABLED", &v))
    {
        config.restart.enabled = flag;
    }
    if let Some(n) = lookup("PERMCTL_MONITOR_INTERVAL_MS")
        .and_then(|v| parse_env("PERMCTL_MONITOR_INTERVAL_MS", &v))
    {
        config.monitor.interval_ms = n;
    }
    if let Some(path) = lookup("PERMCTL_BUNDLE_PATH") {
        config.restart.bundle_path = Some(PathBuf::from(path));
    }
    if let Some(path) = lookup("PERMCTL_SUPPORT_DIR") {
        config.support_dir = Some(PathBuf::from(path));
    }
}
