//! Scripted stand-ins for the OS privacy subsystem and the restart cascade.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use permctl_agent::grant::SettingsOpener;
use permctl_agent::restart::{ProcessExit, RestartStrategy};
use permctl_agent::{AuthorizationBackend, ConsentPrimitive, ConsentReply, Platform};
use permctl_core::config::GrantConfig;
use permctl_core::{Config, Error, PermissionKind, PermissionStatus};

/// Authorization database the consent fakes write into.
#[derive(Default)]
pub struct ScriptedBackend {
    statuses: Mutex<BTreeMap<PermissionKind, PermissionStatus>>,
    failing: Mutex<BTreeSet<PermissionKind>>,
    checks: AtomicUsize,
    delay: Duration,
    watched_marker: Option<PathBuf>,
    marker_at_first_check: Mutex<Option<bool>>,
}

impl ScriptedBackend {
    pub fn with(statuses: &[(PermissionKind, PermissionStatus)]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn all(status: PermissionStatus) -> Self {
        Self::with(&PermissionKind::ALL.map(|k| (k, status)))
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record whether `path` exists when the first status check happens.
    pub fn watch_marker(mut self, path: &Path) -> Self {
        self.watched_marker = Some(path.to_path_buf());
        self
    }

    pub fn set(&self, kind: PermissionKind, status: PermissionStatus) {
        self.statuses.lock().unwrap().insert(kind, status);
    }

    pub fn fail(&self, kind: PermissionKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn marker_at_first_check(&self) -> Option<bool> {
        *self.marker_at_first_check.lock().unwrap()
    }
}

impl AuthorizationBackend for ScriptedBackend {
    fn check(&self, kind: PermissionKind) -> permctl_core::Result<PermissionStatus> {
        if let Some(path) = &self.watched_marker {
            let mut seen = self.marker_at_first_check.lock().unwrap();
            if seen.is_none() {
                *seen = Some(path.exists());
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&kind) {
            return Err(Error::ProbeUnavailable {
                kind,
                reason: "tccd unreachable".into(),
            });
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or_default())
    }
}

/// How the scripted user answers a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Grant,
    Deny,
    /// Answer "not yet", then flip the toggle in System Settings a little later.
    GrantInSettings,
    /// Never answer; the prompt stays up until the requester gives up on it.
    Ignore,
}

/// Order of prompts and whether any two were ever on screen together.
#[derive(Default)]
pub struct PromptLog {
    order: Mutex<Vec<PermissionKind>>,
    on_screen: AtomicUsize,
    max_on_screen: AtomicUsize,
}

impl PromptLog {
    pub fn order(&self) -> Vec<PermissionKind> {
        self.order.lock().unwrap().clone()
    }

    pub fn max_on_screen(&self) -> usize {
        self.max_on_screen.load(Ordering::SeqCst)
    }

    fn shown(&self, kind: PermissionKind) {
        self.order.lock().unwrap().push(kind);
        let now = self.on_screen.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_on_screen.fetch_max(now, Ordering::SeqCst);
    }

    fn dismissed(&self) {
        self.on_screen.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedConsent {
    kind: PermissionKind,
    answer: Answer,
    backend: Arc<ScriptedBackend>,
    log: Arc<PromptLog>,
}

impl ConsentPrimitive for ScriptedConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        self.log.shown(self.kind);
        match self.answer {
            Answer::Grant => {
                let (kind, backend, log) =
                    (self.kind, Arc::clone(&self.backend), Arc::clone(&self.log));
                // Like the microphone completion handler: a foreign thread, a
                // little later.
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    backend.set(kind, PermissionStatus::Granted);
                    log.dismissed();
                    reply.resolve(PermissionStatus::Granted);
                });
            }
            Answer::Deny => {
                self.backend.set(self.kind, PermissionStatus::Denied);
                self.log.dismissed();
                reply.resolve(PermissionStatus::Denied);
            }
            Answer::GrantInSettings => {
                self.log.dismissed();
                reply.resolve(PermissionStatus::Denied);
                let (kind, backend) = (self.kind, Arc::clone(&self.backend));
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(50));
                    backend.set(kind, PermissionStatus::Granted);
                });
            }
            Answer::Ignore => {
                let log = Arc::clone(&self.log);
                let mut reply = reply;
                tokio::spawn(async move {
                    reply.abandoned().await;
                    log.dismissed();
                });
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSettings {
    opened: Mutex<Vec<PermissionKind>>,
}

impl RecordingSettings {
    pub fn opened(&self) -> Vec<PermissionKind> {
        self.opened.lock().unwrap().clone()
    }
}

impl SettingsOpener for RecordingSettings {
    fn open(&self, kind: PermissionKind) -> io::Result<()> {
        self.opened.lock().unwrap().push(kind);
        Ok(())
    }
}

/// A platform whose user answers each kind as scripted.
pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub prompts: Arc<PromptLog>,
    pub settings: Arc<RecordingSettings>,
    pub platform: Platform,
}

impl Harness {
    pub fn new(backend: ScriptedBackend, answers: &[(PermissionKind, Answer)]) -> Self {
        let backend = Arc::new(backend);
        let prompts = Arc::new(PromptLog::default());
        let settings = Arc::new(RecordingSettings::default());
        let consent = PermissionKind::ALL
            .into_iter()
            .map(|kind| {
                let answer = answers
                    .iter()
                    .find(|(k, _)| *k == kind)
                    .map_or(Answer::Grant, |(_, a)| *a);
                let primitive: Arc<dyn ConsentPrimitive> = Arc::new(ScriptedConsent {
                    kind,
                    answer,
                    backend: Arc::clone(&backend),
                    log: Arc::clone(&prompts),
                });
                (kind, primitive)
            })
            .collect();
        let platform = Platform {
            backend: backend.clone(),
            consent,
            settings: settings.clone(),
        };
        Self {
            backend,
            prompts,
            settings,
            platform,
        }
    }

    /// Everyone says yes.
    pub fn granting(backend: ScriptedBackend) -> Self {
        Self::new(backend, &[])
    }
}

/// Short budgets so timeouts and settle delays do not slow the suite.
pub fn fast_config(support_dir: &Path) -> Config {
    Config {
        grants: GrantConfig {
            microphone_timeout_secs: 1,
            prompt_timeout_secs: 1,
            settle_delay_ms: 5,
            poll_interval_ms: 10,
            ..GrantConfig::default()
        },
        support_dir: Some(support_dir.to_path_buf()),
        ..Config::default()
    }
}

/// Cascade step that records launches instead of starting anything.
pub struct RecordingStrategy {
    name: &'static str,
    available: bool,
    succeeds: bool,
    launched: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingStrategy {
    pub fn boxed(
        name: &'static str,
        available: bool,
        succeeds: bool,
        launched: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn RestartStrategy> {
        Box::new(Self {
            name,
            available,
            succeeds,
            launched: Arc::clone(launched),
        })
    }
}

impl RestartStrategy for RecordingStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn launch(&self) -> io::Result<()> {
        self.launched.lock().unwrap().push(self.name);
        if self.succeeds {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "sandboxed"))
        }
    }
}

#[derive(Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}
