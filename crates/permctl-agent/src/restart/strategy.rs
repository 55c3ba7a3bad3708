//! Restart cascade steps.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use permctl_core::config::RestartConfig;

/// Environment marker telling the next instance it is a post-grant relaunch.
pub const RESTART_ENV_VAR: &str = "RESTARTED";

/// One way of starting a fresh instance of the application.
pub trait RestartStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap precondition check; unavailable strategies are skipped.
    fn is_available(&self) -> bool;

    /// Start the new instance with [`RESTART_ENV_VAR`] set. `Ok` means the
    /// new instance is on its way and the current one should exit. A
    /// strategy that replaces the process image does not return on success.
    fn launch(&self) -> io::Result<()>;
}

/// Terminates the current process once a strategy has succeeded.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExitProcess;

impl ProcessExit for ExitProcess {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Program and arguments the current process was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Entrypoint {
    pub fn current() -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: std::env::args_os().skip(1).collect(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).env(RESTART_ENV_VAR, "1");
        cmd
    }
}

/// Relaunch the installed `.app` bundle through Launch Services and exit.
#[derive(Debug, Clone)]
pub struct BundleRelaunch {
    bundle: PathBuf,
    args: Vec<OsString>,
}

impl BundleRelaunch {
    pub fn new(bundle: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            bundle: bundle.into(),
            args,
        }
    }
}

impl RestartStrategy for BundleRelaunch {
    fn name(&self) -> &'static str {
        "bundle_relaunch"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && self.bundle.is_dir()
    }

    fn launch(&self) -> io::Result<()> {
        // `-n` forces a new instance even while this one is still alive.
        let mut cmd = Command::new("open");
        cmd.arg("-n")
            .arg(&self.bundle)
            .arg("--env")
            .arg(format!("{RESTART_ENV_VAR}=1"));
        if !self.args.is_empty() {
            cmd.arg("--args").args(&self.args);
        }
        let status = cmd.env(RESTART_ENV_VAR, "1").status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("open exited with {status}")))
        }
    }
}

/// Replace the current process image with a fresh instance of the same
/// entry point.
#[derive(Debug, Clone)]
pub struct ExecInPlace {
    entry: Entrypoint,
}

impl ExecInPlace {
    pub const fn new(entry: Entrypoint) -> Self {
        Self { entry }
    }
}

impl RestartStrategy for ExecInPlace {
    fn name(&self) -> &'static str {
        "exec_in_place"
    }

    fn is_available(&self) -> bool {
        cfg!(unix) && self.entry.program.is_file()
    }

    #[cfg(unix)]
    fn launch(&self) -> io::Result<()> {
        use std::os::unix::process::CommandExt;
        // Only returns on failure.
        Err(self.entry.command().exec())
    }

    #[cfg(not(unix))]
    fn launch(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "exec is not supported on this platform",
        ))
    }
}

/// Spawn the same entry point as a child, then let the parent exit.
#[derive(Debug, Clone)]
pub struct SpawnAndExit {
    entry: Entrypoint,
}

impl SpawnAndExit {
    pub const fn new(entry: Entrypoint) -> Self {
        Self { entry }
    }
}

impl RestartStrategy for SpawnAndExit {
    fn name(&self) -> &'static str {
        "spawn_and_exit"
    }

    fn is_available(&self) -> bool {
        self.entry.program.is_file()
    }

    fn launch(&self) -> io::Result<()> {
        let child = self.entry.command().spawn()?;
        debug!(pid = child.id(), "Spawned replacement process");
        Ok(())
    }
}

/// Enclosing `.app` bundle of an executable, if any.
pub fn bundle_for_exe(exe: &Path) -> Option<PathBuf> {
    exe.ancestors()
        .find(|p| p.extension().is_some_and(|ext| ext == "app"))
        .map(Path::to_path_buf)
}

/// Bundle relaunch, exec in place, spawn and exit; in that order.
pub fn default_cascade(config: &RestartConfig) -> Vec<Box<dyn RestartStrategy>> {
    let entry = match Entrypoint::current() {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "Cannot determine current executable; restart is unavailable");
            return Vec::new();
        }
    };

    let mut cascade: Vec<Box<dyn RestartStrategy>> = Vec::with_capacity(3);
    let bundle = config
        .bundle_path
        .clone()
        .or_else(|| bundle_for_exe(&entry.program));
    if let Some(bundle) = bundle {
        cascade.push(Box::new(BundleRelaunch::new(bundle, entry.args.clone())));
    }
    cascade.push(Box::new(ExecInPlace::new(entry.clone())));
    cascade.push(Box::new(SpawnAndExit::new(entry)));
    cascade
}
