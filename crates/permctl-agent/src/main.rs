//! permctl agent
//!
//! Host process for permission acquisition: detects a post-grant relaunch,
//! runs the startup pass, restarts once if new grants need a fresh process,
//! then watches for revocations until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use permctl_agent::monitor::spawn_status_monitor;
use permctl_agent::{FirstRunState, LaunchContext, Platform, RestartOutcome, Startup};

#[derive(Parser, Debug)]
#[command(name = "permctl-agent")]
#[command(version, about = "permctl agent - acquire OS privacy permissions and relaunch once")]
struct Args {
    /// Explicit config file, layered over the global settings.
    #[arg(long, env = "PERMCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the first-run and restart markers.
    #[arg(long)]
    support_dir: Option<PathBuf>,

    /// Log level filter for the agent (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "PERMCTL_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, env = "PERMCTL_LOG_JSON")]
    log_json: bool,

    /// Never relaunch the process after a grant.
    #[arg(long)]
    no_restart: bool,

    /// Exit after the startup pass instead of monitoring.
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    // Before anything else can spawn or re-exec.
    let relaunched = LaunchContext::detect();
    let args = Args::parse();

    let mut config = permctl_core::config::load_config(args.config.as_deref())?;
    if args.support_dir.is_some() {
        config.support_dir.clone_from(&args.support_dir);
    }
    if args.no_restart {
        config.restart.enabled = false;
    }
    let support_dir = config
        .support_dir()
        .context("Cannot determine application support directory")?;
    let markers = FirstRunState::new(support_dir);
    let launch = LaunchContext::reenter(relaunched, &markers);

    let log_filter = format!("permctl_agent={},permctl_core={}", args.log_level, args.log_level);
    permctl_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        relaunched = launch.relaunched,
        first_run_completed = launch.first_run_completed,
        support_dir = %markers.dir().display(),
        "Starting permctl-agent"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, markers, launch, args.once))
}

async fn serve(
    config: permctl_core::Config,
    markers: FirstRunState,
    launch: LaunchContext,
    once: bool,
) -> anyhow::Result<()> {
    let monitor_interval = config.monitor_interval();
    let startup = Startup::new(config, &Platform::native(), markers);
    let mut events = startup.orchestrator().subscribe();

    let agent = startup.run(&launch).await;
    if let RestartOutcome::Relaunched { strategy } = agent.restart {
        // Only reachable when the exit hook returned.
        info!(strategy, "Relaunch handed off");
        return Ok(());
    }
    if once {
        info!("Startup pass finished; exiting");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let monitor = monitor_interval.map(|interval| {
        spawn_status_monitor(Arc::clone(&agent.orchestrator), interval, shutdown_rx)
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();
    tokio::pin!(sigterm_future);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let payload = serde_json::to_string(&event)?;
                    info!(event = event.name(), %payload, "Permission event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event listener lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C shutdown signal");
                break;
            }
            _ = &mut sigterm_future => {
                info!("Received SIGTERM shutdown signal");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor {
        let _ = handle.await;
    }
    info!("Agent stopped");
    Ok(())
}
