//! `permctl reset-markers`: clear both on-disk markers.
//!
//! Support use only. The next agent launch behaves like a first run.

use std::io::{self, Write};

use permctl_agent::FirstRunState;
use permctl_core::Config;

pub fn reset(markers: &FirstRunState) -> anyhow::Result<()> {
    markers.set_restart_completed(false)?;
    markers.set_first_run_completed(false)?;
    Ok(())
}

pub fn run(config: &Config) -> anyhow::Result<()> {
    let dir = config
        .support_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine application support directory"))?;
    reset(&FirstRunState::new(&dir))?;
    writeln!(io::stdout(), "Cleared markers in {}", dir.display())?;
    Ok(())
}
