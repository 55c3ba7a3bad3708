//! permctl CLI
//!
//! Prints permission status and marker state, and resets markers for
//! support. Never prompts for consent.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use permctl_cli::{markers_cmd, status_cmd};

#[derive(Parser, Debug)]
#[command(name = "permctl")]
#[command(version, about = "permctl - permission status diagnostics", long_about = None)]
struct Cli {
    /// Explicit config file, layered over the global settings.
    #[arg(long, global = true, env = "PERMCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the first-run and restart markers.
    #[arg(long, global = true)]
    support_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the status of every permission kind and both markers.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Clear the first-run and restart markers.
    ResetMarkers,
}

/// Usage errors on `status` are reported without failing the shell. Help,
/// version and every other subcommand keep clap's exit behavior.
fn swallows_parse_error(args: &[OsString], err: &clap::Error) -> bool {
    err.use_stderr() && args.iter().skip(1).any(|a| a == "status")
}

#[tokio::main(flavor = "current_thread")]
#[allow(clippy::print_stderr)]
async fn main() -> anyhow::Result<()> {
    let args: Vec<OsString> = std::env::args_os().collect();
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if swallows_parse_error(&args, &e) => {
            eprint!("{e}");
            return Ok(());
        }
        Err(e) => e.exit(),
    };
    permctl_core::tracing_init::init_tracing("permctl_cli=warn", false);

    let config = permctl_core::config::load_config(cli.config.as_deref()).map(|mut config| {
        if cli.support_dir.is_some() {
            config.support_dir.clone_from(&cli.support_dir);
        }
        config
    });

    match cli.command {
        Command::Status { json } => {
            // Diagnostics must not fail the calling shell.
            let result = match config {
                Ok(config) => status_cmd::run(&config, json).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                eprintln!("permctl: {e:#}");
            }
            Ok(())
        }
        Command::ResetMarkers => markers_cmd::run(&config?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn bad_status_flag_is_reported_not_fatal() {
        let argv = args(&["permctl", "status", "--bogus"]);
        let err = Cli::try_parse_from(&argv).unwrap_err();
        assert!(swallows_parse_error(&argv, &err));
    }

    #[test]
    fn help_and_other_commands_keep_clap_exits() {
        let argv = args(&["permctl", "status", "--help"]);
        let err = Cli::try_parse_from(&argv).unwrap_err();
        assert!(!swallows_parse_error(&argv, &err));

        let argv = args(&["permctl", "reset-markers", "--bogus"]);
        let err = Cli::try_parse_from(&argv).unwrap_err();
        assert!(!swallows_parse_error(&argv, &err));
    }

    #[test]
    fn status_json_parses() {
        let cli = Cli::try_parse_from(["permctl", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Status { json: true }));
    }
}
