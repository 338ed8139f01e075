//! vaultmount - bring a host's encrypted storage and services on or offline.
//!
//! Thin wrapper around `vaultmount-core`: loads the configuration snapshot,
//! checks process preconditions, runs one command, and maps the outcome to
//! a process exit status.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::warn;
use vaultmount_core::{
    config::FleetSpec,
    controller::{CommandReport, SystemController},
    identity::SystemIdentity,
    probe::SystemProbe,
    runner::SystemRunner,
};

/// Encrypted-storage host orchestrator.
#[derive(Parser)]
#[command(name = "vaultmount")]
#[command(about = "Bring encrypted storage and dependent services on or offline", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "/etc/vaultmount/config.json")]
    config: PathBuf,

    /// Deadline in seconds for each external tool invocation.
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stop services, bring all storage online, then start services.
    Start,
    /// Stop services and take all storage offline (best effort).
    Stop,
    /// Bring storage online without touching services.
    Unlock,
    /// Stop services without touching storage.
    StopServices,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => {
            for warning in &report.warnings {
                warn!("{warning}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<CommandReport, Box<dyn std::error::Error>> {
    let spec = load_config(&cli.config)?;

    let runner = SystemRunner::with_timeout(Duration::from_secs(cli.timeout));
    let probe = SystemProbe::new(&runner);
    let identity = SystemIdentity;
    let controller = SystemController::new(&spec, &probe, &runner, &identity);

    controller.preflight()?;

    let report = match cli.command {
        Commands::Start => controller.start()?,
        Commands::Stop => controller.stop(),
        Commands::Unlock => controller.unlock_only()?,
        Commands::StopServices => controller.stop_services_only(),
    };
    Ok(report)
}

fn load_config(path: &PathBuf) -> Result<FleetSpec, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read config {}: {err}", path.display()))?;
    let spec: FleetSpec = serde_json::from_str(&raw)
        .map_err(|err| format!("cannot parse config {}: {err}", path.display()))?;
    spec.validate()?;
    Ok(spec)
}
