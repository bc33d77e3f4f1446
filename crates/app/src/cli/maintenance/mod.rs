use clap::{Args, Subcommand};
use magiclink_app::domain::maintenance::MaintenanceService;

use crate::cli::{print_json, store::StoreArgs};

#[derive(Debug, Args)]
pub(crate) struct MaintenanceCommand {
    #[command(subcommand)]
    command: MaintenanceSubcommand,
}

#[derive(Debug, Subcommand)]
enum MaintenanceSubcommand {
    /// Delete expired and used tokens, idle browser sessions and used codes
    Cleanup(StoreArgs),

    /// Print issuance counters and anomaly signals
    Monitor(StoreArgs),

    /// Cleanup followed by monitoring
    Run(StoreArgs),
}

pub(crate) async fn run(command: MaintenanceCommand) -> Result<(), String> {
    match command.command {
        MaintenanceSubcommand::Cleanup(args) => {
            let report = args.services().await?.maintenance.perform_cleanup().await;

            print_json(&report)?;

            if report.is_clean() {
                Ok(())
            } else {
                Err(format!(
                    "{} cleanup step(s) failed",
                    report.errors.len()
                ))
            }
        }
        MaintenanceSubcommand::Monitor(args) => {
            let data = args
                .services()
                .await?
                .maintenance
                .monitoring()
                .await
                .map_err(|error| format!("failed to collect monitoring data: {error}"))?;

            print_json(&data)
        }
        MaintenanceSubcommand::Run(args) => {
            let report = args.services().await?.maintenance.run_maintenance().await;

            print_json(&report)
        }
    }
}
