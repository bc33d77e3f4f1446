use clap::{Parser, Subcommand};
use serde::Serialize;

mod maintenance;
mod store;
mod tokens;

#[derive(Debug, Parser)]
#[command(
    name = "magiclink-app",
    about = "Magic link maintenance CLI",
    long_about = None
)]
pub(crate) struct Cli {
    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Maintenance(maintenance::MaintenanceCommand),
    Tokens(tokens::TokensCommand),
}

impl Cli {
    pub(crate) fn log_level(&self) -> &str {
        &self.log_level
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Maintenance(command) => maintenance::run(command).await,
            Commands::Tokens(command) => tokens::run(command).await,
        }
    }
}

/// Print `value` as pretty JSON for scheduler logs and operators.
fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| format!("failed to render output: {error}"))?;

    println!("{rendered}");

    Ok(())
}
