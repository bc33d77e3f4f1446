use clap::Args;
use magiclink_app::domain::maintenance::MaintenanceService;

use crate::cli::{print_json, store::StoreArgs};

#[derive(Debug, Args)]
pub(crate) struct HistoryArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long)]
    email: String,

    /// How many days back to look
    #[arg(long, default_value_t = 7)]
    days: u32,
}

pub(crate) async fn run(args: HistoryArgs) -> Result<(), String> {
    let history = args
        .store
        .services()
        .await?
        .maintenance
        .email_history(&args.email, args.days)
        .await
        .map_err(|error| format!("failed to load history: {error}"))?;

    if history.tokens.is_empty() && history.sessions.is_empty() {
        println!("no activity for {} in the last {} days", history.email, history.days);
        return Ok(());
    }

    print_json(&history)
}
