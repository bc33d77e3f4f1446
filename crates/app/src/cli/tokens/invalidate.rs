use clap::Args;
use magiclink_app::domain::tokens::TokensService;

use crate::cli::store::StoreArgs;

#[derive(Debug, Args)]
pub(crate) struct InvalidateTokensArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Address whose outstanding tokens should be consumed
    #[arg(long)]
    email: String,
}

pub(crate) async fn run(args: InvalidateTokensArgs) -> Result<(), String> {
    let services = args.store.services().await?;

    let invalidated = services
        .tokens
        .invalidate_all(&args.email)
        .await
        .map_err(|error| format!("failed to invalidate tokens: {error}"))?;

    println!("invalidated: {invalidated}");

    Ok(())
}
