use clap::Args;
use magiclink_app::domain::tokens::{TokensService, records::TokenType};

use crate::cli::store::StoreArgs;

#[derive(Debug, Args)]
pub(crate) struct CountTokensArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Address whose active tokens should be counted
    #[arg(long)]
    email: String,

    /// Only count `magic_link` tokens
    #[arg(long)]
    magic_links_only: bool,
}

pub(crate) async fn run(args: CountTokensArgs) -> Result<(), String> {
    let services = args.store.services().await?;
    let token_type = args.magic_links_only.then_some(TokenType::MagicLink);

    let count = services
        .tokens
        .count_active(&args.email, token_type)
        .await
        .map_err(|error| format!("failed to count tokens: {error}"))?;

    println!("active_tokens: {count}");

    Ok(())
}
