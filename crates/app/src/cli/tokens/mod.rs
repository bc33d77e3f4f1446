use clap::{Args, Subcommand};

mod count;
mod history;
mod invalidate;

#[derive(Debug, Args)]
pub(crate) struct TokensCommand {
    #[command(subcommand)]
    command: TokensSubcommand,
}

#[derive(Debug, Subcommand)]
enum TokensSubcommand {
    Count(count::CountTokensArgs),
    Invalidate(invalidate::InvalidateTokensArgs),
    History(history::HistoryArgs),
}

pub(crate) async fn run(command: TokensCommand) -> Result<(), String> {
    match command.command {
        TokensSubcommand::Count(args) => count::run(args).await,
        TokensSubcommand::Invalidate(args) => invalidate::run(args).await,
        TokensSubcommand::History(args) => history::run(args).await,
    }
}
