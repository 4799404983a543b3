//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, sets up tracing, opens the database and the
//! generation backend, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };

    parley_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Chat { chat, model } => cli::chat::loop_runner::run_chat_loop(&state, chat, model).await,
        Commands::Chats => cli::chats::list_chats(&state, cli.json).await,
        Commands::Wipe { force } => cli::wipe::wipe(&state, force, cli.json).await,
    };

    state.shutdown().await;
    parley_observe::tracing_setup::shutdown_tracing();
    result
}
