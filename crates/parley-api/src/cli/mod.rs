//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod chats;
pub mod wipe;

use clap::{Parser, Subcommand};

use parley_types::chat::ChatId;

/// Chat with local models, one conversation per chat.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat {
        /// Open this chat instead of the most recent one.
        #[arg(long)]
        chat: Option<ChatId>,

        /// Switch the opened chat to this model (only while it is empty).
        #[arg(long, short)]
        model: Option<String>,
    },

    /// List all chats.
    #[command(alias = "ls")]
    Chats,

    /// Delete every chat and message, leaving one fresh chat.
    Wipe {
        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}
