//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and manage chats without leaving the loop.

use std::io::{self, Write};

use console::style;

use parley_types::chat::ChatId;

#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    Clear,
    Exit,
    /// Start a new chat, optionally named.
    New(Option<String>),
    /// List chats.
    Chats,
    Switch(ChatId),
    Model(String),
    /// Rename the active chat.
    Rename(String),
    /// Add a system message to the active chat.
    System(String),
    /// Delete a chat (the active one when no id is given).
    Delete(Option<ChatId>),
    /// Wipe everything; only runs when confirmed with `/wipe yes`.
    Wipe { confirmed: bool },
    /// Stop the reply streaming into the active chat.
    Cancel,
    /// Print the active chat's messages.
    History,
    /// Unknown command or bad arguments.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd.to_lowercase(), Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (trimmed.to_lowercase(), None),
    };

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        "/new" => ChatCommand::New(arg.map(str::to_string)),
        "/chats" | "/ls" => ChatCommand::Chats,
        "/switch" | "/sw" => match arg {
            Some(id) => match id.parse::<ChatId>() {
                Ok(id) => ChatCommand::Switch(id),
                Err(e) => ChatCommand::Unknown(e),
            },
            None => ChatCommand::Unknown("/switch requires a chat id".to_string()),
        },
        "/model" => required(arg, "/model requires a model name", ChatCommand::Model),
        "/rename" => required(arg, "/rename requires a name", ChatCommand::Rename),
        "/system" | "/sys" => required(arg, "/system requires message text", ChatCommand::System),
        "/delete" | "/rm" => match arg.map(str::parse::<ChatId>) {
            None => ChatCommand::Delete(None),
            Some(Ok(id)) => ChatCommand::Delete(Some(id)),
            Some(Err(e)) => ChatCommand::Unknown(e),
        },
        "/wipe" => ChatCommand::Wipe {
            confirmed: arg == Some("yes"),
        },
        "/cancel" | "/stop" => ChatCommand::Cancel,
        "/history" => ChatCommand::History,
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

fn required(arg: Option<&str>, missing: &str, build: fn(String) -> ChatCommand) -> ChatCommand {
    match arg {
        Some(value) => build(value.to_string()),
        None => ChatCommand::Unknown(missing.to_string()),
    }
}

const HELP: &[(&str, &str)] = &[
    ("/help", "Show this help message"),
    ("/new [name]", "Start a new chat"),
    ("/chats", "List chats"),
    ("/switch <id>", "Switch to another chat"),
    ("/model <name>", "Change the model (empty chats only)"),
    ("/rename <name>", "Rename the current chat"),
    ("/system <text>", "Add a system message"),
    ("/history", "Show the current chat's messages"),
    ("/cancel", "Stop the reply being streamed"),
    ("/delete [id]", "Delete a chat (default: current)"),
    ("/wipe yes", "Delete every chat and message"),
    ("/clear", "Clear the screen"),
    ("/quit", "End the session"),
];

pub fn print_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "  {}", style("Available commands:").bold())?;
    writeln!(out)?;
    for (usage, description) in HELP {
        writeln!(out, "  {} {}", style(format!("{usage:<16}")).cyan(), description)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "  {}",
        style("Ctrl+C stops the current reply, Ctrl+D exits").dim()
    )?;
    writeln!(out)
}
