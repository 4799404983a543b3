//! Terminal rendering for the chat loop.
//!
//! Stream progress arrives as [`SessionEvent`]s from the orchestrator's
//! event bus. Fragments of the active chat are printed raw as they arrive;
//! events for chats in the background are reduced to a one-line notice.

use std::io::{self, Write};
use std::sync::Arc;

use console::style;
use rustyline_async::SharedWriter;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use parley_types::chat::{Chat, Message, MessageRole};
use parley_types::event::SessionEvent;

use crate::state::ConcreteOrchestrator;

/// Text to print for `event`, given the chat currently on screen.
pub fn render_event(event: &SessionEvent, active: Option<&Chat>) -> Option<String> {
    let is_active = |chat_id| active.is_some_and(|chat| chat.id == chat_id);

    match event {
        SessionEvent::StreamStarted { chat_id, .. } if is_active(*chat_id) => {
            let model = active.map(|chat| chat.model.as_str()).unwrap_or_default();
            Some(format!("\n  {} ", style(format!("{model} >")).cyan().bold()))
        }
        SessionEvent::StreamFragment { chat_id, text, .. } if is_active(*chat_id) => Some(text.clone()),
        SessionEvent::StreamFinalized { chat_id, .. } if is_active(*chat_id) => Some("\n\n".to_string()),
        SessionEvent::StreamFinalized { chat_id, .. } => Some(format!(
            "  {}\n",
            style(format!("reply ready in chat #{chat_id}")).dim()
        )),
        SessionEvent::StreamAbandoned { chat_id } if is_active(*chat_id) => {
            Some(format!("\n  {}\n\n", style("[reply stopped]").dim()))
        }
        SessionEvent::Error(err) => Some(format!("\n  {} {err}\n", style("!").red().bold())),
        _ => None,
    }
}

/// Print events from the orchestrator until the bus closes.
pub fn spawn_event_printer(
    orchestrator: Arc<ConcreteOrchestrator>,
    mut out: SharedWriter,
) -> JoinHandle<()> {
    let mut events = orchestrator.subscribe();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "chat renderer lagged behind the event bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Some(text) = render_event(&event, orchestrator.active_chat().as_ref()) {
                let _ = write!(out, "{text}");
                let _ = out.flush();
            }
        }
    })
}

fn role_label(message: &Message, chat: &Chat) -> String {
    match message.role {
        MessageRole::User => format!("{}", style("You").green().bold()),
        MessageRole::Assistant => format!("{}", style(&chat.model).cyan().bold()),
        MessageRole::System => format!("{}", style("System").yellow().bold()),
    }
}

/// Print a chat's messages oldest first.
pub fn print_history(out: &mut impl Write, chat: &Chat, messages: &[Message]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "  {} {} {}",
        style("Chat").bold(),
        style(&chat.name).cyan(),
        style(format!("#{} · {}", chat.id, chat.model)).dim()
    )?;
    if messages.is_empty() {
        writeln!(out, "  {}", style("No messages yet.").dim())?;
    }
    for message in messages {
        writeln!(out, "  {} {}", role_label(message, chat), message.content)?;
    }
    writeln!(out)
}

/// Print the chat list, marking the active chat and chats with a reply in
/// progress.
pub fn print_chats(
    out: &mut impl Write,
    chats: &[Chat],
    active: Option<&Chat>,
    is_streaming: impl Fn(&Chat) -> bool,
) -> io::Result<()> {
    writeln!(out)?;
    for chat in chats {
        let marker = if active.is_some_and(|a| a.id == chat.id) {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        let streaming = if is_streaming(chat) {
            style(" (replying)").yellow().to_string()
        } else {
            String::new()
        };
        writeln!(
            out,
            "  {marker} {} {} {}{streaming}",
            style(format!("#{:<4}", chat.id)).dim(),
            style(&chat.name).cyan(),
            style(&chat.model).dim()
        )?;
    }
    writeln!(out)
}
