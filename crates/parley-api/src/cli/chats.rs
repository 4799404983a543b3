//! `parley chats`: list chats newest first.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;

use parley_core::session::SessionState;
use parley_core::store::ChatStore;
use parley_types::chat::Chat;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ChatSummary {
    #[serde(flatten)]
    chat: Chat,
    message_count: usize,
}

/// Load every chat with its message count, in display order.
async fn load_summaries<S: ChatStore>(store: &S) -> Result<Vec<ChatSummary>> {
    let mut view = SessionState::new();
    view.replace_chats(store.list_chats().await?);

    let mut summaries = Vec::with_capacity(view.chats().len());
    for chat in view.sorted_chats() {
        let message_count = store.list_messages(chat.id).await?.len();
        summaries.push(ChatSummary { chat, message_count });
    }
    Ok(summaries)
}

pub async fn list_chats(state: &AppState, json: bool) -> Result<()> {
    let summaries = load_summaries(state.store.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!(
            "  {} No chats yet. Start one with: {}",
            style("i").blue().bold(),
            style("parley chat").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for summary in &summaries {
        let chat = &summary.chat;
        table.add_row(vec![
            Cell::new(chat.id).fg(Color::DarkGrey),
            Cell::new(&chat.name).fg(Color::Cyan),
            Cell::new(&chat.model).fg(Color::White),
            Cell::new(summary.message_count),
            Cell::new(chat.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
