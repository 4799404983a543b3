//! `parley wipe`: delete all chats and messages.

use anyhow::Result;
use console::style;
use dialoguer::Confirm;
use parley_core::llm::CompletionTransport;
use parley_core::session::SessionOrchestrator;
use parley_core::store::ChatStore;
use parley_types::event::SessionEvent;
use tokio::sync::broadcast::error::TryRecvError;

use crate::state::AppState;

/// Wipe the database, leaving one fresh chat that keeps the current model.
pub async fn wipe(state: &AppState, force: bool, json: bool) -> Result<()> {
    let orchestrator = &state.orchestrator;
    orchestrator.initialize().await;

    let chat_count = orchestrator.chats().len();

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete {} and all their messages?",
                style(format!("{chat_count} chat(s)")).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    wipe_checked(orchestrator).await?;

    let fresh = orchestrator.active_chat();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "wiped_chats": chat_count,
                "active_chat": fresh,
            }))?
        );
    } else {
        println!();
        println!(
            "  {} Wiped {} chat(s).",
            style("✓").green().bold(),
            chat_count
        );
        if let Some(chat) = fresh {
            println!(
                "  {} Fresh chat {} using {}",
                style("*").cyan().bold(),
                style(&chat.name).cyan(),
                style(&chat.model).dim()
            );
        }
        println!();
    }
    Ok(())
}

/// Run the wipe and fail on any error reported while it ran. Errors from
/// earlier operations, such as the initial load, do not count.
async fn wipe_checked<S: ChatStore, T: CompletionTransport>(
    orchestrator: &SessionOrchestrator<S, T>,
) -> Result<()> {
    let mut events = orchestrator.subscribe();
    orchestrator.wipe_database().await;

    loop {
        match events.try_recv() {
            Ok(SessionEvent::Error(err)) => anyhow::bail!("wipe did not complete: {err}"),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::llm::ScriptedTransport;
    use parley_core::store::MemoryChatStore;
    use parley_types::chat::NewChat;
    use parley_types::config::ParleyConfig;
    use parley_types::error::StoreOperation;
    use std::sync::Arc;

    type Orchestrator = SessionOrchestrator<MemoryChatStore, ScriptedTransport>;

    fn orchestrator(store: &MemoryChatStore) -> Orchestrator {
        SessionOrchestrator::new(
            Arc::new(store.clone()),
            ScriptedTransport::new(),
            ParleyConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_earlier_error_does_not_fail_wipe() {
        let store = MemoryChatStore::new();
        store.create_chat(&NewChat::now("Old", "mistral")).await.unwrap();
        let orchestrator = orchestrator(&store);
        store.fail_next(StoreOperation::ListChats);
        orchestrator.initialize().await;
        assert!(orchestrator.last_error().is_some());

        wipe_checked(&orchestrator).await.unwrap();

        assert_eq!(store.chat_count(), 1);
        assert_eq!(orchestrator.chats().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_clear_fails_wipe() {
        let store = MemoryChatStore::new();
        store.create_chat(&NewChat::now("Old", "mistral")).await.unwrap();
        let orchestrator = orchestrator(&store);
        orchestrator.initialize().await;
        store.fail_next(StoreOperation::Clear);

        let err = wipe_checked(&orchestrator).await.unwrap_err();

        assert!(err.to_string().starts_with("wipe did not complete"));
        assert_eq!(store.chat_count(), 1);
    }
}
