//! Main chat loop.
//!
//! Opens the session, prints the banner and history, then reads lines until
//! the user quits. User messages are handed to the orchestrator on spawned
//! tasks; replies are printed by the renderer task as they stream in.

use std::io::Write;

use console::style;
use rustyline_async::SharedWriter;
use tokio::task::JoinSet;

use parley_types::chat::{Chat, ChatId};

use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{print_chats, print_history, spawn_event_printer};

/// What the loop does after a slash command.
enum Flow {
    Continue,
    Exit,
}

fn prompt_for(chat: Option<&Chat>) -> String {
    match chat {
        Some(chat) => format!("  {} ", style(format!("{} >", chat.name)).green().bold()),
        None => format!("  {} ", style(">").green().bold()),
    }
}

/// Run the interactive chat loop.
pub async fn run_chat_loop(
    state: &AppState,
    chat: Option<ChatId>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let orchestrator = state.orchestrator.clone();
    orchestrator.initialize().await;

    if let Some(chat_id) = chat {
        orchestrator.switch_chat(chat_id).await;
        if orchestrator.active_chat().map(|c| c.id) != Some(chat_id) {
            anyhow::bail!("chat #{chat_id} does not exist");
        }
    }
    if let Some(model) = model {
        orchestrator.switch_model(model).await;
    }

    let Some(active) = orchestrator.active_chat() else {
        let reason = orchestrator
            .last_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no chat could be opened".to_string());
        anyhow::bail!("failed to open a chat: {reason}");
    };

    print_welcome_banner(&active, orchestrator.chats().len(), &state.data_dir);

    let (mut input, mut out) = ChatInput::open(prompt_for(Some(&active)))
        .map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;
    if orchestrator.has_messages() {
        print_history(&mut out, &active, &orchestrator.messages())?;
    }

    let printer = spawn_event_printer(orchestrator.clone(), out.clone());
    let mut generations = JoinSet::new();

    loop {
        while let Some(finished) = generations.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "generation task failed");
            }
        }

        match input.next().await {
            InputEvent::Exit => break,
            InputEvent::Interrupt => {
                let cancelled = orchestrator
                    .active_chat()
                    .is_some_and(|chat| orchestrator.cancel_stream(chat.id));
                if !cancelled {
                    writeln!(
                        out,
                        "  {}",
                        style("Press Ctrl+D or type /quit to exit.").dim()
                    )?;
                }
            }
            InputEvent::Line(text) => {
                if text.is_empty() {
                    continue;
                }

                if let Some(command) = commands::parse(&text) {
                    match run_command(state, command, &mut input, &mut out).await? {
                        Flow::Continue => {}
                        Flow::Exit => break,
                    }
                    input.set_prompt(&prompt_for(orchestrator.active_chat().as_ref()));
                    continue;
                }

                if let Some(chat) = orchestrator.active_chat() {
                    if orchestrator.is_streaming(chat.id) {
                        writeln!(
                            out,
                            "  {} {} is still replying. Wait, or /cancel it.",
                            style("!").yellow().bold(),
                            style(&chat.name).cyan()
                        )?;
                        continue;
                    }
                }

                let orch = orchestrator.clone();
                generations.spawn(async move { orch.add_user_message(text).await });
            }
        }
    }

    for chat in orchestrator.chats() {
        orchestrator.cancel_stream(chat.id);
    }
    while generations.join_next().await.is_some() {}
    printer.abort();

    writeln!(out, "\n  {}", style("Session ended.").dim())?;
    input.flush();
    Ok(())
}

async fn run_command(
    state: &AppState,
    command: ChatCommand,
    input: &mut ChatInput,
    out: &mut SharedWriter,
) -> anyhow::Result<Flow> {
    let orchestrator = &state.orchestrator;

    match command {
        ChatCommand::Help => commands::print_help(out)?,
        ChatCommand::Clear => input.clear_screen(),
        ChatCommand::Exit => return Ok(Flow::Exit),

        ChatCommand::New(name) => {
            let name = name.unwrap_or_else(|| state.config.default_chat_name.clone());
            let model = orchestrator
                .active_chat()
                .map(|chat| chat.model)
                .unwrap_or_else(|| state.config.default_model.clone());
            if let Some(chat) = orchestrator.start_new_chat(name, model).await {
                writeln!(
                    out,
                    "\n  {} Started {} {} using {}\n",
                    style("+").green().bold(),
                    style(&chat.name).cyan(),
                    style(format!("#{}", chat.id)).dim(),
                    style(&chat.model).dim()
                )?;
            }
        }

        ChatCommand::Chats => {
            let active = orchestrator.active_chat();
            print_chats(out, &orchestrator.sorted_chats(), active.as_ref(), |chat| {
                orchestrator.is_streaming(chat.id)
            })?;
        }

        ChatCommand::Switch(chat_id) => {
            if !orchestrator.chats().iter().any(|chat| chat.id == chat_id) {
                writeln!(out, "\n  {} No chat #{chat_id}.\n", style("?").yellow().bold())?;
                return Ok(Flow::Continue);
            }
            orchestrator.switch_chat(chat_id).await;
            if let Some(chat) = orchestrator.active_chat() {
                print_history(out, &chat, &orchestrator.messages())?;
            }
        }

        ChatCommand::Model(model) => {
            if orchestrator.has_messages() {
                writeln!(
                    out,
                    "\n  {} The model can only change before the first message. Use /new.\n",
                    style("!").yellow().bold()
                )?;
                return Ok(Flow::Continue);
            }
            orchestrator.switch_model(model).await;
            if let Some(chat) = orchestrator.active_chat() {
                writeln!(out, "\n  {} Model: {}\n", style("*").cyan().bold(), style(&chat.model).dim())?;
            }
        }

        ChatCommand::Rename(name) => {
            if let Some(chat) = orchestrator.active_chat() {
                orchestrator.rename_chat(chat.id, name).await;
            }
        }

        ChatCommand::System(text) => {
            orchestrator.add_system_message(text, None).await;
            writeln!(out, "  {}", style("System message added.").dim())?;
        }

        ChatCommand::Delete(target) => {
            let Some(chat_id) = target.or_else(|| orchestrator.active_chat().map(|c| c.id)) else {
                return Ok(Flow::Continue);
            };
            orchestrator.delete_chat(chat_id).await;
            writeln!(out, "\n  {} Deleted chat #{chat_id}.", style("-").red().bold())?;
            if let Some(chat) = orchestrator.active_chat() {
                print_history(out, &chat, &orchestrator.messages())?;
            }
        }

        ChatCommand::Wipe { confirmed: false } => {
            writeln!(
                out,
                "\n  {} This deletes every chat and message. Type {} to confirm.\n",
                style("!").red().bold(),
                style("/wipe yes").yellow()
            )?;
        }

        ChatCommand::Wipe { confirmed: true } => {
            orchestrator.wipe_database().await;
            if let Some(chat) = orchestrator.active_chat() {
                writeln!(
                    out,
                    "\n  {} Wiped. Fresh chat {} using {}\n",
                    style("✓").green().bold(),
                    style(format!("#{}", chat.id)).dim(),
                    style(&chat.model).dim()
                )?;
            }
        }

        ChatCommand::Cancel => {
            let cancelled = orchestrator
                .active_chat()
                .is_some_and(|chat| orchestrator.cancel_stream(chat.id));
            if !cancelled {
                writeln!(out, "  {}", style("Nothing to cancel.").dim())?;
            }
        }

        ChatCommand::History => {
            if let Some(chat) = orchestrator.active_chat() {
                print_history(out, &chat, &orchestrator.messages())?;
            }
        }

        ChatCommand::Unknown(name) => {
            writeln!(
                out,
                "\n  {} Unknown command: {}. Type /help for available commands.\n",
                style("?").yellow().bold(),
                style(name).dim()
            )?;
        }
    }

    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::chat::NewChat;

    #[test]
    fn test_prompt_shows_chat_name() {
        let chat = NewChat::now("Trip", "llama3").with_id(ChatId(3));
        assert!(prompt_for(Some(&chat)).contains("Trip >"));
        assert!(prompt_for(None).contains('>'));
    }
}
