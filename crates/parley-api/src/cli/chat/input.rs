//! Line input for the chat loop, on top of `rustyline_async`.
//!
//! Reading a line never blocks the runtime, so replies keep streaming to
//! the terminal (through the `SharedWriter`) while the user types.

use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};

#[derive(Debug, PartialEq)]
pub enum InputEvent {
    /// A submitted line, trimmed. May be empty.
    Line(String),
    /// Ctrl+C.
    Interrupt,
    /// Ctrl+D, or the terminal went away.
    Exit,
}

impl From<Result<ReadlineEvent, ReadlineError>> for InputEvent {
    fn from(result: Result<ReadlineEvent, ReadlineError>) -> Self {
        match result {
            Ok(ReadlineEvent::Line(line)) => InputEvent::Line(line.trim().to_string()),
            Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupt,
            Ok(ReadlineEvent::Eof) => InputEvent::Exit,
            Err(err) => {
                tracing::debug!(error = %err, "terminal input closed");
                InputEvent::Exit
            }
        }
    }
}

pub struct ChatInput {
    readline: Readline,
}

impl ChatInput {
    /// Take over the terminal with `prompt`. Output written to the returned
    /// `SharedWriter` appears above the prompt line.
    pub fn open(prompt: String) -> Result<(Self, SharedWriter), ReadlineError> {
        let (readline, writer) = Readline::new(prompt)?;
        Ok((Self { readline }, writer))
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        if let Err(err) = self.readline.update_prompt(prompt) {
            tracing::debug!(error = %err, "failed to redraw prompt");
        }
    }

    /// Wait for the next line. Non-empty lines are added to the history.
    pub async fn next(&mut self) -> InputEvent {
        let event = InputEvent::from(self.readline.readline().await);
        if let InputEvent::Line(line) = &event {
            if !line.is_empty() {
                self.readline.add_history_entry(line.clone());
            }
        }
        event
    }

    pub fn clear_screen(&mut self) {
        let _ = self.readline.clear();
    }

    /// Print whatever shared writers still hold. Call before dropping.
    pub fn flush(&mut self) {
        let _ = self.readline.flush();
    }
}
