//! Interactive CLI chat for Parley.
//!
//! Plain lines go to the active chat as user messages; generations run as
//! background tasks so several chats can stream at once. Replies are printed
//! from the session event bus. Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;
