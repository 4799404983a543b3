//! Session layer: in-memory state, the shared handle, and the orchestrator
//! that drives user intents against the store and the transport.

pub mod handle;
pub mod orchestrator;
pub mod state;

pub use handle::Session;
pub use orchestrator::SessionOrchestrator;
pub use state::{latest_context, SessionState};
