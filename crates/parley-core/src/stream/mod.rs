//! Streaming aggregation: folds `StreamEvent`s into persisted assistant
//! messages.

pub mod aggregator;

pub use aggregator::{transition, StreamAggregator, Transition};
