//! Session engine and port definitions for Parley.
//!
//! This crate defines the "ports" (store and transport traits) that the
//! infrastructure layer implements, plus the session state, stream
//! aggregation, and orchestration logic built on top of them. It depends
//! only on `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod llm;
pub mod session;
pub mod store;
pub mod stream;
