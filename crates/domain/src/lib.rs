//! Shared domain types for the personal-agent runtime.
//!
//! Everything the other crates agree on lives here: entity records
//! (agents, sessions, turns, channels, schedules, memory items), the
//! wire-facing event and request DTOs, the shared error type, the YAML
//! configuration model, and the injected clock / id-generator seams.

pub mod agent;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod schedule;
pub mod session;
pub mod stream;
pub mod turn;

pub use error::{Error, Result};
