//! Storage ports and their two backends.
//!
//! Every port is a trait; [`mem::MemoryBackend`] (guarded maps) and
//! [`sqlite::SqliteBackend`] (one connection, per-call transactions)
//! implement all of them with identical semantics, so the rest of the
//! runtime is written against `Arc<dyn Storage>` and tests can swap
//! backends freely.

pub mod mem;
pub mod ports;
mod rules;
pub mod sqlite;

pub use mem::MemoryBackend;
pub use ports::{
    AgentStore, AuditStore, ChannelStore, ExecutionStore, MemoryStore, NewTurn, ScheduleStore,
    SessionStore, Storage, TurnStore,
};
pub use sqlite::SqliteBackend;
