//! Conversation memory for the Colloquy answering engine.
//!
//! Tenant-scoped, append-only turn log keyed by session id. The most recent
//! turns feed query contextualization; the full ordered transcript feeds
//! external summarization. Messages are never edited; corrections are new
//! messages.

pub mod store;
pub mod types;

pub use store::MemoryStore;
pub use types::{ChatTurn, TurnRole};
