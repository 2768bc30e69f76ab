//! Tally storage crate - SQLite persistence for chat and retail data.
//!
//! Provides a WAL-mode SQLite database with migrations, the durable chat
//! session/message store, and the lookup translator that turns restricted
//! lookup specifications into bounded read-only queries.

pub mod db;
pub mod lookup;
pub mod migrations;
pub mod sessions;

pub use db::Database;
pub use lookup::{LookupError, LookupSpec, LookupTranslator};
pub use sessions::{ChatSession, ChatStore, MessageRole, StoredMessage};
