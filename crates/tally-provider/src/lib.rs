//! Tally provider crate - language-model provider protocol.
//!
//! Defines the conversation-buffer wire types, the function-declaration
//! shape, the async `ChatProvider` seam the orchestrator depends on, and a
//! reqwest-based client for OpenAI-compatible chat-completions endpoints.

pub mod client;
pub mod types;

pub use client::ChatClient;
pub use types::{ChatProvider, ChatTurn, FunctionCall, FunctionDecl, ProviderReply, Role};
