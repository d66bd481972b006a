//! Language model boundary
//!
//! Everything the engine knows about the remote chat endpoint goes through
//! the [`ChatClient`] trait. Replies are normalized into one canonical
//! [`ChatReply`] shape here so no other layer has to tolerate odd payloads.

pub mod client;
pub mod error;
pub mod ollama;
pub mod reply;

pub use client::{ChatClient, ChatMessage, ChatReply, Role, ToolCall, TASK_COMPLETED_TOOL};
pub use error::LlmError;
pub use ollama::{OllamaClient, OllamaConfig};
pub use reply::{normalize_reply, normalize_text};
