// src/parley/mod.rs

pub mod alias;
pub mod config;
pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod sequencer;
pub mod sink;

// Export the session entry points directly so callers reach them as
// parley::ConversationSession instead of parley::orchestrator::ConversationSession.
pub use orchestrator::{ConversationSession, MessageStream, SessionHandle};
