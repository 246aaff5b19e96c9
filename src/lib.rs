//! # Parley
//!
//! Parley is a multi-agent conversation orchestration engine: it configures
//! up to three "agents", each a fixed binding of a language-model id and a
//! persona, and runs them through a multi-round, templated conversation
//! about a caller-supplied topic, optionally interleaved with human messages.
//!
//! The crate is a library-level core. It owns who speaks next, what each
//! speaker is told, and when the conversation pauses for a human; transport,
//! persistence, billing, and UI belong to the embedding application, which
//! reaches the engine through two seams:
//!
//! * [`CompletionGateway`]: single-turn text completion against a named
//!   model. Implement it over whatever provider client you use.
//! * [`MessageSink`]: an optional push observer for produced messages,
//!   alongside the pulled [`MessageStream`].
//!
//! ## Core Concepts
//!
//! ### Sessions
//!
//! A session is started from an immutable, validated [`ConversationConfig`].
//! It runs as a background task; the caller gets a [`SessionHandle`] for
//! control (human messages, skip, cancel) and a [`MessageStream`] yielding
//! every produced [`Message`] in strict sequence order:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::{AgentBinding, ConversationConfig, ConversationSession, ParticipationMode};
//! # use parley::{CompletionGateway, CompletionError, ResponseLength};
//! # struct MyGateway;
//! # #[async_trait::async_trait]
//! # impl CompletionGateway for MyGateway {
//! #     async fn complete(&self, _: &str, _: &str, _: &str, _: ResponseLength, _: f32)
//! #         -> Result<String, CompletionError> { Ok(String::new()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     parley::init_logger();
//!
//!     let config = ConversationConfig::new("Should AI have rights?")
//!         .with_agent(AgentBinding::new("gpt-4o", "optimist"))
//!         .with_agent(AgentBinding::new("claude-sonnet", "skeptic"))
//!         .with_total_rounds(3)
//!         .with_participation(ParticipationMode::JumpIn);
//!
//!     let (handle, mut stream) =
//!         ConversationSession::start(config, Arc::new(MyGateway), None)?;
//!
//!     handle.supply_human_message("What about animal rights as a precedent?")?;
//!
//!     while let Some(message) = stream.next_message().await {
//!         println!("{}: {}", message.alias.as_deref().unwrap_or("Human"), message.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Turn order
//!
//! Within a round each active agent speaks exactly once, strictly
//! sequentially; every prompt embeds the literal text of earlier turns. The
//! order comes from a [`TurnOrderStrategy`]: the fixed slot order, a fresh
//! shuffle per round, or the dynamic "popcorn" strategy, where a model picks
//! the next speaker and any unusable answer falls back to a uniform-random
//! eligible slot.
//!
//! ### Aliases
//!
//! Models never see the internal slot letters. Each (slot, persona) pair maps
//! deterministically to a stable two-token display name via [`alias::alias`],
//! and prompts require agents to identify themselves and each other by those
//! names only.
//!
//! ### Human participation
//!
//! [`ParticipationMode`] decides whether a human may join: never
//! (`Spectator`), at any time with a per-agent answer burst (`JumpIn`), or at
//! a single designated pause after round 1 (`RoundByRound`).
//!
//! ### Failure semantics
//!
//! A gateway failure during an agent turn aborts the current round and marks
//! the session `Failed`; already-produced messages stand. There is no
//! automatic retry; [`ConversationSession::resume`] re-runs only the missing
//! turns from a surviving transcript, with identical composed context.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding
/// Parley can opt in to simple `RUST_LOG` driven diagnostics without having
/// to choose a specific logging backend upfront.
///
/// ```rust
/// parley::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `parley` module.
pub mod parley;

// Re-exporting key items for easier external access.
pub use crate::parley::alias;
pub use crate::parley::config::{
    AgentBinding, ConfigError, ConversationConfig, ParticipationMode, ResponseLength,
    ScenarioTemplate, TurnOrderStrategy,
};
pub use crate::parley::gateway::{CompletionError, CompletionGateway};
pub use crate::parley::message::{Message, SessionState, Slot, Speaker, TokenUsage, TurnKind};
pub use crate::parley::orchestrator::{
    ConversationSession, MessageStream, SessionError, SessionHandle,
};
pub use crate::parley::prompt::{PromptComposer, PromptRole};
pub use crate::parley::sequencer::{parse_selection, Selection, TurnSequencer};
pub use crate::parley::sink::{MessageSink, NoopSink};
