//! The completion gateway seam.
//!
//! A [`CompletionGateway`] is the single external collaborator that turns a
//! composed prompt into model text. The crate ships no provider client; the
//! embedding application implements this trait over whatever transport it
//! owns (HTTP, local inference, a test double). One session issues its calls
//! strictly sequentially, but a gateway instance may be shared by many
//! concurrent sessions and must therefore be `Send + Sync`.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;

use crate::parley::config::ResponseLength;
use crate::parley::message::TokenUsage;

/// Failure modes of a completion call.
///
/// The variant matters to callers: a failed agent turn ends the session, and
/// [`is_resumable`](CompletionError::is_resumable) tells them whether
/// retrying the same turn with identical context is worthwhile.
#[derive(Debug, Clone)]
pub enum CompletionError {
    RateLimited(String),
    ModelUnavailable(String),
    NetworkError(String),
    AuthError(String),
}

impl CompletionError {
    /// Whether the same call could plausibly succeed if re-issued unchanged.
    /// Auth failures will not; everything else is transient.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, CompletionError::AuthError(_))
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            CompletionError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            CompletionError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            CompletionError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
        }
    }
}

impl Error for CompletionError {}

/// Single-turn text completion against a named model.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Produce one completion for `prompt` under `system_text`, using the
    /// model identified by `model_id`. `length` is a response-size budget the
    /// gateway maps to provider limits; `temperature` is forwarded verbatim.
    async fn complete(
        &self,
        prompt: &str,
        model_id: &str,
        system_text: &str,
        length: ResponseLength,
        temperature: f32,
    ) -> Result<String, CompletionError>;

    /// Token usage of the *last* `complete()` call, if the provider reports
    /// it. Default returns `None` so simple gateways need not bother.
    async fn last_usage(&self) -> Option<TokenUsage> {
        None
    }
}
