//! The message sink seam.
//!
//! A [`MessageSink`] is an optional observer that receives every produced
//! message, agent or human, exactly once, in emission order. It exists for
//! persistence and display layers that want push delivery alongside the
//! pulled [`MessageStream`](crate::MessageStream).
//!
//! Sink failures are isolated: the orchestrator logs them with `log::warn!`
//! and keeps going. The stream, not the sink, is the authoritative output
//! channel, so a slow or broken persistence layer cannot corrupt or abort a
//! round.

use std::error::Error;

use async_trait::async_trait;

use crate::parley::message::Message;

/// Receives each produced message once, in emission order.
///
/// Implementations may perform I/O. The default is a no-op so observers can
/// override only what they care about.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, _message: &Message) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// A sink that does nothing. Useful as a placeholder in tests.
pub struct NoopSink;

#[async_trait]
impl MessageSink for NoopSink {}
