//! Chat transport boundary.
//!
//! The gateway only needs a handful of outbound operations and a stream of
//! inbound events; `telegram` provides both on top of the Bot API.

pub mod telegram;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::models::approval::DecisionToken;
use crate::models::message::InboundEvent;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    /// Forwards an existing message (used to show the admin what was asked).
    async fn forward(&self, to_chat: i64, from_chat: i64, message_id: i32)
        -> Result<(), TransportError>;

    /// Sends `text` with two inline buttons carrying the approve/deny tokens.
    async fn send_decision_prompt(
        &self,
        admin_id: i64,
        text: &str,
        approve: DecisionToken,
        deny: DecisionToken,
    ) -> Result<(), TransportError>;

    /// Uploads an audio file as a threaded reply to `reply_to`.
    async fn send_audio(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        reply_to: i32,
    ) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError>;
}

/// Source of inbound updates. `poll` blocks until at least one event is
/// available or the transport's own long-poll timeout elapses.
#[async_trait]
pub trait UpdateSource: Send {
    async fn poll(&mut self) -> Result<Vec<InboundEvent>, TransportError>;
}
