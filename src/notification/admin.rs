use std::sync::Arc;

use tracing::{info, warn};

use super::retry::RetryPolicy;
use crate::errors::{NotificationError, TransportError};
use crate::models::approval::DecisionToken;
use crate::models::message::InboundMessage;
use crate::transport::ChatTransport;

pub const AWAITING_NOTICE: &str = "Awaiting authentication from bot admin...";

pub fn prompt_text(msg: &InboundMessage) -> String {
    format!(
        "Message from unregistered: {}\nAllow video decoding?",
        msg.display_name()
    )
}

/// Delivers approve/deny prompts to the admin.
#[derive(Clone)]
pub struct AdminNotifier {
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
}

impl AdminNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Forwards the original message (best effort), then sends the decision
    /// prompt with retries. Once the prompt is out, the requester is told to wait.
    pub async fn send_prompt(
        &self,
        admin_id: i64,
        msg: &InboundMessage,
    ) -> Result<(), NotificationError> {
        if let Err(e) = self
            .transport
            .forward(admin_id, msg.chat_id, msg.message_id)
            .await
        {
            warn!(
                requester_id = msg.chat_id,
                error = %e,
                "forwarding request to admin failed"
            );
        }

        let text = prompt_text(msg);
        let approve = DecisionToken::approve(msg.chat_id);
        let deny = DecisionToken::deny(msg.chat_id);

        let mut last: Option<TransportError> = None;
        for attempt in 0..self.retry.attempts() {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt);
                tracing::debug!(
                    requester_id = msg.chat_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying admin prompt"
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .transport
                .send_decision_prompt(admin_id, &text, approve, deny)
                .await
            {
                Ok(()) => {
                    info!(requester_id = msg.chat_id, attempt, "admin prompt delivered");
                    if let Err(e) = self.transport.send_text(msg.chat_id, AWAITING_NOTICE).await {
                        warn!(requester_id = msg.chat_id, error = %e, "awaiting notice not delivered");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        requester_id = msg.chat_id,
                        attempt,
                        error = %e,
                        "admin prompt delivery failed"
                    );
                    last = Some(e);
                }
            }
        }

        Err(NotificationError::Exhausted {
            attempts: self.retry.attempts(),
            last: last.unwrap_or_else(|| TransportError::Request("no attempt made".into())),
        })
    }
}
