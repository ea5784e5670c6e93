use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use crate::errors::NotificationError;
use crate::models::approval::Decision;
use crate::models::pipeline::PipelineResult;

// ── Webhook Event Types ───────────────────────────────────────

/// A structured event payload sent to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// Event type identifier, e.g. "approval_decided", "pipeline_finished".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// The chat the event is about.
    pub requester_id: i64,
    /// Event-specific details.
    pub details: serde_json::Value,
}

impl WebhookEvent {
    pub fn approval_decided(requester_id: i64, decision: Decision) -> Self {
        Self {
            event_type: "approval_decided".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            requester_id,
            details: serde_json::json!({ "decision": decision }),
        }
    }

    pub fn approval_requested(requester_id: i64, display_name: &str) -> Self {
        Self {
            event_type: "approval_requested".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            requester_id,
            details: serde_json::json!({ "requester": display_name }),
        }
    }

    pub fn pipeline_finished(requester_id: i64, run_id: &str, result: &PipelineResult) -> Self {
        Self {
            event_type: "pipeline_finished".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            requester_id,
            details: serde_json::json!({
                "run_id": run_id,
                "result": result,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    let bytes = mac.finalize().into_bytes();
    format!("sha256={}", hex::encode(bytes))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches events to the configured webhook URLs.
/// Bodies are signed with HMAC-SHA256 (X-Ytaudio-Signature) when a secret is set.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    secret: Option<String>,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("ytaudio-webhook/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            urls,
            secret,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Send one event to one URL, retrying per the policy.
    pub async fn send(&self, url: &str, event: &WebhookEvent) -> Result<(), NotificationError> {
        let payload = serde_json::to_vec(event).map_err(|_| NotificationError::Webhook {
            attempts: 0,
            url: url.to_string(),
        })?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = self
            .secret
            .as_deref()
            .map(|s| hmac_sha256_hex(s, &payload));

        for attempt in 0..self.retry.attempts() {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt);
                debug!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-ytaudio-delivery-id", &delivery_id)
                .header("x-ytaudio-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-ytaudio-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        status = %resp.status(),
                        "webhook delivery failed (non-2xx)"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        error = %e,
                        "webhook request error"
                    );
                }
            }
        }

        Err(NotificationError::Webhook {
            attempts: self.retry.attempts(),
            url: url.to_string(),
        })
    }

    /// Fire-and-forget dispatch to every configured URL.
    pub fn dispatch(&self, event: WebhookEvent) {
        if self.urls.is_empty() {
            return;
        }

        let notifier = self.clone();
        tokio::spawn(async move {
            for url in &notifier.urls {
                if let Err(e) = notifier.send(url, &event).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_hmac_signature_format() {
        let sig = hmac_sha256_hex("secret", b"payload");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_ne!(sig, hmac_sha256_hex("other", b"payload"));
    }

    #[test]
    fn test_pipeline_event_embeds_result() {
        let event = WebhookEvent::pipeline_finished(
            7,
            "run-1",
            &PipelineResult::Delivered { used_fallback: true },
        );
        assert_eq!(event.event_type, "pipeline_finished");
        assert_eq!(event.details["result"]["outcome"], "delivered");
        assert_eq!(event.details["run_id"], "run-1");
    }

    #[test]
    fn test_decision_event() {
        let event = WebhookEvent::approval_decided(9, Decision::Deny);
        assert_eq!(event.requester_id, 9);
        assert_eq!(event.details["decision"], "deny");
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_signed_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("x-ytaudio-signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/hook", server.uri());
        let notifier = WebhookNotifier::new(vec![url.clone()], Some("s3cret".into()));
        notifier
            .send(&url, &WebhookEvent::approval_decided(1, Decision::Approve))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let url = format!("{}/fail", server.uri());
        let notifier = WebhookNotifier::new(vec![url.clone()], None).with_retry(RetryPolicy {
            max_retries: 2,
            base_backoff_ms: 5,
            max_backoff_ms: 10,
            jitter_ms: 0,
        });
        let err = notifier
            .send(&url, &WebhookEvent::approval_decided(1, Decision::Approve))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Webhook { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_dispatch_without_urls_is_noop() {
        let notifier = WebhookNotifier::new(vec![], None);
        assert!(!notifier.is_enabled());
        notifier.dispatch(WebhookEvent::approval_decided(1, Decision::Approve));
    }
}
