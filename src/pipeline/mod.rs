//! Request pipeline: link → duration check → resolve → fetch → transcode →
//! deliver → cleanup.
//!
//! One run per authorized message. Every run ends in a classified
//! [`PipelineResult`] and leaves no files behind in the work directory.

pub mod artifacts;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use self::artifacts::Artifacts;
use crate::errors::{DeliveryError, ResolveError};
use crate::media::{artifact_stem, slug, source_path, MediaResolver};
use crate::models::media::{Encoding, MediaDescriptor};
use crate::models::message::InboundMessage;
use crate::models::pipeline::PipelineResult;
use crate::notification::webhook::{WebhookEvent, WebhookNotifier};
use crate::transcode::{self, Transcoder};
use crate::transport::ChatTransport;

/// Returns the message text as a URL if the whole text is an http(s) link.
pub fn extract_url(text: &str) -> Option<String> {
    let candidate = text.trim();
    if candidate.is_empty() || candidate.contains(char::is_whitespace) {
        return None;
    }
    let parsed = url::Url::parse(candidate).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Some(parsed.to_string()),
        _ => None,
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn ChatTransport>,
    resolver: Arc<dyn MediaResolver>,
    primary: Arc<dyn Transcoder>,
    fallback: Arc<dyn Transcoder>,
    work_dir: PathBuf,
    notify_failures: bool,
    webhook: WebhookNotifier,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        resolver: Arc<dyn MediaResolver>,
        primary: Arc<dyn Transcoder>,
        fallback: Arc<dyn Transcoder>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            resolver,
            primary,
            fallback,
            work_dir: work_dir.into(),
            notify_failures: false,
            webhook: WebhookNotifier::new(Vec::new(), None),
        }
    }

    pub fn with_notify_failures(mut self, notify_failures: bool) -> Self {
        self.notify_failures = notify_failures;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = webhook;
        self
    }

    /// Runs one authorized message through the pipeline.
    ///
    /// `max_minutes == 0` disables the duration limit.
    pub async fn run(&self, msg: &InboundMessage, max_minutes: u64) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %run_id, chat_id = msg.chat_id);
        let run_tag = run_id.simple().to_string()[..8].to_string();

        let result = self
            .execute(msg, max_minutes, &run_tag)
            .instrument(span.clone())
            .await;

        async {
            if result.is_failure() {
                warn!(outcome = result.kind(), detail = %result, "pipeline stopped");
            } else if result != PipelineResult::Ignored {
                info!(outcome = result.kind(), detail = %result, "pipeline finished");
            }

            if let Some(text) = result.requester_text(self.notify_failures) {
                if let Err(e) = self.transport.send_text(msg.chat_id, &text).await {
                    warn!(error = %e, "requester reply not delivered");
                }
            }
        }
        .instrument(span)
        .await;

        if result != PipelineResult::Ignored {
            self.webhook.dispatch(WebhookEvent::pipeline_finished(
                msg.chat_id,
                &run_id.to_string(),
                &result,
            ));
        }
        result
    }

    async fn execute(&self, msg: &InboundMessage, max_minutes: u64, run_tag: &str) -> PipelineResult {
        let Some(url) = extract_url(&msg.text) else {
            debug!("not a link, skipping message");
            return PipelineResult::Ignored;
        };
        info!(url = %url, requester = %msg.display_name(), "processing request");

        if max_minutes > 0 {
            let limit = Duration::from_secs(max_minutes.saturating_mul(60));
            match self.resolver.lookup_duration(&url).await {
                Ok(duration) if duration > limit => {
                    info!(
                        url = %url,
                        duration_secs = duration.as_secs(),
                        limit_minutes = max_minutes,
                        "video too long"
                    );
                    return PipelineResult::duration_rejected(duration, max_minutes);
                }
                Ok(_) => {}
                Err(e) => {
                    return PipelineResult::ResolveFailed {
                        reason: e.to_string(),
                    }
                }
            }
        }

        let descriptor = match self.resolver.resolve(&url).await {
            Ok(d) => d,
            Err(e) => {
                return PipelineResult::ResolveFailed {
                    reason: e.to_string(),
                }
            }
        };
        let Some(encoding) = descriptor.best_audio().cloned() else {
            return PipelineResult::ResolveFailed {
                reason: ResolveError::NoSuitableEncoding.to_string(),
            };
        };

        let stem = artifact_stem(&descriptor.title, run_tag);
        let mut artifacts = Artifacts::new();
        artifacts.track(source_path(&self.work_dir, &stem, &encoding.extension));

        let result = self
            .produce_and_deliver(msg, &descriptor, &encoding, &stem, &mut artifacts)
            .await;

        let removed = artifacts.cleanup().await;
        debug!(removed, "artifacts cleaned up");
        result
    }

    async fn produce_and_deliver(
        &self,
        msg: &InboundMessage,
        descriptor: &MediaDescriptor,
        encoding: &Encoding,
        stem: &str,
        artifacts: &mut Artifacts,
    ) -> PipelineResult {
        let source = match self
            .resolver
            .fetch(descriptor, encoding, &self.work_dir, stem)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                return PipelineResult::DownloadFailed {
                    reason: e.to_string(),
                }
            }
        };
        artifacts.track(&source);
        artifacts.track(transcode::output_path(&source, stem));

        let (audio, used_fallback) = match self.primary.transcode(&source, stem).await {
            Ok(path) => (path, false),
            Err(e) => {
                warn!(
                    transcoder = self.primary.name(),
                    error = %e,
                    "primary transcode failed, trying fallback"
                );
                match self.fallback.transcode(&source, stem).await {
                    Ok(path) => (path, true),
                    Err(e) => {
                        return PipelineResult::TranscodeFailed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };
        artifacts.track(&audio);

        let file_name = format!("{}.mp3", slug::slugify(&descriptor.title));
        let err = match self.deliver(msg, &audio, &file_name).await {
            Ok(()) => return PipelineResult::Delivered { used_fallback },
            Err(e) => e,
        };

        if used_fallback {
            return PipelineResult::DeliveryFailed {
                reason: err.to_string(),
                used_fallback,
            };
        }

        warn!(error = %err, "delivery failed, retrying with fallback transcoder");
        let audio = match self.fallback.transcode(&source, stem).await {
            Ok(path) => path,
            Err(e) => {
                return PipelineResult::TranscodeFailed {
                    reason: format!("{} (after delivery failure: {})", e, err),
                }
            }
        };
        artifacts.track(&audio);

        match self.deliver(msg, &audio, &file_name).await {
            Ok(()) => PipelineResult::Delivered {
                used_fallback: true,
            },
            Err(e) => PipelineResult::DeliveryFailed {
                reason: e.to_string(),
                used_fallback: true,
            },
        }
    }

    async fn deliver(
        &self,
        msg: &InboundMessage,
        audio: &Path,
        file_name: &str,
    ) -> Result<(), DeliveryError> {
        self.transport
            .send_audio(msg.chat_id, audio, file_name, msg.message_id)
            .await?;
        info!(path = %audio.display(), "audio delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_url() {
        assert_eq!(
            extract_url("  https://www.youtube.com/watch?v=abc  ").as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
        assert!(extract_url("http://youtu.be/x").is_some());
    }

    #[test]
    fn test_extract_url_rejects_chatter() {
        assert_eq!(extract_url("hello there"), None);
        assert_eq!(extract_url("check https://youtu.be/x"), None);
        assert_eq!(extract_url(""), None);
        assert_eq!(extract_url("ftp://example.com/file"), None);
        assert_eq!(extract_url("file:///etc/passwd"), None);
        assert_eq!(extract_url("mailto:a@b.c"), None);
    }
}
