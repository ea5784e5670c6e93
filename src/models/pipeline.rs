use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineResult {
    /// The message was not a link.
    Ignored,
    Delivered {
        used_fallback: bool,
    },
    DurationRejected {
        duration_secs: u64,
        limit_minutes: u64,
    },
    ResolveFailed {
        reason: String,
    },
    DownloadFailed {
        reason: String,
    },
    TranscodeFailed {
        reason: String,
    },
    DeliveryFailed {
        reason: String,
        used_fallback: bool,
    },
}

impl PipelineResult {
    pub fn duration_rejected(duration: Duration, limit_minutes: u64) -> Self {
        PipelineResult::DurationRejected {
            duration_secs: duration.as_secs(),
            limit_minutes,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            PipelineResult::Ignored | PipelineResult::Delivered { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineResult::Ignored => "ignored",
            PipelineResult::Delivered { .. } => "delivered",
            PipelineResult::DurationRejected { .. } => "duration_rejected",
            PipelineResult::ResolveFailed { .. } => "resolve_failed",
            PipelineResult::DownloadFailed { .. } => "download_failed",
            PipelineResult::TranscodeFailed { .. } => "transcode_failed",
            PipelineResult::DeliveryFailed { .. } => "delivery_failed",
        }
    }

    /// Text shown to the requester. Duration rejections always get one; other
    /// failures only when failure notices are switched on.
    pub fn requester_text(&self, notify_failures: bool) -> Option<String> {
        match self {
            PipelineResult::DurationRejected { limit_minutes, .. } => Some(format!(
                "I am not allowed to download videos longer than {} minutes :(",
                limit_minutes
            )),
            PipelineResult::ResolveFailed { .. } if notify_failures => {
                Some("Could not find a downloadable audio track for that link.".into())
            }
            PipelineResult::DownloadFailed { .. } if notify_failures => {
                Some("Downloading that video failed.".into())
            }
            PipelineResult::TranscodeFailed { .. } if notify_failures => {
                Some("Converting that video to audio failed.".into())
            }
            PipelineResult::DeliveryFailed { .. } if notify_failures => {
                Some("Could not send the audio file.".into())
            }
            _ => None,
        }
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineResult::Ignored => write!(f, "ignored"),
            PipelineResult::Delivered { used_fallback } => {
                write!(f, "delivered (fallback: {})", used_fallback)
            }
            PipelineResult::DurationRejected {
                duration_secs,
                limit_minutes,
            } => write!(
                f,
                "duration {}s over limit of {} minutes",
                duration_secs, limit_minutes
            ),
            PipelineResult::ResolveFailed { reason }
            | PipelineResult::DownloadFailed { reason }
            | PipelineResult::TranscodeFailed { reason } => {
                write!(f, "{}: {}", self.kind(), reason)
            }
            PipelineResult::DeliveryFailed {
                reason,
                used_fallback,
            } => write!(f, "delivery_failed (fallback: {}): {}", used_fallback, reason),
        }
    }
}
