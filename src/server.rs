//! Update receive loop.
//!
//! Decision callbacks are handled inline, one at a time, so config writes
//! never interleave. Every message gets its own task and the loop goes
//! straight back to polling.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::approval::AuthorizationGate;
use crate::models::approval::AuthOutcome;
use crate::models::message::{InboundEvent, InboundMessage};
use crate::models::pipeline::PipelineResult;
use crate::notification::retry::RetryPolicy;
use crate::pipeline::RequestPipeline;
use crate::transport::UpdateSource;

#[derive(Clone)]
pub struct Dispatcher {
    gate: AuthorizationGate,
    pipeline: Arc<RequestPipeline>,
}

impl Dispatcher {
    pub fn new(gate: AuthorizationGate, pipeline: Arc<RequestPipeline>) -> Self {
        Self { gate, pipeline }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Routes one event. Returns the handle of the spawned task for messages.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<JoinHandle<Option<PipelineResult>>> {
        match event {
            InboundEvent::Decision(cb) => {
                debug!(user_id = cb.from_user_id, "decision callback");
                self.gate.handle_callback(&cb).await;
                None
            }
            InboundEvent::Message(msg) => {
                let this = self.clone();
                Some(tokio::spawn(async move { this.process(msg).await }))
            }
        }
    }

    /// Authorizes a message and, if allowed, runs the pipeline for it.
    /// `None` means the requester was not allowed to proceed.
    pub async fn process(&self, msg: InboundMessage) -> Option<PipelineResult> {
        match self.gate.authorize(&msg).await {
            AuthOutcome::Allowed => {
                let max_minutes = self.gate.config().await.max_video_duration_minutes;
                Some(self.pipeline.run(&msg, max_minutes).await)
            }
            AuthOutcome::Pending | AuthOutcome::Denied => None,
        }
    }

    /// Polls `source` forever. Poll errors back off and retry.
    pub async fn serve<S: UpdateSource>(&self, mut source: S) {
        let backoff = RetryPolicy {
            max_retries: 0,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter_ms: 100,
        };
        let mut failures: u32 = 0;

        info!("receiving updates");
        loop {
            match source.poll().await {
                Ok(events) => {
                    failures = 0;
                    for event in events {
                        self.dispatch(event).await;
                    }
                }
                Err(e) => {
                    failures = (failures + 1).min(16);
                    let delay = backoff.backoff(failures);
                    error!(error = %e, failures, delay_ms = delay.as_millis() as u64, "polling updates failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
