//! Authorization gate: who may use the bot, and the admin's answers.
//!
//! The approval lists and the pending set sit behind one mutex. Per-message
//! tasks lock it to check (and possibly register) a requester; the callback
//! path locks it for the whole decide → persist → adopt sequence, so the
//! in-memory lists only change after the file on disk has.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::pending::PendingTracker;
use super::store::{apply_decision, ConfigStore};
use crate::config::AppConfig;
use crate::errors::{GateError, PersistenceError};
use crate::models::approval::{AuthOutcome, Decision, DecisionToken, Resolution};
use crate::models::message::{DecisionCallback, InboundMessage};
use crate::notification::admin::AdminNotifier;
use crate::notification::webhook::{WebhookEvent, WebhookNotifier};
use crate::transport::ChatTransport;

struct GateState {
    config: AppConfig,
    pending: PendingTracker,
}

#[derive(Clone)]
pub struct AuthorizationGate {
    state: Arc<Mutex<GateState>>,
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn ChatTransport>,
    notifier: AdminNotifier,
    webhook: WebhookNotifier,
}

impl AuthorizationGate {
    pub fn new(
        config: AppConfig,
        pending_ttl: Option<Duration>,
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn ChatTransport>,
        notifier: AdminNotifier,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                config,
                pending: PendingTracker::new(pending_ttl),
            })),
            store,
            transport,
            notifier,
            webhook: WebhookNotifier::new(Vec::new(), None),
        }
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = webhook;
        self
    }

    /// Snapshot of the authoritative config.
    pub async fn config(&self) -> AppConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn is_pending(&self, requester_id: i64) -> bool {
        self.state
            .lock()
            .await
            .pending
            .contains(requester_id, Instant::now())
    }

    /// Decides whether `msg`'s requester may proceed.
    ///
    /// Ban is checked first, then open mode, then the allow list. An unknown
    /// requester becomes pending and the admin prompt is sent in the
    /// background; a requester that is already pending gets no second prompt.
    pub async fn authorize(&self, msg: &InboundMessage) -> AuthOutcome {
        let requester_id = msg.chat_id;
        let now = Instant::now();

        let (admin_id, since) = {
            let mut state = self.state.lock().await;
            if state.config.is_banned(requester_id) {
                debug!(requester_id, "message from banned chat skipped");
                return AuthOutcome::Denied;
            }
            let Some(admin_id) = state.config.admin() else {
                return AuthOutcome::Allowed;
            };
            if requester_id == admin_id || state.config.is_authorized(requester_id) {
                return AuthOutcome::Allowed;
            }
            match state.pending.register(requester_id, now) {
                Some(since) => (admin_id, since),
                None => {
                    debug!(requester_id, "already awaiting admin decision");
                    return AuthOutcome::Pending;
                }
            }
        };

        info!(requester_id, requester = %msg.display_name(), "asking admin for approval");
        self.webhook
            .dispatch(WebhookEvent::approval_requested(requester_id, &msg.display_name()));

        let gate = self.clone();
        let msg = msg.clone();
        tokio::spawn(async move {
            gate.prompt_admin(admin_id, msg, since).await;
        });

        AuthOutcome::Pending
    }

    async fn prompt_admin(&self, admin_id: i64, msg: InboundMessage, since: Instant) {
        if let Err(e) = self.notifier.send_prompt(admin_id, &msg).await {
            error!(requester_id = msg.chat_id, error = %e, "admin prompt undeliverable");
            // Without a prompt the admin can never answer; let the next message try again.
            let mut state = self.state.lock().await;
            if state.pending.release(msg.chat_id, since) {
                info!(requester_id = msg.chat_id, "pending entry released");
            }
        }
    }

    /// Applies a decision token without persisting anything.
    ///
    /// Returns the config that should become authoritative and what happened.
    /// A token for a requester that is not pending changes nothing.
    pub fn decide(
        config: &AppConfig,
        pending: &PendingTracker,
        token: &DecisionToken,
        now: Instant,
    ) -> (AppConfig, Resolution) {
        if !pending.contains(token.requester_id, now) {
            return (config.clone(), Resolution::Stale);
        }
        let next = apply_decision(config, token);
        let resolution = match token.decision {
            Decision::Approve => Resolution::Approved {
                requester_id: token.requester_id,
            },
            Decision::Deny => Resolution::Denied {
                requester_id: token.requester_id,
            },
        };
        (next, resolution)
    }

    /// Parses `data`, decides, persists and only then adopts the new config.
    ///
    /// On a persistence error the old config stays in place and the requester
    /// stays pending, so the admin can press the button again.
    pub async fn resolve_decision(&self, data: &str) -> Result<Resolution, GateError> {
        let token: DecisionToken = data.parse()?;
        let now = Instant::now();

        let mut state = self.state.lock().await;
        let (next, resolution) = Self::decide(&state.config, &state.pending, &token, now);
        if resolution == Resolution::Stale {
            return Ok(resolution);
        }

        // File IO runs on the blocking pool; the lock stays held so writes never interleave.
        let store = Arc::clone(&self.store);
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(PersistenceError::from)??;
        state.config = next;
        state.pending.take(token.requester_id, now);

        info!(
            requester_id = token.requester_id,
            decision = token.decision.as_str(),
            "admin decision persisted"
        );
        Ok(resolution)
    }

    /// Handles an inline-button press end to end: resolve, answer the admin,
    /// notify the requester.
    pub async fn handle_callback(&self, cb: &DecisionCallback) {
        let admin = self.state.lock().await.config.admin();
        if admin != Some(cb.from_user_id) {
            warn!(user_id = cb.from_user_id, "decision from non-admin ignored");
            self.answer(cb, "Unauthorized.").await;
            return;
        }

        match self.resolve_decision(&cb.data).await {
            Ok(resolution) => {
                self.answer(cb, resolution.reply_text()).await;
                if let Some((requester_id, notice)) = resolution.requester_notice() {
                    if let Err(e) = self.transport.send_text(requester_id, notice).await {
                        warn!(requester_id, error = %e, "decision notice not delivered");
                    }
                }
                match resolution {
                    Resolution::Approved { requester_id } => self
                        .webhook
                        .dispatch(WebhookEvent::approval_decided(requester_id, Decision::Approve)),
                    Resolution::Denied { requester_id } => self
                        .webhook
                        .dispatch(WebhookEvent::approval_decided(requester_id, Decision::Deny)),
                    Resolution::Stale => debug!(data = %cb.data, "stale decision"),
                }
            }
            Err(e @ GateError::MalformedToken(_)) => {
                warn!(error = %e, "decision skipped");
                self.answer(cb, "Unknown decision, skipping.").await;
            }
            Err(e @ GateError::Persistence(_)) => {
                error!(error = %e, "decision not saved, config unchanged");
                self.answer(cb, "Could not save the decision. Try again.").await;
            }
        }
    }

    async fn answer(&self, cb: &DecisionCallback, text: &str) {
        if let Err(e) = self.transport.answer_callback(&cb.callback_id, text).await {
            warn!(error = %e, "callback answer not delivered");
        }
    }

    /// Drops expired pending entries. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.state
            .lock()
            .await
            .pending
            .evict_expired(Instant::now())
    }
}
