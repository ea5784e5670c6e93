//! Telegram Bot API adapter built on `teloxide`.

use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ReplyParameters, UpdateKind,
};
use teloxide::RequestError;
use tracing::debug;

use super::{ChatTransport, UpdateSource};
use crate::errors::{ConfigError, TransportError};
use crate::models::approval::DecisionToken;
use crate::models::message::{DecisionCallback, InboundEvent, InboundMessage};

/// Long-poll window. Must stay below teloxide's HTTP client timeout.
const POLL_TIMEOUT_SECS: u32 = 10;

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Points the bot at a different Bot API server (self-hosted server, tests).
    pub fn with_api_url(mut self, url: url::Url) -> Self {
        self.bot = self.bot.set_api_url(url);
        self
    }

    /// Checks the credential with `getMe`. Returns the bot's username.
    pub async fn verify(&self) -> Result<String, ConfigError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| ConfigError::CredentialRejected(e.to_string()))?;
        Ok(me.user.username.clone().unwrap_or_default())
    }

    pub fn updates(&self) -> TelegramUpdates {
        TelegramUpdates {
            bot: self.bot.clone(),
            offset: 0,
        }
    }
}

fn request_err(e: RequestError) -> TransportError {
    TransportError::Request(e.to_string())
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(request_err)
    }

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<(), TransportError> {
        self.bot
            .forward_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(request_err)
    }

    async fn send_decision_prompt(
        &self,
        admin_id: i64,
        text: &str,
        approve: DecisionToken,
        deny: DecisionToken,
    ) -> Result<(), TransportError> {
        let keyboard = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("Approve", approve.to_string()),
            InlineKeyboardButton::callback("Deny", deny.to_string()),
        ]]);

        self.bot
            .send_message(ChatId(admin_id), text)
            .reply_markup(keyboard)
            .await
            .map(|_| ())
            .map_err(request_err)
    }

    async fn send_audio(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        reply_to: i32,
    ) -> Result<(), TransportError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| TransportError::Upload {
                path: path.to_path_buf(),
                source,
            })?;

        let audio = InputFile::file(path.to_path_buf()).file_name(file_name.to_string());
        self.bot
            .send_audio(ChatId(chat_id), audio)
            .reply_parameters(ReplyParameters::new(MessageId(reply_to)))
            .await
            .map(|_| ())
            .map_err(request_err)
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        self.bot
            .answer_callback_query(callback_id.to_string())
            .text(text.to_string())
            .await
            .map(|_| ())
            .map_err(request_err)
    }
}

/// `getUpdates` long-poll cursor.
pub struct TelegramUpdates {
    bot: Bot,
    offset: i32,
}

#[async_trait]
impl UpdateSource for TelegramUpdates {
    async fn poll(&mut self) -> Result<Vec<InboundEvent>, TransportError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(POLL_TIMEOUT_SECS)
            .await
            .map_err(request_err)?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            self.offset = update.id.as_offset();
            match to_event(update.kind) {
                Some(event) => events.push(event),
                None => debug!("skipping unsupported update"),
            }
        }
        Ok(events)
    }
}

fn to_event(kind: UpdateKind) -> Option<InboundEvent> {
    match kind {
        UpdateKind::Message(m) | UpdateKind::ChannelPost(m) => {
            Some(InboundEvent::Message(to_inbound(&m)))
        }
        UpdateKind::CallbackQuery(q) => Some(InboundEvent::Decision(DecisionCallback {
            callback_id: q.id.clone(),
            from_user_id: q.from.id.0 as i64,
            data: q.data.clone()?,
        })),
        _ => None,
    }
}

fn to_inbound(m: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: m.chat.id.0,
        message_id: m.id.0,
        chat_title: m.chat.title().map(String::from),
        sender_username: m.from.as_ref().and_then(|u| u.username.clone()),
        text: m.text().or_else(|| m.caption()).unwrap_or_default().to_string(),
    }
}
