/// A plain message or channel post, reduced to what the gateway needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Requester identity: the chat the message came from.
    pub chat_id: i64,
    pub message_id: i32,
    /// Set for groups and channels.
    pub chat_title: Option<String>,
    pub sender_username: Option<String>,
    pub text: String,
}

impl InboundMessage {
    /// How the requester is named in the admin prompt.
    pub fn display_name(&self) -> String {
        match (&self.chat_title, &self.sender_username) {
            (Some(title), _) if !title.is_empty() => format!("chat {}", title),
            (_, Some(user)) if !user.is_empty() => format!("user @{}", user),
            _ => format!("chat {}", self.chat_id),
        }
    }
}

/// An inline-button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionCallback {
    pub callback_id: String,
    pub from_user_id: i64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Decision(DecisionCallback),
}
