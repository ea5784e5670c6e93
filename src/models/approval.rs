use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Deny => "DENY",
        }
    }
}

/// Payload carried by an approval button: `"<APPROVE|DENY>.<requesterID>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionToken {
    pub decision: Decision,
    pub requester_id: i64,
}

impl DecisionToken {
    pub fn approve(requester_id: i64) -> Self {
        Self {
            decision: Decision::Approve,
            requester_id,
        }
    }

    pub fn deny(requester_id: i64) -> Self {
        Self {
            decision: Decision::Deny,
            requester_id,
        }
    }
}

impl fmt::Display for DecisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.decision.as_str(), self.requester_id)
    }
}

impl FromStr for DecisionToken {
    type Err = GateError;

    /// Also accepts `OK.<id>` / `CANCEL.<id>` left on prompts sent by older builds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GateError::MalformedToken(s.to_string());

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 {
            return Err(malformed());
        }
        let decision = match parts[0] {
            "APPROVE" | "OK" => Decision::Approve,
            "DENY" | "CANCEL" => Decision::Deny,
            _ => return Err(malformed()),
        };
        let requester_id = parts[1].parse::<i64>().map_err(|_| malformed())?;

        Ok(Self {
            decision,
            requester_id,
        })
    }
}

/// Result of checking a requester against the approval lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Allowed,
    Pending,
    Denied,
}

/// What a resolved decision did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The requester was not pending; nothing changed.
    Stale,
    Approved { requester_id: i64 },
    Denied { requester_id: i64 },
}

impl Resolution {
    /// Callback answer shown to the admin.
    pub fn reply_text(&self) -> &'static str {
        match self {
            Resolution::Stale => "Command not actual! Skipping...",
            Resolution::Approved { .. } => "Successfully added chat to whitelist!",
            Resolution::Denied { .. } => "Chat was blacklisted for bot!",
        }
    }

    /// Direct notice for the requester, if any.
    pub fn requester_notice(&self) -> Option<(i64, &'static str)> {
        match self {
            Resolution::Stale => None,
            Resolution::Approved { requester_id } => Some((
                *requester_id,
                "Successfully authenticated. Now you can download videos!",
            )),
            Resolution::Denied { requester_id } => {
                Some((*requester_id, "You were not allowed to use that bot. Sorry."))
            }
        }
    }
}
