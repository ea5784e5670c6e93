//! Durable allow/deny lists.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::errors::PersistenceError;
use crate::models::approval::{Decision, DecisionToken};

/// Where an updated config goes before it is adopted in memory.
pub trait ConfigStore: Send + Sync {
    fn save(&self, cfg: &AppConfig) -> Result<(), PersistenceError>;
}

/// The config file itself, rewritten with temp-file + rename.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn save(&self, cfg: &AppConfig) -> Result<(), PersistenceError> {
        cfg.write_atomic(&self.path)
    }
}

/// Returns a copy of `cfg` with the decision applied. The requester is
/// appended to the matching list unless already present.
pub fn apply_decision(cfg: &AppConfig, token: &DecisionToken) -> AppConfig {
    let mut next = cfg.clone();
    let list = match token.decision {
        Decision::Approve => &mut next.authorized_ids,
        Decision::Deny => &mut next.banned_ids,
    };
    if !list.contains(&token.requester_id) {
        list.push(token.requester_id);
    }
    next
}
