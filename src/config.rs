//! Durable bot configuration and runtime settings.
//!
//! `AppConfig` is the JSON document on disk (approval lists live there);
//! `Settings` is everything else and comes from the environment.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, PersistenceError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "BotAPIKey", default)]
    pub bot_api_key: String,
    /// 0 = no admin, every non-banned requester is allowed.
    #[serde(rename = "AdminID", default)]
    pub admin_id: i64,
    #[serde(rename = "AuthorizedIDs", default)]
    pub authorized_ids: Vec<i64>,
    #[serde(rename = "BannedIDs", default)]
    pub banned_ids: Vec<i64>,
    /// 0 = unlimited.
    #[serde(rename = "MaxVideoDurationMinutes", default)]
    pub max_video_duration_minutes: u64,
}

impl AppConfig {
    pub fn admin(&self) -> Option<i64> {
        (self.admin_id != 0).then_some(self.admin_id)
    }

    pub fn is_banned(&self, id: i64) -> bool {
        self.banned_ids.contains(&id)
    }

    pub fn is_authorized(&self, id: i64) -> bool {
        self.authorized_ids.contains(&id)
    }

    /// Reads and validates the config file. Any failure here is fatal at startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if cfg.bot_api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(path.to_path_buf()));
        }
        Ok(cfg)
    }

    /// Writes the config next to `path` in a temp file, then renames it over
    /// `path`. A crash mid-write leaves the previous file intact.
    pub fn write_atomic(&self, path: &Path) -> Result<(), PersistenceError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&buf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }
}

/// Runtime settings that are not part of the durable config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub work_dir: PathBuf,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub converter_url: String,
    /// `None` = pending entries never expire.
    pub pending_ttl: Option<Duration>,
    /// Reply to the requester on every classified failure, not only on
    /// duration rejections.
    pub notify_failures: bool,
    /// Comma-separated list of webhook URLs to notify on decisions and
    /// pipeline outcomes.
    pub webhook_urls: Vec<String>,
    pub webhook_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./tmp"),
            ytdlp_bin: "yt-dlp".into(),
            ffmpeg_bin: "ffmpeg".into(),
            converter_url: "https://s4.aconvert.com".into(),
            pending_ttl: Some(Duration::from_secs(86_400)),
            notify_failures: false,
            webhook_urls: Vec::new(),
            webhook_secret: None,
        }
    }
}

pub fn load_settings() -> Settings {
    dotenvy::dotenv().ok();
    let defaults = Settings::default();

    let pending_ttl = match std::env::var("YTAUDIO_PENDING_TTL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.pending_ttl,
    };

    Settings {
        work_dir: std::env::var("YTAUDIO_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir),
        ytdlp_bin: std::env::var("YTAUDIO_YTDLP_BIN").unwrap_or(defaults.ytdlp_bin),
        ffmpeg_bin: std::env::var("YTAUDIO_FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
        converter_url: std::env::var("YTAUDIO_CONVERTER_URL")
            .unwrap_or(defaults.converter_url),
        pending_ttl,
        notify_failures: std::env::var("YTAUDIO_NOTIFY_FAILURES")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false),
        webhook_urls: parse_url_list(&std::env::var("YTAUDIO_WEBHOOK_URLS").unwrap_or_default()),
        webhook_secret: std::env::var("YTAUDIO_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty()),
    }
}

pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
