use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration failures. Fatal: the process exits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file {0} has no BotAPIKey")]
    MissingCredential(PathBuf),

    #[error("bot credential rejected: {0}")]
    CredentialRejected(String),
}

/// Chat transport failures (sending text, prompts, audio, callback answers).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),

    #[error("cannot read upload {path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a video: {0}")]
    NotAVideo(String),

    #[error("no encoding with a non-zero audio bitrate")]
    NoSuitableEncoding,

    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download process failed: {0}")]
    Process(String),

    #[error("download produced no file at {0}")]
    Missing(PathBuf),

    #[error("download io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The process ran but printed something. Audio produced in that case is
    /// not trusted.
    #[error("transcoder produced diagnostic output: {0}")]
    NonEmptyDiagnostic(String),

    #[error("transcoder process error: {0}")]
    Process(String),

    #[error("upload to conversion service failed: {0}")]
    Upload(String),

    #[error("conversion service failed: {0}")]
    Conversion(String),

    #[error("converted file download failed: {0}")]
    Download(String),
}

#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(#[from] pub TransportError);

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("config write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config rename failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("config write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures of the authorization gate's decision path.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("malformed decision token: {0:?}")]
    MalformedToken(String),

    #[error("decision not persisted: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("admin prompt undeliverable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("webhook delivery failed after {attempts} attempts: {url}")]
    Webhook { attempts: u32, url: String },
}
