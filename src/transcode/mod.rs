//! Video → MP3 conversion: a local primary and a remote fallback.

pub mod ffmpeg;
pub mod remote;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::errors::TranscodeError;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Converts `source` into `output_path(source, stem)`.
    ///
    /// Calls must be independent: one instance serves every pipeline run.
    async fn transcode(&self, source: &Path, stem: &str) -> Result<PathBuf, TranscodeError>;
}

/// The MP3 produced for `source`, next to it.
pub fn output_path(source: &Path, stem: &str) -> PathBuf {
    source.with_file_name(format!("{}.mp3", stem))
}

/// Deletes a leftover output so the result reflects this call only.
pub(crate) async fn remove_stale(path: &Path) -> Result<(), TranscodeError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            warn!(path = %path.display(), "removed stale transcoder output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TranscodeError::Process(format!(
            "cannot remove stale output {}: {}",
            path.display(),
            e
        ))),
    }
}
