//! Media resolution and download.

pub mod slug;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{DownloadError, ResolveError};
use crate::models::media::{Encoding, MediaDescriptor};

/// Turns a URL into something downloadable and downloads it.
///
/// Implementations own file naming inside `dest_dir`; retry policy belongs to
/// the caller.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Cheap duration-only lookup.
    async fn lookup_duration(&self, url: &str) -> Result<Duration, ResolveError>;

    async fn resolve(&self, url: &str) -> Result<MediaDescriptor, ResolveError>;

    /// Downloads `encoding` into `dest_dir` as `<stem>.src.<ext>`.
    async fn fetch(
        &self,
        descriptor: &MediaDescriptor,
        encoding: &Encoding,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, DownloadError>;
}

/// Where a fetched source lands.
pub fn source_path(dest_dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let ext = slug::slugify(extension);
    dest_dir.join(format!("{}.src.{}", stem, ext))
}

/// Per-run file stem: the slugged title plus a short run tag, so concurrent
/// runs for the same video never share files.
pub fn artifact_stem(title: &str, run_tag: &str) -> String {
    format!("{}-{}", slug::slugify(title), slug::slugify(run_tag))
}
