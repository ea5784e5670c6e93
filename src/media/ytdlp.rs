//! `yt-dlp` subprocess wrapper.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{source_path, MediaResolver};
use crate::errors::{DownloadError, ResolveError};
use crate::models::media::{Encoding, MediaDescriptor};

pub struct YtDlpResolver {
    bin: String,
}

impl YtDlpResolver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, std::io::Error> {
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn query(&self, args: &[&str]) -> Result<String, ResolveError> {
        let output = self
            .run(args)
            .await
            .map_err(|e| ResolveError::Unavailable(format!("cannot start {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn classify_failure(stderr: &str) -> ResolveError {
    if stderr.contains("Unsupported URL") || stderr.contains("is not a valid URL") {
        ResolveError::NotAVideo(stderr.to_string())
    } else {
        ResolveError::Unavailable(stderr.to_string())
    }
}

/// Parses `[[[D:]H:]M:]S` as printed by `--get-duration`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    const UNITS: [u64; 4] = [1, 60, 3600, 86_400];

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() > UNITS.len() {
        return None;
    }

    let mut secs = 0u64;
    for (part, unit) in parts.iter().rev().zip(UNITS) {
        let value: u64 = part.trim().parse().ok()?;
        secs = secs.checked_add(value.checked_mul(unit)?)?;
    }
    Some(Duration::from_secs(secs))
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<FormatJson>,
    format_id: Option<String>,
    ext: Option<String>,
    abr: Option<f64>,
    acodec: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    ext: String,
    abr: Option<f64>,
    acodec: Option<String>,
}

fn audio_bitrate(abr: Option<f64>, acodec: Option<&str>) -> f64 {
    if acodec == Some("none") {
        return 0.0;
    }
    abr.unwrap_or(0.0)
}

/// Builds a descriptor from `--dump-single-json` output.
pub fn parse_descriptor(url: &str, raw: &str) -> Result<MediaDescriptor, ResolveError> {
    let info: InfoJson = serde_json::from_str(raw)
        .map_err(|e| ResolveError::Unavailable(format!("unreadable resolver output: {}", e)))?;

    if matches!(info.kind.as_deref(), Some("playlist") | Some("multi_video")) {
        return Err(ResolveError::NotAVideo(format!("{} is a playlist", url)));
    }

    let mut encodings: Vec<Encoding> = info
        .formats
        .iter()
        .map(|f| Encoding {
            format_id: f.format_id.clone(),
            extension: f.ext.clone(),
            audio_bitrate: audio_bitrate(f.abr, f.acodec.as_deref()),
        })
        .collect();

    if encodings.is_empty() {
        if let (Some(id), Some(ext)) = (info.format_id.clone(), info.ext.clone()) {
            encodings.push(Encoding {
                format_id: id,
                extension: ext,
                audio_bitrate: audio_bitrate(info.abr, info.acodec.as_deref()),
            });
        }
    }
    if encodings.is_empty() {
        return Err(ResolveError::NotAVideo(format!("{} has no media formats", url)));
    }

    Ok(MediaDescriptor {
        url: url.to_string(),
        title: info.title.unwrap_or_else(|| "audio".to_string()),
        duration: Duration::from_secs_f64(info.duration.unwrap_or(0.0).max(0.0)),
        encodings,
    })
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn lookup_duration(&self, url: &str) -> Result<Duration, ResolveError> {
        let out = self
            .query(&["--no-playlist", "--no-warnings", "--get-duration", url])
            .await?;
        parse_duration(&out).ok_or_else(|| {
            ResolveError::Unavailable(format!("unparsable video duration: {:?}", out.trim()))
        })
    }

    async fn resolve(&self, url: &str) -> Result<MediaDescriptor, ResolveError> {
        let out = self
            .query(&["--no-playlist", "--no-warnings", "--dump-single-json", url])
            .await?;
        let descriptor = parse_descriptor(url, &out)?;
        debug!(
            url,
            title = %descriptor.title,
            formats = descriptor.encodings.len(),
            "resolved media"
        );
        Ok(descriptor)
    }

    async fn fetch(
        &self,
        descriptor: &MediaDescriptor,
        encoding: &Encoding,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, DownloadError> {
        let dest = source_path(dest_dir, stem, &encoding.extension);
        let dest_str = dest.to_string_lossy().into_owned();

        info!(url = %descriptor.url, format = %encoding.format_id, "started downloading video");
        let output = self
            .run(&[
                "--quiet",
                "--no-warnings",
                "--no-playlist",
                "--no-part",
                "-f",
                &encoding.format_id,
                "-o",
                &dest_str,
                &descriptor.url,
            ])
            .await
            .map_err(|e| DownloadError::Process(format!("cannot start {}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(DownloadError::Process(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if tokio::fs::metadata(&dest).await.is_err() {
            return Err(DownloadError::Missing(dest));
        }

        info!(url = %descriptor.url, path = %dest.display(), "finished downloading video");
        Ok(dest)
    }
}
