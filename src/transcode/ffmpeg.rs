use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::{output_path, remove_stale, Transcoder};
use crate::errors::TranscodeError;

/// Local `ffmpeg` conversion.
///
/// Success means exit status 0 AND nothing printed on stdout or stderr. ffmpeg
/// runs at `-loglevel warning`, so any warning about the stream fails the
/// conversion; such files tend to be rejected on upload.
pub struct FfmpegTranscoder {
    bin: String,
}

impl FfmpegTranscoder {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

/// Classifies a finished ffmpeg run.
pub fn classify_output(
    success: bool,
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<(), TranscodeError> {
    let diagnostic = format!(
        "{}{}",
        String::from_utf8_lossy(stdout),
        String::from_utf8_lossy(stderr)
    );
    let diagnostic = diagnostic.trim();

    if !success {
        return Err(TranscodeError::Process(format!(
            "exit status {:?}: {}",
            code, diagnostic
        )));
    }
    if !diagnostic.is_empty() {
        return Err(TranscodeError::NonEmptyDiagnostic(diagnostic.to_string()));
    }
    Ok(())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, source: &Path, stem: &str) -> Result<PathBuf, TranscodeError> {
        let dest = output_path(source, stem);
        remove_stale(&dest).await?;

        info!(source = %source.display(), "start ffmpeg decoding");
        let output = Command::new(&self.bin)
            .arg("-hide_banner")
            .arg("-nostdin")
            .args(["-loglevel", "warning"])
            .arg("-i")
            .arg(source)
            .arg("-vn")
            .arg(&dest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::Process(format!("cannot start {}: {}", self.bin, e)))?;

        if let Err(e) = classify_output(
            output.status.success(),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        ) {
            if let Err(rm) = remove_stale(&dest).await {
                warn!(error = %rm, "failed ffmpeg output not removed");
            }
            return Err(e);
        }

        info!(source = %source.display(), "ffmpeg decoded normally");
        Ok(dest)
    }
}
