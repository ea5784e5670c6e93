use std::time::Duration;

/// One downloadable variant of a video.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub format_id: String,
    pub extension: String,
    /// Audio bitrate in kbit/s; 0 when the variant has no audio.
    pub audio_bitrate: f64,
}

/// What the resolver knows about a URL. Consumed right away by the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    pub url: String,
    pub title: String,
    pub duration: Duration,
    pub encodings: Vec<Encoding>,
}

impl MediaDescriptor {
    /// Highest audio bitrate wins; variants without audio never qualify.
    pub fn best_audio(&self) -> Option<&Encoding> {
        self.encodings
            .iter()
            .filter(|e| e.audio_bitrate > 0.0)
            .max_by(|a, b| a.audio_bitrate.total_cmp(&b.audio_bitrate))
    }
}
