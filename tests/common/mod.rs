//! In-memory fakes for the transport, resolver, transcoders and config store.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ytaudio::approval::store::ConfigStore;
use ytaudio::approval::AuthorizationGate;
use ytaudio::config::AppConfig;
use ytaudio::errors::{DownloadError, PersistenceError, ResolveError, TranscodeError, TransportError};
use ytaudio::media::{source_path, MediaResolver};
use ytaudio::models::approval::DecisionToken;
use ytaudio::models::media::{Encoding, MediaDescriptor};
use ytaudio::models::message::{DecisionCallback, InboundMessage};
use ytaudio::notification::admin::AdminNotifier;
use ytaudio::notification::retry::RetryPolicy;
use ytaudio::pipeline::RequestPipeline;
use ytaudio::server::Dispatcher;
use ytaudio::transcode::{output_path, Transcoder};
use ytaudio::transport::ChatTransport;

pub const ADMIN: i64 = 1;
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

// ── Transport ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
    },
    Forward {
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    },
    Prompt {
        admin_id: i64,
        text: String,
        approve: String,
        deny: String,
    },
    Audio {
        chat_id: i64,
        file_name: String,
        reply_to: i32,
        existed: bool,
    },
    Answer {
        callback_id: String,
        text: String,
    },
}

#[derive(Default)]
pub struct FakeTransport {
    log: Mutex<Vec<Sent>>,
    /// Number of upcoming `send_audio` calls that fail.
    failing_audio: AtomicUsize,
    failing_prompts: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_audio(&self, n: usize) {
        self.failing_audio.store(n, Ordering::SeqCst);
    }

    pub fn fail_prompts(&self) {
        self.failing_prompts.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Prompt { .. }))
            .collect()
    }

    pub fn forwards(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Forward { .. }))
            .count()
    }

    pub fn audio(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Audio { .. }))
            .collect()
    }

    pub fn texts_to(&self, chat: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id, text } if chat_id == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Answer { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, s: Sent) {
        self.log.lock().unwrap().push(s);
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<(), TransportError> {
        self.push(Sent::Forward {
            to_chat,
            from_chat,
            message_id,
        });
        Ok(())
    }

    async fn send_decision_prompt(
        &self,
        admin_id: i64,
        text: &str,
        approve: DecisionToken,
        deny: DecisionToken,
    ) -> Result<(), TransportError> {
        if self.failing_prompts.load(Ordering::SeqCst) {
            return Err(TransportError::Request("chat not found".into()));
        }
        self.push(Sent::Prompt {
            admin_id,
            text: text.to_string(),
            approve: approve.to_string(),
            deny: deny.to_string(),
        });
        Ok(())
    }

    async fn send_audio(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        reply_to: i32,
    ) -> Result<(), TransportError> {
        self.push(Sent::Audio {
            chat_id,
            file_name: file_name.to_string(),
            reply_to,
            existed: path.exists(),
        });
        let failing = self.failing_audio.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_audio.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Request("Bad Request: file rejected".into()));
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        self.push(Sent::Answer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

// ── Resolver ─────────────────────────────────────────────────

pub struct FakeResolver {
    pub duration: Duration,
    pub descriptor: MediaDescriptor,
    pub fail_fetch: bool,
    pub duration_lookups: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeResolver {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            descriptor: MediaDescriptor {
                url: VIDEO_URL.to_string(),
                title: "Never Gonna Give You Up".to_string(),
                duration,
                encodings: vec![
                    Encoding {
                        format_id: "137".into(),
                        extension: "mp4".into(),
                        audio_bitrate: 0.0,
                    },
                    Encoding {
                        format_id: "251".into(),
                        extension: "webm".into(),
                        audio_bitrate: 160.0,
                    },
                ],
            },
            fail_fetch: false,
            duration_lookups: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn video_only(mut self) -> Self {
        for e in &mut self.descriptor.encodings {
            e.audio_bitrate = 0.0;
        }
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.duration_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn lookup_duration(&self, _url: &str) -> Result<Duration, ResolveError> {
        self.duration_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.duration)
    }

    async fn resolve(&self, _url: &str) -> Result<MediaDescriptor, ResolveError> {
        Ok(self.descriptor.clone())
    }

    async fn fetch(
        &self,
        _descriptor: &MediaDescriptor,
        encoding: &Encoding,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let dest = source_path(dest_dir, stem, &encoding.extension);
        // a partial file is left behind on failure, like an interrupted download
        tokio::fs::write(&dest, b"video bytes").await?;
        if self.fail_fetch {
            return Err(DownloadError::Process("HTTP Error 403: Forbidden".into()));
        }
        Ok(dest)
    }
}

// ── Transcoders ──────────────────────────────────────────────

pub struct FakeTranscoder {
    name: &'static str,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn transcode(&self, source: &Path, stem: &str) -> Result<PathBuf, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(source.exists(), "source must exist while transcoding");
        let dest = output_path(source, stem);
        tokio::fs::write(&dest, b"mp3 bytes")
            .await
            .map_err(|e| TranscodeError::Process(e.to_string()))?;
        if self.fail {
            return Err(TranscodeError::NonEmptyDiagnostic("Unsupported codec".into()));
        }
        Ok(dest)
    }
}

// ── Config stores ────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<AppConfig>>,
}

impl MemoryStore {
    pub fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl ConfigStore for MemoryStore {
    fn save(&self, cfg: &AppConfig) -> Result<(), PersistenceError> {
        self.saved.lock().unwrap().push(cfg.clone());
        Ok(())
    }
}

pub struct FailingStore;

impl ConfigStore for FailingStore {
    fn save(&self, _cfg: &AppConfig) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "No space left on device",
        )))
    }
}

// ── Builders ─────────────────────────────────────────────────

pub fn config(admin_id: i64) -> AppConfig {
    AppConfig {
        bot_api_key: "123:test".into(),
        admin_id,
        authorized_ids: vec![],
        banned_ids: vec![],
        max_video_duration_minutes: 60,
    }
}

pub fn message(chat_id: i64, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id,
        message_id: 42,
        chat_title: None,
        sender_username: Some("rick".into()),
        text: text.to_string(),
    }
}

pub fn callback(from_user_id: i64, data: &str) -> DecisionCallback {
    DecisionCallback {
        callback_id: format!("cb-{}", data),
        from_user_id,
        data: data.to_string(),
    }
}

pub fn gate(
    cfg: AppConfig,
    store: Arc<dyn ConfigStore>,
    transport: Arc<FakeTransport>,
) -> AuthorizationGate {
    let transport: Arc<dyn ChatTransport> = transport;
    AuthorizationGate::new(
        cfg,
        Some(Duration::from_secs(3600)),
        store,
        transport.clone(),
        AdminNotifier::new(transport, RetryPolicy::none()),
    )
}

pub fn pipeline(
    transport: Arc<FakeTransport>,
    resolver: Arc<FakeResolver>,
    primary: Arc<FakeTranscoder>,
    fallback: Arc<FakeTranscoder>,
    work_dir: &Path,
) -> RequestPipeline {
    RequestPipeline::new(transport, resolver, primary, fallback, work_dir)
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub resolver: Arc<FakeResolver>,
    pub primary: Arc<FakeTranscoder>,
    pub fallback: Arc<FakeTranscoder>,
    pub dispatcher: Dispatcher,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(cfg: AppConfig, store: Arc<dyn ConfigStore>) -> Self {
        let transport = FakeTransport::new();
        let resolver = Arc::new(FakeResolver::new(Duration::from_secs(212)));
        let primary = FakeTranscoder::ok("primary");
        let fallback = FakeTranscoder::ok("fallback");
        let work_dir = tempfile::tempdir().unwrap();

        let gate = gate(cfg, store, transport.clone());
        let pipeline = pipeline(
            transport.clone(),
            resolver.clone(),
            primary.clone(),
            fallback.clone(),
            work_dir.path(),
        );
        Self {
            transport,
            resolver,
            primary,
            fallback,
            dispatcher: Dispatcher::new(gate, Arc::new(pipeline)),
            work_dir,
        }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        self.dispatcher.gate()
    }
}

/// Files left in `dir`.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
