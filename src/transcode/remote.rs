//! Fallback conversion through a remote service (aconvert-style API).
//!
//! Upload: multipart POST to `<base>/convert/convert-batch.php` with the file
//! and `targetformat=mp3`. The service answers with a JSON status and the name
//! of the converted file, which is then downloaded from
//! `<base>/convert/p3r68-cdx67/<filename>`. The response also names the
//! conversion node (`"server": "4"`); for the `sN.<domain>` hosts the service
//! uses, the download goes to that node.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{output_path, remove_stale, Transcoder};
use crate::errors::TranscodeError;

const CONVERT_PATH: &str = "/convert/convert-batch.php";
const RESULT_PATH: &str = "/convert/p3r68-cdx67/";

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    state: String,
    #[serde(default)]
    filename: String,
    /// String or number depending on the node.
    #[serde(default)]
    server: Option<serde_json::Value>,
}

impl ConvertResponse {
    fn server(&self) -> Option<String> {
        match self.server.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Base URL for downloading a result converted on `server`.
///
/// Only hosts shaped like `s<digits>.<domain>` are rewritten; anything else
/// (a proxy, a test server) is used as configured.
fn result_base(base_url: &str, server: Option<&str>) -> String {
    let Some(server) = server.filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
    else {
        return base_url.to_string();
    };
    let Ok(mut url) = url::Url::parse(base_url) else {
        return base_url.to_string();
    };
    let Some((node, domain)) = url.host_str().and_then(|h| h.split_once('.')) else {
        return base_url.to_string();
    };
    let is_node = node.len() > 1
        && node.starts_with('s')
        && node[1..].chars().all(|c| c.is_ascii_digit());
    if !is_node {
        return base_url.to_string();
    }

    let host = format!("s{}.{}", server, domain);
    if url.set_host(Some(&host)).is_err() {
        return base_url.to_string();
    }
    url.as_str().trim_end_matches('/').to_string()
}

pub struct RemoteTranscoder {
    base_url: String,
    /// Built on first use and shared by every run afterwards.
    client: OnceCell<reqwest::Client>,
}

impl RemoteTranscoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new())
        })
    }

    /// Uploads `source` and returns the result name and the node that holds it.
    async fn upload(&self, source: &Path) -> Result<(String, Option<String>), TranscodeError> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| TranscodeError::Upload(format!("cannot open {}: {}", source.display(), e)))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| TranscodeError::Upload(format!("cannot stat {}: {}", source.display(), e)))?
            .len();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());

        let part = Part::stream_with_length(Body::from(file), len).file_name(file_name);
        let form = Form::new()
            .part("file", part)
            .text("targetformat", "mp3")
            .text("filelocation", "local")
            .text("code", "81000");

        let resp = self
            .client()
            .post(format!("{}{}", self.base_url, CONVERT_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscodeError::Upload(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscodeError::Conversion(format!(
                "status={}, body={}",
                status, body
            )));
        }

        let parsed: ConvertResponse = resp
            .json()
            .await
            .map_err(|e| TranscodeError::Conversion(format!("unreadable response: {}", e)))?;

        if parsed.state != "SUCCESS" {
            return Err(TranscodeError::Conversion(format!("state {:?}", parsed.state)));
        }
        if parsed.filename.is_empty()
            || parsed.filename.contains('/')
            || parsed.filename.contains('\\')
            || parsed.filename.contains("..")
        {
            return Err(TranscodeError::Conversion(format!(
                "bad result name {:?}",
                parsed.filename
            )));
        }
        let server = parsed.server();
        Ok((parsed.filename, server))
    }

    async fn download(
        &self,
        filename: &str,
        server: Option<&str>,
        dest: &Path,
    ) -> Result<(), TranscodeError> {
        let url = format!(
            "{}{}{}",
            result_base(&self.base_url, server),
            RESULT_PATH,
            filename
        );
        let resp = self
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| TranscodeError::Download(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TranscodeError::Download(format!("status={} for {}", resp.status(), url)));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| TranscodeError::Download(format!("cannot create {}: {}", dest.display(), e)))?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| TranscodeError::Download(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TranscodeError::Download(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| TranscodeError::Download(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Transcoder for RemoteTranscoder {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn transcode(&self, source: &Path, stem: &str) -> Result<PathBuf, TranscodeError> {
        let dest = output_path(source, stem);
        remove_stale(&dest).await?;

        info!(source = %source.display(), "start remote decoding");
        let (filename, server) = self.upload(source).await?;

        if let Err(e) = self.download(&filename, server.as_deref(), &dest).await {
            if let Err(rm) = remove_stale(&dest).await {
                warn!(error = %rm, "partial remote output not removed");
            }
            return Err(e);
        }

        info!(source = %source.display(), "remote decoded normally");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_in(dir: &Path) -> PathBuf {
        let p = dir.join("clip-1.src.webm");
        std::fs::write(&p, b"fake video").unwrap();
        p
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CONVERT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "filename": "abc.mp3", "ext": "mp3", "server": "4", "state": "SUCCESS"
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/convert/p3r68-cdx67/abc.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3mp3data".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = source_in(dir.path());
        let transcoder = RemoteTranscoder::new(format!("{}/", server.uri()));

        let out = transcoder.transcode(&source, "clip-1").await.unwrap();
        assert_eq!(out, dir.path().join("clip-1.mp3"));
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3mp3data");

        // second call reuses the lazily built client
        let again = transcoder.transcode(&source, "clip-1").await.unwrap();
        assert_eq!(again, out);
    }

    #[test]
    fn test_result_base_follows_conversion_node() {
        assert_eq!(
            result_base("https://s4.aconvert.com", Some("7")),
            "https://s7.aconvert.com"
        );
        assert_eq!(
            result_base("https://s4.aconvert.com", None),
            "https://s4.aconvert.com"
        );
        // not a node host: keep as configured
        assert_eq!(
            result_base("http://127.0.0.1:8080", Some("7")),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            result_base("https://convert.example.com/api", Some("7")),
            "https://convert.example.com/api"
        );
        // junk in the field never reaches the host
        assert_eq!(
            result_base("https://s4.aconvert.com", Some("7.evil.com/")),
            "https://s4.aconvert.com"
        );
    }

    #[test]
    fn test_server_field_string_or_number() {
        let r: ConvertResponse =
            serde_json::from_str(r#"{"state":"SUCCESS","filename":"a.mp3","server":"4"}"#).unwrap();
        assert_eq!(r.server().as_deref(), Some("4"));
        let r: ConvertResponse =
            serde_json::from_str(r#"{"state":"SUCCESS","filename":"a.mp3","server":9}"#).unwrap();
        assert_eq!(r.server().as_deref(), Some("9"));
        let r: ConvertResponse = serde_json::from_str(r#"{"state":"SUCCESS"}"#).unwrap();
        assert_eq!(r.server(), None);
    }

    #[tokio::test]
    async fn test_upload_streams_whole_file() {
        let server = MockServer::start().await;
        let body = vec![7u8; 256 * 1024];
        Mock::given(method("POST"))
            .and(path(CONVERT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "filename": "big.mp3", "server": 4, "state": "SUCCESS"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/convert/p3r68-cdx67/big.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.src.webm");
        std::fs::write(&source, &body).unwrap();

        RemoteTranscoder::new(server.uri())
            .transcode(&source, "big")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.url.path() == CONVERT_PATH)
            .unwrap();
        assert!(upload.body.len() > body.len());
        assert!(upload
            .body
            .windows(body.len())
            .any(|w| w == body.as_slice()));
    }

    #[tokio::test]
    async fn test_failed_state_is_conversion_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "ERROR"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = RemoteTranscoder::new(server.uri())
            .transcode(&source_in(dir.path()), "clip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Conversion(_)));
    }

    #[tokio::test]
    async fn test_traversal_in_result_name_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"state": "SUCCESS", "filename": "../x.mp3"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = RemoteTranscoder::new(server.uri())
            .transcode(&source_in(dir.path()), "clip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Conversion(_)));
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"state": "SUCCESS", "filename": "gone.mp3"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = RemoteTranscoder::new(server.uri())
            .transcode(&source_in(dir.path()), "clip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Download(_)));
        assert!(!dir.path().join("clip-1.mp3").exists());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RemoteTranscoder::new("http://127.0.0.1:1")
            .transcode(&source_in(dir.path()), "clip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Upload(_)));
    }
}
