// src/upload/client.rs
// Multipart upload to the detection backend

use super::{AnalysisType, SubmittedAnalysis, UploadError};
use crate::config::ClientConfig;
use reqwest::multipart;
use reqwest::Url;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

const UPLOAD_PATH: &str = "api/analysis/upload";
const SESSION_ID_FIELDS: [&str; 5] = ["session_id", "sessionId", "job_id", "jobId", "id"];

pub struct AnalysisClient {
    upload_url: Url,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl AnalysisClient {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| UploadError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(UploadError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let upload_url = base
            .join(UPLOAD_PATH)
            .map_err(|e| UploadError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        tracing::info!("Analysis client initialized: {}", upload_url);

        Ok(Self {
            upload_url,
            api_token,
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, UploadError> {
        Self::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout(),
        )
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    /// Read `path` and submit it for analysis
    pub async fn submit_file(
        &self,
        path: &Path,
        analysis_type: AnalysisType,
    ) -> Result<SubmittedAnalysis, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::FileError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        self.submit_bytes(&file_name, bytes, analysis_type).await
    }

    pub async fn submit_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        analysis_type: AnalysisType,
    ) -> Result<SubmittedAnalysis, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::FileError {
                path: file_name.to_string(),
                reason: "file is empty".to_string(),
            });
        }

        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            "Uploading {} ({} bytes) for {} analysis [request {}]",
            file_name,
            bytes.len(),
            analysis_type,
            request_id
        );

        let file_part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        let form = multipart::Form::new()
            .text("analysis_type", analysis_type.as_str())
            .part("file", file_part);

        let mut request = self
            .client
            .post(self.upload_url.clone())
            .header("X-Request-Id", request_id.as_str())
            .multipart(form);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Err(UploadError::TimeoutError),
            Err(e) => return Err(UploadError::NetworkError(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => UploadError::AuthenticationError,
                413 => UploadError::PayloadTooLarge,
                429 => UploadError::RateLimitError,
                code => {
                    let body = response.text().await.unwrap_or_default();
                    UploadError::ServerError { status: code, body }
                }
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        let session_id = session_id_from(&body).ok_or_else(|| {
            UploadError::InvalidResponse("response carries no session id".to_string())
        })?;

        tracing::info!("Upload accepted: session {}", session_id);

        Ok(SubmittedAnalysis {
            session_id,
            analysis_type,
            file_name: file_name.to_string(),
        })
    }
}

fn session_id_from(body: &Value) -> Option<String> {
    let object = body.as_object()?;
    SESSION_ID_FIELDS.iter().find_map(|key| match object.get(*key)? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    struct Received {
        auth: Option<String>,
        request_id: Option<String>,
        file_name: Option<String>,
        content_type: Option<String>,
        file_len: usize,
        fields: Vec<(String, String)>,
    }

    type Seen = Arc<Mutex<Option<Received>>>;

    async fn record_upload(
        State(seen): State<Seen>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let mut received = Received {
            auth: header("authorization"),
            request_id: header("x-request-id"),
            ..Received::default()
        };

        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                received.file_name = field.file_name().map(str::to_string);
                received.content_type = field.content_type().map(str::to_string);
                received.file_len = field.bytes().await.unwrap().len();
            } else {
                received.fields.push((name, field.text().await.unwrap()));
            }
        }

        *seen.lock().unwrap() = Some(received);
        Json(json!({ "sessionId": "sess-123", "status": "pending" }))
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str, token: Option<&str>) -> AnalysisClient {
        AnalysisClient::new(base, token.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_upload_url_join() {
        let plain = client("http://localhost:8000", None);
        assert_eq!(
            plain.upload_url().as_str(),
            "http://localhost:8000/api/analysis/upload"
        );

        let prefixed = client("https://example.com/v2", None);
        assert_eq!(
            prefixed.upload_url().as_str(),
            "https://example.com/v2/api/analysis/upload"
        );
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(matches!(
            AnalysisClient::new("ws://localhost", None, Duration::from_secs(1)),
            Err(UploadError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_session_id_fields() {
        assert_eq!(session_id_from(&json!({"session_id": "a"})), Some("a".into()));
        assert_eq!(session_id_from(&json!({"jobId": " b "})), Some("b".into()));
        assert_eq!(session_id_from(&json!({"id": 42})), Some("42".into()));
        assert_eq!(session_id_from(&json!({"sessionId": "", "id": "c"})), Some("c".into()));
        assert_eq!(session_id_from(&json!({"status": "pending"})), None);
        assert_eq!(session_id_from(&json!("sess")), None);
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("clip.MP4"), "video/mp4");
        assert_eq!(mime_for("voice.wav"), "audio/wav");
        assert_eq!(mime_for("passport.pdf"), "application/pdf");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_submit_file() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/api/analysis/upload", post(record_upload))
            .with_state(seen.clone());
        let base = serve(app).await;

        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&[1u8; 64]).unwrap();

        let submitted = client(&base, Some("secret-token"))
            .submit_file(file.path(), AnalysisType::Voice)
            .await
            .unwrap();

        assert_eq!(submitted.session_id, "sess-123");
        assert_eq!(submitted.analysis_type, AnalysisType::Voice);

        let received = seen.lock().unwrap().clone().unwrap();
        assert_eq!(received.auth.as_deref(), Some("Bearer secret-token"));
        assert!(received.request_id.is_some());
        assert_eq!(received.file_len, 64);
        assert_eq!(received.content_type.as_deref(), Some("audio/wav"));
        assert_eq!(received.file_name.as_deref(), Some(submitted.file_name.as_str()));
        assert_eq!(
            received.fields,
            vec![("analysis_type".to_string(), "voice".to_string())]
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let app = Router::new()
            .route("/a/api/analysis/upload", post(|| async { StatusCode::UNAUTHORIZED }))
            .route("/b/api/analysis/upload", post(|| async { StatusCode::PAYLOAD_TOO_LARGE }))
            .route("/c/api/analysis/upload", post(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .route(
                "/d/api/analysis/upload",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
            )
            .route(
                "/e/api/analysis/upload",
                post(|| async { Json(json!({ "status": "pending" })) }),
            );
        let base = serve(app).await;

        let submit = |prefix: &'static str| {
            let base = base.clone();
            async move {
                client(&format!("{}/{}", base, prefix), None)
                    .submit_bytes("clip.mp4", vec![0u8; 8], AnalysisType::Video)
                    .await
                    .unwrap_err()
            }
        };

        assert!(matches!(submit("a").await, UploadError::AuthenticationError));
        assert!(matches!(submit("b").await, UploadError::PayloadTooLarge));
        assert!(matches!(submit("c").await, UploadError::RateLimitError));
        match submit("d").await {
            UploadError::ServerError { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(submit("e").await, UploadError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_empty_and_missing_files() {
        let api = client("http://127.0.0.1:9", None);

        assert!(matches!(
            api.submit_bytes("empty.wav", Vec::new(), AnalysisType::Voice).await,
            Err(UploadError::FileError { .. })
        ));
        assert!(matches!(
            api.submit_file(Path::new("/nonexistent/clip.mp4"), AnalysisType::Video)
                .await,
            Err(UploadError::FileError { .. })
        ));
    }
}
