//! HTTP client for the remote identification service.

use super::response::{map_response, IdentificationFault};
use super::IdentificationOutcome;
use crate::capture::IdentificationConfig;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";

/// Anything that turns image bytes into an outcome.
///
/// The session controller is generic over this so tests can count calls
/// without a network.
#[allow(async_fn_in_trait)]
pub trait Identify {
    /// Identifies the book on an encoded cover image. Never fails; faults
    /// come back as [`IdentificationOutcome::Failure`].
    async fn identify(&self, image: Vec<u8>) -> IdentificationOutcome;
}

/// Local rejection of an externally supplied image.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("image is empty")]
    Empty,

    #[error("image is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),
}

/// Errors from the auxiliary endpoints.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("service rejected the request: {0}")]
    Rejected(String),
}

/// Health report from the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    /// Overall success flag.
    #[serde(default)]
    pub success: bool,
    /// `healthy` or `unhealthy`.
    #[serde(default)]
    pub status: String,
    /// Catalogue database details, when reachable.
    #[serde(default)]
    pub database: Option<DatabaseHealth>,
    /// Error text when unhealthy.
    #[serde(default)]
    pub error: Option<String>,
}

impl ServiceHealth {
    /// Returns true if the service reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.success && self.status == "healthy"
    }
}

/// Database section of the health report.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseHealth {
    /// Whether the service reached its database.
    #[serde(default)]
    pub connected: bool,
    /// Number of catalogued books.
    #[serde(default)]
    pub book_count: u64,
}

#[derive(Debug, Serialize)]
struct IncorrectMatchReport<'a> {
    book_id: i64,
    user_feedback: &'a str,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the identification service.
///
/// No request timeout is set: an identification call runs until the
/// server answers or the connection fails.
#[derive(Debug, Clone)]
pub struct IdentificationClient {
    client: reqwest::Client,
    config: IdentificationConfig,
}

impl IdentificationClient {
    /// Creates a client for the configured service.
    pub fn new(config: IdentificationConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cover-scan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// The service configuration.
    pub fn config(&self) -> &IdentificationConfig {
        &self.config
    }

    /// One round trip to the identification endpoint.
    async fn submit(&self, image: Vec<u8>) -> Result<IdentificationOutcome, IdentificationFault> {
        let (file_name, mime) = describe_image(&image);
        let size = image.len();
        let part = Part::bytes(image)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| IdentificationFault::TransportFailure(e.to_string()))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let url = self.config.url(&self.config.identify_path);
        tracing::debug!(%url, bytes = size, mime, "Submitting image for identification");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IdentificationFault::TransportFailure(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| IdentificationFault::TransportFailure(e.to_string()))?;

        map_response(status, &body)
    }

    /// Submits an externally supplied image, bypassing the capture session.
    ///
    /// Images over the configured cap (10 MB by default) or empty ones are
    /// rejected locally without any network traffic.
    pub async fn submit_image(
        &self,
        image: Vec<u8>,
    ) -> Result<IdentificationOutcome, SubmissionError> {
        let limit = self.config.max_upload_bytes;
        if image.is_empty() {
            return Err(SubmissionError::Empty);
        }
        if image.len() > limit {
            return Err(SubmissionError::TooLarge {
                size: image.len(),
                limit,
            });
        }
        Ok(self.identify(image).await)
    }

    /// Reads an image file and submits it.
    pub async fn submit_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<IdentificationOutcome, SubmissionError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.config.max_upload_bytes as u64 {
            return Err(SubmissionError::TooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                limit: self.config.max_upload_bytes,
            });
        }
        let image = tokio::fs::read(path).await?;
        self.submit_image(image).await
    }

    /// Tells the service a match was wrong. Returns its acknowledgement.
    pub async fn report_incorrect_match(
        &self,
        book_id: i64,
        feedback: &str,
    ) -> Result<String, ClientError> {
        let url = self.config.url(&self.config.report_path);
        let response = self
            .client
            .post(&url)
            .json(&IncorrectMatchReport {
                book_id,
                user_feedback: feedback,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let ack: Option<AckResponse> = serde_json::from_str(&body).ok();

        match ack {
            Some(ack) if status.is_success() && ack.success => {
                tracing::info!(book_id, "Incorrect match reported");
                Ok(ack.message.unwrap_or_default())
            }
            Some(ack) if status.is_success() => Err(ClientError::Rejected(
                ack.message.unwrap_or_else(|| "report was not accepted".to_string()),
            )),
            ack => Err(ClientError::Status {
                status: status.as_u16(),
                message: ack.and_then(|a| a.message).unwrap_or(body),
            }),
        }
    }

    /// Fetches the service health report.
    ///
    /// An unhealthy service answers 503 with a report; that report is
    /// returned rather than treated as an error.
    pub async fn health(&self) -> Result<ServiceHealth, ClientError> {
        let url = self.config.url(&self.config.health_path);
        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|_| ClientError::Status {
            status,
            message: body,
        })
    }
}

impl Identify for IdentificationClient {
    async fn identify(&self, image: Vec<u8>) -> IdentificationOutcome {
        match self.submit(image).await {
            Ok(outcome) => {
                tracing::info!(kind = outcome.kind(), "Identification complete");
                outcome
            }
            Err(fault) => {
                tracing::warn!(error = %fault, "Identification failed");
                fault.into()
            }
        }
    }
}

/// File name and MIME type for the multipart part, sniffed from the bytes.
fn describe_image(image: &[u8]) -> (String, &'static str) {
    match image::guess_format(image) {
        Ok(format) => {
            let ext = format.extensions_str().first().copied().unwrap_or("img");
            (format!("cover.{ext}"), format.to_mime_type())
        }
        Err(_) => ("cover.bin".to_string(), "application/octet-stream"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const JPEG_MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    async fn identify_handler(
        State(hits): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        hits.fetch_add(1, Ordering::SeqCst);
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&body);
        if !content_type.starts_with("multipart/form-data")
            || !text.contains("name=\"image\"")
            || !text.contains("image/jpeg")
        {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": "bad upload"})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "ok",
                "book": {"id": 3, "title": "X", "similarity_score": 92.0, "url": ""}
            })),
        )
    }

    async fn report_handler(Json(body): Json<Value>) -> Json<Value> {
        if body["book_id"] == 3 && body["user_feedback"] == "wrong edition" {
            Json(json!({"success": true, "message": "thanks"}))
        } else {
            Json(json!({"success": false, "message": "unexpected report"}))
        }
    }

    async fn health_handler() -> (StatusCode, Json<Value>) {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"success": false, "status": "unhealthy", "error": "db down"})),
        )
    }

    async fn serve() -> (IdentificationClient, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/identify_book_file", post(identify_handler))
            .route("/api/report_incorrect_match", post(report_handler))
            .route("/api/health", get(health_handler))
            .with_state(Arc::clone(&hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = IdentificationConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        };
        (IdentificationClient::new(config).unwrap(), hits)
    }

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = JPEG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[tokio::test]
    async fn test_identify_round_trip() {
        let (client, hits) = serve().await;

        let outcome = client.identify(jpeg_bytes()).await;

        let IdentificationOutcome::Success(book) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(book.title, "X");
        assert_eq!(book.id, Some(3));
        assert!(book.url.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_failure_outcome() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = IdentificationClient::new(IdentificationConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        })
        .unwrap();

        let outcome = client.identify(jpeg_bytes()).await;
        assert!(matches!(outcome, IdentificationOutcome::Failure { ref message } if !message.is_empty()));
    }

    #[tokio::test]
    async fn test_oversized_submission_never_sent() {
        let (client, hits) = serve().await;
        let limit = client.config().max_upload_bytes;

        let result = client.submit_image(vec![0u8; limit + 1]).await;
        assert!(matches!(result, Err(SubmissionError::TooLarge { size, .. }) if size == limit + 1));

        let result = client.submit_image(Vec::new()).await;
        assert!(matches!(result, Err(SubmissionError::Empty)));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_small_submission_is_sent() {
        let (client, hits) = serve().await;
        let outcome = client.submit_image(jpeg_bytes()).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_report_incorrect_match() {
        let (client, _) = serve().await;
        let ack = client.report_incorrect_match(3, "wrong edition").await.unwrap();
        assert_eq!(ack, "thanks");

        let err = client.report_incorrect_match(4, "?").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "unexpected report"));
    }

    #[tokio::test]
    async fn test_unhealthy_report_is_returned() {
        let (client, _) = serve().await;
        let health = client.health().await.unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.error.as_deref(), Some("db down"));
    }

    #[test]
    fn test_describe_image() {
        assert_eq!(describe_image(&jpeg_bytes()), ("cover.jpg".to_string(), "image/jpeg"));
        assert_eq!(
            describe_image(b"plain"),
            ("cover.bin".to_string(), "application/octet-stream")
        );
    }
}
