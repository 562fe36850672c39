//! HTTP surface for batch analysis.
//!
//! Exposes the same pipeline as `insights analyze` over a JSON API so a web
//! front end can upload transcripts and render the returned report.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/analyze` | Run one batch and return the [`BatchReport`] |
//!
//! # Request
//!
//! ```json
//! {
//!   "keywords": "budget, timeline",
//!   "regex": false,
//!   "documents": [
//!     { "filename": "call.txt", "content_type": "text/plain", "data_base64": "..." }
//!   ]
//! }
//! ```
//!
//! The completion API key travels in `Authorization: Bearer <key>` and is
//! used for this request only.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Failed to parse the request body as JSON: ..." } }
//! ```
//!
//! Per-document problems (oversized, unsupported, invalid base64) are not HTTP
//! errors; they are reported inside the batch report.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::batch::{BatchProcessor, BatchSettings};
use crate::config::Config;
use crate::keyword::{parse_keywords, MatchMode};
use crate::models::{BatchReport, Upload, UploadedFile};
use crate::progress::TracingProgress;
use crate::provider::{create_provider, ApiKey, CompletionProvider};
use crate::synthesize::CancelSignal;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn CompletionProvider>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        provider: create_provider(&config.completion)?,
    };

    let app = router(state);

    info!(bind = %bind_addr, "insights server listening");
    println!("insights server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_request_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "bad_request"
        };
        AppError {
            status,
            code: code.to_string(),
            message: rejection.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    /// Comma-delimited keyword string, as typed by the user.
    #[serde(default)]
    keywords: String,
    /// Overrides `keywords.regex` from config when present.
    #[serde(default)]
    regex: Option<bool>,
    /// Set to `false` to skip insight synthesis.
    #[serde(default)]
    insights: Option<bool>,
    #[serde(default)]
    documents: Vec<UploadRequest>,
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    filename: String,
    content_type: String,
    data_base64: String,
}

/// Handler for `POST /analyze`.
///
/// Runs one batch with the caller's credential. If the client disconnects,
/// the request future is dropped and any in-flight completion calls with it.
async fn handle_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<BatchReport>, AppError> {
    let Json(request) = payload?;
    let credential = bearer_token(&headers);
    let uploads = decode_uploads(request.documents);
    let keywords = parse_keywords(&request.keywords);

    let mut settings = BatchSettings::from(state.config.as_ref());
    if let Some(regex) = request.regex {
        settings.match_mode = if regex {
            MatchMode::Regex
        } else {
            MatchMode::Literal
        };
    }
    settings.insights = request.insights.unwrap_or(true) && state.config.completion.is_enabled();

    info!(
        documents = uploads.len(),
        keywords = keywords.len(),
        insights = settings.insights,
        "analyze request"
    );

    let processor = BatchProcessor::new(settings, state.provider.clone(), Arc::new(TracingProgress));
    let report = processor
        .process(uploads, &keywords, &credential, &CancelSignal::never())
        .await;

    Ok(Json(report))
}

/// Credential from `Authorization: Bearer <key>`; empty when absent.
fn bearer_token(headers: &HeaderMap) -> ApiKey {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(|token| ApiKey::new(token.trim()))
        .unwrap_or_default()
}

/// Decode each document; a bad payload fails that document alone.
fn decode_uploads(documents: Vec<UploadRequest>) -> Vec<Upload> {
    documents
        .into_iter()
        .map(|doc| {
            let data = doc.data_base64.trim();
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) => Upload::Received(UploadedFile {
                    filename: doc.filename,
                    content_type: doc.content_type,
                    bytes,
                }),
                Err(e) => Upload::Unreadable {
                    filename: doc.filename,
                    content_type: doc.content_type,
                    size_bytes: data.len() / 4 * 3,
                    cause: format!("invalid base64 data ({})", e),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::synthesize::PROMPT_PREFIX;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use tower::ServiceExt;

    /// Answers "noted: <chunk>" and insists on the caller's credential.
    struct NotingProvider;

    #[async_trait]
    impl CompletionProvider for NotingProvider {
        fn name(&self) -> &str {
            "noting"
        }

        async fn complete(
            &self,
            prompt: &str,
            _max_tokens: u32,
            credential: &ApiKey,
        ) -> Result<String, ProviderError> {
            if credential.expose() != "sk-test" {
                return Err(ProviderError::new("bad credential"));
            }
            Ok(format!("noted: {}", prompt.trim_start_matches(PROMPT_PREFIX)))
        }
    }

    fn test_app() -> Router {
        router(AppState {
            config: Arc::new(Config::default()),
            provider: Arc::new(NotingProvider),
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn analyze_returns_report_and_isolates_bad_base64() {
        let good = base64::engine::general_purpose::STANDARD
            .encode("Budget talk. The budget is tight.");
        let payload = serde_json::json!({
            "keywords": "budget, hiring",
            "documents": [
                { "filename": "good.txt", "content_type": "text/plain", "data_base64": good },
                { "filename": "bad.txt", "content_type": "text/plain", "data_base64": "!!" }
            ]
        });
        let request = Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer sk-test")
            .body(Body::from(payload.to_string()))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;

        let good = &report["documents"]["good.txt"];
        assert!(good["error"].is_null());
        assert_eq!(good["keywords"][0]["keyword"], "budget");
        assert_eq!(good["keywords"][0]["count"], 2);
        assert_eq!(good["keywords"][1]["count"], 0);
        assert_eq!(
            good["insights"]["text"],
            "noted: Budget talk. The budget is tight."
        );
        assert_eq!(good["insights"]["chunks_succeeded"], 1);

        let bad = &report["documents"]["bad.txt"];
        assert!(bad["text"].is_null());
        assert_eq!(bad["error"]["kind"], "extraction_failure");
        assert_eq!(bad["error"]["filename"], "bad.txt");
        assert!(report["rejections"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_uses_error_shape() {
        let request = Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_empty());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-abc "));
        assert_eq!(bearer_token(&headers).expose(), "sk-abc");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_empty());
    }

    #[test]
    fn bad_base64_fails_only_its_document() {
        let uploads = decode_uploads(vec![
            UploadRequest {
                filename: "call.txt".to_string(),
                content_type: "text/plain".to_string(),
                data_base64: "aGVsbG8=".to_string(),
            },
            UploadRequest {
                filename: "broken.txt".to_string(),
                content_type: "text/plain".to_string(),
                data_base64: "not base64!!".to_string(),
            },
        ]);
        assert_eq!(uploads.len(), 2);
        match &uploads[0] {
            Upload::Received(file) => assert_eq!(file.bytes, b"hello"),
            other => panic!("unexpected upload {:?}", other),
        }
        match &uploads[1] {
            Upload::Unreadable {
                filename, cause, ..
            } => {
                assert_eq!(filename, "broken.txt");
                assert!(cause.starts_with("invalid base64 data"));
            }
            other => panic!("unexpected upload {:?}", other),
        }
    }

    #[test]
    fn request_fields_default() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"documents": []}"#).unwrap();
        assert!(req.keywords.is_empty());
        assert!(req.regex.is_none());
        assert!(req.documents.is_empty());
    }
}
