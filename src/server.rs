//! HTTP surface for the triage pipeline.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, Multipart, Request, State, multipart::MultipartError,
    },
    http::{
        StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::{ClassifierError, ExtractionError, PipelineError, ValidationError};
use crate::extract::{EmailFile, MAX_FILE_BYTES};
use crate::pipeline::{EmailInput, TriagePipeline, Verdict};
use crate::worker::WorkerPool;

/// Room for multipart framing on top of the largest accepted file.
const BODY_HEADROOM: usize = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TriagePipeline>,
}

/// JSON request body. A missing `text` is treated as empty.
#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    #[serde(default)]
    text: Option<String>,
}

/// Build the router with the classification and health routes.
pub fn triage_routes(pipeline: Arc<TriagePipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/classificar", post(classify))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_FILE_BYTES + BODY_HEADROOM)),
        )
        .with_state(state)
}

/// Run the service until `shutdown` resolves, then close the worker pool.
pub async fn serve<S>(config: &ServiceConfig, shutdown: S) -> crate::error::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let pool = Arc::new(WorkerPool::new(config.workers));
    let pipeline = Arc::new(TriagePipeline::from_config(config, Arc::clone(&pool))?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Email triage listening");

    axum::serve(listener, triage_routes(pipeline))
        .with_graceful_shutdown(shutdown)
        .await?;

    pool.shutdown();
    info!("Worker pool closed");
    Ok(())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "email-triage"
    }))
}

// ── Classification ──────────────────────────────────────────────────────

async fn classify(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Verdict>, PipelineError> {
    let input = read_input(request).await?;
    let verdict = state.pipeline.run(input).await?;
    Ok(Json(verdict))
}

/// Pull the email out of a multipart upload or a JSON body.
///
/// A `file` part wins. Any other body shape yields empty text, which the
/// pipeline rejects.
async fn read_input(request: Request) -> Result<EmailInput, PipelineError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let declared_len = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, declared_len))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, declared_len))?;
            debug!(%filename, bytes = data.len(), "Received file upload");
            return Ok(EmailInput::File(EmailFile::new(filename, data.to_vec())));
        }
        return Ok(EmailInput::Text(String::new()));
    }

    if content_type.starts_with("application/json") {
        let Json(body) = Json::<ClassifyRequest>::from_request(request, &())
            .await
            .map_err(|e| ValidationError::Malformed(e.body_text()))?;
        return Ok(EmailInput::Text(body.text.unwrap_or_default()));
    }

    Ok(EmailInput::Text(String::new()))
}

/// A body cut off by the request size limit is an oversized file.
fn multipart_error(e: MultipartError, declared_len: Option<usize>) -> PipelineError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        debug!(?declared_len, "Upload exceeded body limit");
        return ExtractionError::TooLarge {
            size: declared_len.unwrap_or(MAX_FILE_BYTES + BODY_HEADROOM + 1),
            max: MAX_FILE_BYTES,
        }
        .into();
    }
    ValidationError::Malformed(e.body_text()).into()
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_time: Option<f64>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let mut body = ErrorBody {
            error: self.to_string(),
            details: None,
            retryable: None,
            estimated_time: None,
        };

        let status = match self {
            PipelineError::Extraction(_) | PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Classifier(ClassifierError::ModelLoading { estimated_time }) => {
                body.retryable = Some(true);
                body.estimated_time = estimated_time;
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Classifier(ClassifierError::Timeout { .. }) => {
                body.retryable = Some(true);
                StatusCode::GATEWAY_TIMEOUT
            }
            PipelineError::Classifier(ClassifierError::RequestFailed { details, .. }) => {
                body.details = details;
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Classifier(ClassifierError::InvalidResponse { .. })
            | PipelineError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(body)).into_response()
    }
}
