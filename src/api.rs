use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::metrics;
use crate::processing::{PredictionPipeline, PredictionResponse};

const TEXT_FORMATS: [&str; 3] = ["FASTA (.fasta, .fa)", "Text (.txt)", "Sequence (.seq)"];

#[derive(Clone)]
pub struct ApiState {
    pipeline: Arc<PredictionPipeline>,
    model_source: String,
    supported_formats: Arc<Vec<String>>,
    max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(
        pipeline: PredictionPipeline,
        model_source: impl Into<String>,
        array_extensions: &[String],
        max_upload_bytes: usize,
    ) -> Self {
        let mut formats: Vec<String> = TEXT_FORMATS.iter().map(|f| f.to_string()).collect();
        formats.extend(
            array_extensions
                .iter()
                .map(|ext| format!("Preprocessed ({})", ext)),
        );
        Self {
            pipeline: Arc::new(pipeline),
            model_source: model_source.into(),
            supported_formats: Arc::new(formats),
            max_upload_bytes,
        }
    }
}

/// Error body `{"error": "..."}` with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        if e.is_client_error() {
            ApiError::bad_request(e.to_string())
        } else {
            ApiError::internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            metrics::REJECTED_REQUESTS_TOTAL.inc();
            warn!("Rejected request: {}", self.message);
        } else {
            error!("Prediction error: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    model_loaded: bool,
    backend_type: String,
    model_source: String,
    supported_formats: Vec<String>,
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let adapter = state.pipeline.adapter();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: adapter.is_model_loaded(),
        backend_type: adapter.backend_name().to_string(),
        model_source: state.model_source.clone(),
        supported_formats: state.supported_formats.as_ref().clone(),
    })
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::metrics_text(),
    )
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn predict(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Unreadable upload: {}", e.body_text());
        ApiError::bad_request("No file provided")
    })?;

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError {
                    status: e.status(),
                    message: e.body_text(),
                })
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError {
            status: e.status(),
            message: e.body_text(),
        })?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::bad_request("No file provided"));
    };
    if filename.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(ApiError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: format!("Upload exceeds {} bytes", state.max_upload_bytes),
        });
    }

    let pipeline = state.pipeline.clone();
    let span = info_span!("predict", request_id = %Uuid::new_v4());
    let response = tokio::task::spawn_blocking(move || span.in_scope(|| pipeline.run(&filename, &bytes)))
        .await
        .map_err(|e| ApiError::internal(format!("prediction task failed: {}", e)))??;

    Ok(Json(response))
}

async fn add_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn create_router(state: ApiState) -> Router {
    // Multipart framing adds a little on top of the file itself.
    let body_limit = state.max_upload_bytes.saturating_add(64 * 1024);
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/predict", axum::routing::post(predict).options(preflight))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::map_response(add_cors_headers))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ApiState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

pub async fn serve_with_listener(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let app = create_router(state);
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
