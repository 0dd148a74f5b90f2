//! HTTP server module.
//!
//! Exposes the recommendation pipeline over HTTP:
//!
//! | Route              | Purpose                                         |
//! |--------------------|-------------------------------------------------|
//! | `GET /`            | landing page                                    |
//! | `GET /papers`      | run the pipeline, return the ranked papers      |
//! | `POST /save_paper` | add a paper to the liked set by id              |
//!
//! Every request runs against a shared, stateless pipeline; no model is kept
//! between requests.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::models::{Paper, RankedPaper};
use crate::pipeline::{PipelineError, RecommendationPipeline, RecommendationStatus};
use crate::provider::{FetchCompleteness, PaperProvider};
use crate::storage::LikedPaperStore;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const SCRIPT_JS: &str = include_str!("../../static/script.js");

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or unusable request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested paper does not exist upstream
    #[error("Paper not found")]
    NotFound,

    /// The search or embedding service failed
    #[error("Upstream service failed: {0}")]
    Upstream(String),

    /// Server initialization error
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Embedding(_) | PipelineError::Provider(_) => {
                ServerError::Upstream(err.to_string())
            }
            PipelineError::InvalidInput(message) => ServerError::InvalidRequest(message),
            PipelineError::Storage(_) | PipelineError::Training(_) | PipelineError::Ranking(_) => {
                ServerError::Internal(err.to_string())
            }
        }
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::InitializationError(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                success: false,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

/// Request payload for `POST /save_paper`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePaperRequest {
    /// Bare arXiv id or abs/pdf URL
    pub paper_id: String,
}

/// Response payload for a successful `POST /save_paper`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePaperResponse {
    pub success: bool,
    pub paper: Paper,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

type SharedPipeline<P, E, S> = Arc<RecommendationPipeline<P, E, S>>;

/// Build the application router around a shared pipeline.
pub fn router<P, E, S>(pipeline: SharedPipeline<P, E, S>) -> Router
where
    P: PaperProvider + 'static,
    E: EmbeddingProvider + 'static,
    S: LikedPaperStore + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/static/script.js", get(script))
        .route("/papers", get(get_papers::<P, E, S>))
        .route("/save_paper", post(save_paper::<P, E, S>))
        .with_state(pipeline)
}

/// Bind to the configured address and serve until Ctrl-C.
///
/// # Errors
/// Returns `ServerError::InitializationError` if the address cannot be bound,
/// or `ServerError::Internal` if the server stops with an I/O error
pub async fn serve<P, E, S>(pipeline: SharedPipeline<P, E, S>, config: &ServerConfig) -> ServerResult<()>
where
    P: PaperProvider + 'static,
    E: EmbeddingProvider + 'static,
    S: LikedPaperStore + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::InitializationError(format!("failed to bind {}: {}", addr, e)))?;
    info!(%addr, "Listening on http://{}", addr);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutting down");
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], SCRIPT_JS)
}

async fn get_papers<P, E, S>(
    State(pipeline): State<SharedPipeline<P, E, S>>,
) -> ServerResult<Json<Vec<RankedPaper>>>
where
    P: PaperProvider,
    E: EmbeddingProvider,
    S: LikedPaperStore,
{
    let recommendations = pipeline.recommend().await?;

    if let RecommendationStatus::Untrained(reason) = recommendations.status {
        warn!(%reason, "No model available, returning no recommendations");
    }
    if recommendations.completeness == FetchCompleteness::Truncated {
        warn!(
            returned = recommendations.papers.len(),
            "Candidate listing was cut short"
        );
    }

    Ok(Json(recommendations.papers))
}

async fn save_paper<P, E, S>(
    State(pipeline): State<SharedPipeline<P, E, S>>,
    body: Result<Json<SavePaperRequest>, JsonRejection>,
) -> ServerResult<Json<SavePaperResponse>>
where
    P: PaperProvider,
    E: EmbeddingProvider,
    S: LikedPaperStore,
{
    let Json(request) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected save request body");
        ServerError::InvalidRequest(rejection.body_text())
    })?;
    if request.paper_id.trim().is_empty() {
        return Err(ServerError::InvalidRequest(
            "paper_id must not be empty".to_string(),
        ));
    }

    match pipeline.save_paper(&request.paper_id).await? {
        Some(paper) => Ok(Json(SavePaperResponse {
            success: true,
            paper,
        })),
        None => Err(ServerError::NotFound),
    }
}
