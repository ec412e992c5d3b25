use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::recommender::Recommender;
use crate::types::RecommendationOutput;
use crate::{RecommendError, TARGET_WEB_REQUEST};

#[derive(Clone)]
pub struct AppState {
    recommender: Arc<Recommender>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(recommender: Arc<Recommender>) -> Self {
        Self {
            recommender,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
    top_k: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

/// Maps a failed recommendation onto an HTTP status.
pub struct ApiError(RecommendError);

impl From<RecommendError> for ApiError {
    fn from(err: RecommendError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            RecommendError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RecommendError::MalformedDecomposition(_) => StatusCode::BAD_GATEWAY,
            RecommendError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RecommendError::DataIntegrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_check))
        .route("/recommend", post(recommend))
        .with_state(state)
}

/// Runs the HTTP server until it fails.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(target: TARGET_WEB_REQUEST, "Server running on http://{}", addr);

    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn status_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        top_k: state.recommender.config().content.top_k,
    })
}

async fn recommend(
    State(state): State<AppState>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendationOutput>, ApiError> {
    info!(target: TARGET_WEB_REQUEST, "Recommendation request: {}", payload.query);

    match state.recommender.recommend(&payload.query).await {
        Ok(output) => {
            info!(target: TARGET_WEB_REQUEST,
                "Returning {} recommendations", output.recommendations.len());
            Ok(Json(output))
        }
        Err(e) => {
            if e.is_retryable() {
                error!(target: TARGET_WEB_REQUEST, "Recommendation failed: {}", e);
            } else {
                warn!(target: TARGET_WEB_REQUEST, "Recommendation rejected: {}", e);
            }
            Err(e.into())
        }
    }
}
