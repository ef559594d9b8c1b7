// src/api.rs
//! HTTP surface: one aggregation endpoint plus health. Every response body is
//! JSON, including the failure paths; CORS is wide open for the mobile app.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::aggregate::{AggregateError, AggregateRequest, Aggregator};
use crate::model::{NewsItem, PriorityFilter, Source};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news/aggregate", post(aggregate_news))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateBody {
    artist_name: String,
    #[serde(default)]
    artist_id: Option<String>,
    #[serde(default)]
    sources: Option<Vec<Source>>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    priority_filter: PriorityFilter,
    #[serde(default)]
    use_cache: Option<bool>,
}

#[derive(Serialize)]
struct AggregateResponse {
    success: bool,
    count: usize,
    items: Vec<NewsItem>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn aggregate_news(
    State(state): State<AppState>,
    payload: Result<Json<AggregateBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(json) => json,
        // malformed/missing JSON still gets a parseable error body
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let req = AggregateRequest {
        artist_name: body.artist_name,
        artist_id: body.artist_id,
        sources: body.sources.unwrap_or_else(|| Source::ALL.to_vec()),
        user_id: body.user_id,
        priority_filter: body.priority_filter,
        use_cache: body.use_cache.unwrap_or(true),
    };

    match state.aggregator.aggregate(req).await {
        Ok(items) => (
            StatusCode::OK,
            Json(AggregateResponse {
                success: true,
                count: items.len(),
                items,
            }),
        )
            .into_response(),
        Err(AggregateError::InvalidRequest(message)) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(AggregateError::Internal(fault)) => {
            error!(target: "api", ?fault, "aggregation fault");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}
