// src/api.rs
use std::sync::PoisonError;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::QueryError;
use crate::query::{self, QueryParams, QueryResponse};
use crate::registry::SharedRegistry;

pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/entities", get(list_entities))
        .route("/entities/{id}/events", get(entity_events))
        .layer(CorsLayer::very_permissive())
        .with_state(registry)
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            QueryError::EntityNotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string() }),
            ),
            QueryError::UnknownFeeds(names) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "invalid": names }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(serde::Serialize)]
struct EntityOut {
    id: String,
    start: chrono::DateTime<chrono::Utc>,
    end: Option<chrono::DateTime<chrono::Utc>>,
    feeds: Vec<String>,
}

async fn list_entities(State(registry): State<SharedRegistry>) -> Json<Vec<EntityOut>> {
    let out = {
        let guard = registry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .entities()
            .iter()
            .map(|e| EntityOut {
                id: e.id.clone(),
                start: e.start,
                end: e.end,
                feeds: e.feeds.clone(),
            })
            .collect()
    };
    Json(out)
}

async fn entity_events(
    State(registry): State<SharedRegistry>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, QueryError> {
    let result = {
        let guard = registry.read().unwrap_or_else(PoisonError::into_inner);
        query::query(&guard, &id, &params)
    };
    result.map(Json)
}
