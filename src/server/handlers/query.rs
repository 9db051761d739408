use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::engine::response::{QueryResponse, QueryResult, QueryWithContext};
use crate::server::AppState;
use crate::server::error::ApiError;

const EMPTY_QUERY: &str = "No query text detected. Please ensure query is not empty.";

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub query: String,
}

async fn run_query(state: &AppState, query: &str) -> Result<QueryResponse, ApiError> {
    if query.is_empty() {
        return Err(ApiError::BadRequest(EMPTY_QUERY.to_string()));
    }
    let engine = state.index.engine().await;
    engine
        .query(query)
        .await
        .map_err(|e| ApiError::internal("Failed to process query", e))
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let response = run_query(&state, &params.query).await?;
    Ok(Json(QueryResult {
        query: params.query,
        results: response.answer,
    }))
}

pub async fn query_with_context(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryWithContext>, ApiError> {
    let response = run_query(&state, &params.query).await?;
    Ok(Json(QueryWithContext {
        sources: response.sources(),
        answer: response.answer,
        query: params.query,
    }))
}
