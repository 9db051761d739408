use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::AppState;
use crate::server::handlers::{ingest, page, query};

/// Creates the application router.
///
/// - `GET /` chat page
/// - `POST /ingest` multipart upload of `files`
/// - `GET /query` and `GET /query_with_context` with a `query` parameter
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    Router::new()
        .route("/", get(page::chat_page))
        .route("/ingest", post(ingest::ingest))
        .route("/query", get(query::query))
        .route("/query_with_context", get(query::query_with_context))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
