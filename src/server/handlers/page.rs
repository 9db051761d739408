use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use crate::server::AppState;

/// Serve the chat interface. An unreadable file yields an empty page.
pub async fn chat_page(State(state): State<Arc<AppState>>) -> Html<String> {
    match tokio::fs::read_to_string(&state.html_path).await {
        Ok(content) => Html(content),
        Err(e) => {
            tracing::error!("Failed to read {}: {e}", state.html_path.display());
            Html(String::new())
        }
    }
}
