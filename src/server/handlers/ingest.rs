use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::indexer::loader::has_allowed_extension;
use crate::server::AppState;
use crate::server::error::ApiError;

/// Multipart field carrying uploaded files.
pub const FILES_FIELD: &str = "files";

const STAGING_BUFFER_BYTES: usize = 1024 * 1024;
const NO_FILES: &str = "No files detected. Please upload at least one file.";

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Upload(#[from] MultipartError),
}

/// Accept uploaded files, index the supported ones, and swap in a new
/// engine version.
///
/// The whole request runs inside one ingest session, so concurrent uploads
/// are applied one after another.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let session = state.index.begin_ingest().await;

    let mut seen = 0usize;
    let mut empty_named = 0usize;
    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut staged: Vec<PathBuf> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        seen += 1;

        let raw_name = field.file_name().unwrap_or_default().to_string();
        let name = sanitize_filename(&raw_name);
        if name.is_empty() {
            empty_named += 1;
        }
        if name.is_empty() || !has_allowed_extension(&name, &state.allowed_extensions) {
            removed.push(if name.is_empty() { raw_name } else { name });
            continue;
        }

        let path = state.data_dir.join(&name);
        stage_field(&mut field, &path).await.map_err(|e| {
            ApiError::internal(&format!("Failed to process file {name}"), e)
        })?;
        if !staged.contains(&path) {
            staged.push(path);
            added.push(name);
        }
    }

    if seen == 0 || (seen == 1 && empty_named == 1) {
        return Err(ApiError::BadRequest(NO_FILES.to_string()));
    }

    if !staged.is_empty() {
        let report = session
            .index_files(&staged)
            .await
            .map_err(|e| ApiError::internal("Failed to store file in index", e))?;
        let version = session
            .commit()
            .await
            .map_err(|e| ApiError::internal("Failed to update index and query engine", e))?;
        info!(
            files = report.files,
            documents = report.documents,
            chunks = report.chunks,
            version,
            "Ingest finished"
        );

        for path in &staged {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| ApiError::internal("Failed to clean up staged files", e))?;
        }
    }

    Ok(Json(IngestResponse {
        message: render_message(&removed, &added),
        removed,
        added,
    }))
}

async fn stage_field(field: &mut Field<'_>, path: &Path) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::with_capacity(STAGING_BUFFER_BYTES, file);
    while let Some(chunk) = field.chunk().await? {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Final path component of a client-supplied filename.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "." | ".." => String::new(),
        _ => base.to_string(),
    }
}

/// Human-readable summary shown by the chat page (HTML line breaks).
pub fn render_message(removed: &[String], added: &[String]) -> String {
    let list = |names: &[String]| {
        names
            .iter()
            .map(|n| escape_html(n))
            .collect::<Vec<_>>()
            .join("<br>- ")
    };
    format!(
        "Removed from uploads (unsupported format):<br>- {}<br><br>Successfully uploaded and saved:<br>- {}<br><br>",
        list(removed),
        list(added)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
