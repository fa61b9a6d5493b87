use std::path::Path;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};

use parley_types::api::UploadResponse;

use crate::AppState;

/// POST /upload: multipart form with a `file` field. Saves it under the
/// upload dir as `<millis>-<name>` and returns where it is served from.
/// Announcing the file to the room is left to the client's `file message`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > state.max_upload_bytes {
                warn!("Upload {} exceeds {} bytes", file_name, state.max_upload_bytes);
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
        }
        upload = Some((file_name, bytes));
    }

    let Some((file_name, bytes)) = upload else {
        return Err(StatusCode::BAD_REQUEST);
    };
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| {
            error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let stored_name = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(&file_name)
    );
    let file_path = state.upload_dir.join(&stored_name);
    tokio::fs::write(&file_path, &bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Stored upload {} ({} bytes)", stored_name, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_url: format!("/uploads/{}", stored_name),
            file_name,
        }),
    ))
}

fn bad_multipart(e: MultipartError) -> StatusCode {
    warn!("Malformed upload: {}", e);
    e.status()
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]` so the stored name can't escape the upload dir.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
