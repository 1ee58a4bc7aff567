use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use goesview_core::{PreviewError, SourceEntry};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::PathQuery;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// `GET /api/list?path=` - one directory level, images and subdirectories.
pub async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> AppResult<Json<Vec<SourceEntry>>> {
    let path = query.path.unwrap_or_default();
    debug!(path = %path, "listing directory");
    let entries = state.indexer.list_images(&path).await?;
    Ok(Json(entries))
}

/// `GET /api/download?path=` - the original file as an attachment.
pub async fn download_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> AppResult<Response> {
    let requested = query.required()?;
    let (normalized, full_path) = state
        .indexer
        .root()
        .resolve_file(requested)
        .await
        .map_err(|err| match err {
            PreviewError::SourceNotFound(_) => AppError::not_found("File not found"),
            other => AppError::from(other),
        })?;

    let file = tokio::fs::File::open(&full_path)
        .await
        .map_err(|err| AppError::internal(format!("failed to open {normalized}: {err}")))?;
    let length = file.metadata().await.ok().map(|meta| meta.len());
    info!(path = %normalized, "starting download");

    let file_name = full_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    );

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(file_name)),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for;

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("frame.webp"), "image/webp");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }
}
