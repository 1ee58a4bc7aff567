use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::PathQuery;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// `GET /api/thumbnail?path=` - the cached preview, rendered on a miss.
pub async fn thumbnail_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> AppResult<Response> {
    let requested = query.required()?;
    let preview = state.cache.get(requested).await.map_err(|err| {
        warn!(path = %requested, error = %err, "thumbnail request failed");
        AppError::from(err)
    })?;
    debug!(path = %requested, preview = %preview.display(), "serving thumbnail");

    let file = tokio::fs::File::open(&preview)
        .await
        .map_err(|err| AppError::internal(format!("failed to open preview: {err}")))?;
    let length = file.metadata().await.ok().map(|meta| meta.len());

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}
