use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub channel: Option<String>,
}

impl ChannelQuery {
    fn required(&self) -> Result<&str, AppError> {
        self.channel
            .as_deref()
            .filter(|channel| !channel.is_empty())
            .ok_or_else(|| AppError::bad_request("Channel parameter is required"))
    }
}

fn channel_not_found() -> Response {
    (
        StatusCode::NO_CONTENT,
        Json(json!({ "error": "Channel not found" })),
    )
        .into_response()
}

/// `GET /api/description?channel=`
pub async fn description_handler(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> AppResult<Response> {
    let channel = query.required()?;
    Ok(match state.channels.describe(channel) {
        Some(description) => Json(json!({ "description": description })).into_response(),
        None => channel_not_found(),
    })
}

/// `GET /api/shortname?channel=`
pub async fn shortname_handler(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> AppResult<Response> {
    let channel = query.required()?;
    Ok(match state.channels.shortname(channel) {
        Some(shortname) => Json(json!({ "shortname": shortname })).into_response(),
        None => channel_not_found(),
    })
}
