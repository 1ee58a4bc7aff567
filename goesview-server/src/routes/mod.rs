use axum::{Router, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::handlers::{browse, channels, status, thumbnails};
use crate::infra::app_state::AppState;

/// JSON and file endpoints under `/api`.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/list", get(browse::list_handler))
        .route("/download", get(browse::download_handler))
        .route("/thumbnail", get(thumbnails::thumbnail_handler))
        .route("/description", get(channels::description_handler))
        .route("/shortname", get(channels::shortname_handler))
        .route("/status", get(status::status_handler))
}

/// Full application: API routes, static front-end fallback and request tracing.
pub fn create_app(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.static_dir);

    Router::new()
        .nest("/api", create_api_router())
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
