//! HTTP front end for browsing GOES imagery: directory listings, cached
//! thumbnails, full-image downloads and channel metadata.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
