//! HTTP handlers. Each one is a thin wrapper over a core operation; errors
//! convert through [`AppError`](crate::infra::errors::AppError).

pub mod browse;
pub mod channels;
pub mod status;
pub mod thumbnails;

use serde::Deserialize;

use crate::infra::errors::AppError;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    /// The `path` parameter, rejecting a missing or empty value.
    pub fn required(&self) -> Result<&str, AppError> {
        self.path
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| AppError::bad_request("Path parameter is required"))
    }
}
