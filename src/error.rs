use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced to HTTP callers. Genuine deployment conflicts are
/// reported inside structured response bodies instead, and parse
/// failures on tool output are absorbed where they happen; only these
/// variants abort a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("{0} not found")]
    NotFound(String),

    /// External command failed or could not be spawned, with the
    /// captured diagnostics.
    #[error("{0}")]
    Tool(String),
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidVersion(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Tool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
