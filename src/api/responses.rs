//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::SsoError;

/// HTTP-facing error: a status code and a client-safe message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "no permitted role presented")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<SsoError> for ApiError {
    fn from(err: SsoError) -> Self {
        match &err {
            SsoError::UnknownProvider { .. }
            | SsoError::Protocol { .. }
            | SsoError::DuplicateState
            | SsoError::MalformedClaim { .. }
            | SsoError::Json(_)
            | SsoError::Url(_)
            | SsoError::Xml(_) => Self::bad_request(err.to_string()),

            // Role mismatch details stay in the server log.
            SsoError::RoleMismatch { .. } => Self::unauthorized(),

            // Expiry, forgery, and premature completion calls all surface
            // the same generic failure.
            SsoError::NoMatchingState => Self::bad_request("no matching login state"),

            SsoError::Configuration { .. }
            | SsoError::Provisioning { .. }
            | SsoError::SessionIssuance { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
