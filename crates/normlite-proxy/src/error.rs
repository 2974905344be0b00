//! Maps the execution core's error taxonomy onto HTTP status codes and the
//! `{transaction_id?, state, data?, error?}` response envelope.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use normlite_core::NormliteError;
use serde::Serialize;
use std::fmt;

/// Wraps a [`NormliteError`] so it can implement [`ResponseError`] without
/// `normlite-core` needing to depend on `actix-web`.
#[derive(Debug)]
pub struct ApiError(pub NormliteError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<NormliteError> for ApiError {
    fn from(err: NormliteError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            NormliteError::Syntax(_) | NormliteError::Argument { .. } | NormliteError::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            NormliteError::AcquireLockFailed { .. } | NormliteError::Transaction { .. } => StatusCode::CONFLICT,
            NormliteError::NoResultFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorEnvelope {
            transaction_id: None,
            state: "ERROR",
            data: None,
            error: Some(self.0.to_string()),
        })
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    transaction_id: Option<String>,
    state: &'static str,
    data: Option<()>,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_and_argument_and_invalid_request_map_to_bad_request() {
        assert_eq!(ApiError(NormliteError::argument("bad")).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(NormliteError::invalid_request("bad")).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn transaction_errors_map_to_conflict() {
        assert_eq!(ApiError(NormliteError::transaction("bad state")).status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn no_result_found_maps_to_not_found() {
        assert_eq!(ApiError(NormliteError::NoResultFound).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn everything_else_maps_to_internal_server_error() {
        assert_eq!(ApiError(NormliteError::internal("oops")).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
