//! Structured errors for the gateway HTTP surface.
//!
//! Gateway-level failures always surface as a JSON problem body, never a
//! panic; intercepted traffic itself degrades inside the worker and does
//! not reach this type.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use offcast_core::Error;

/// Structured errors for the gateway HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Worker(#[from] Error),

    #[error("INVALID_URL: {0}")]
    BadUrl(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadUrl(_) => StatusCode::BAD_REQUEST,
            GatewayError::Worker(Error::InvalidInput(_) | Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Worker(Error::Network(_) | Error::FetchTimeout(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = GatewayError::Worker(Error::Network("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::Worker(Error::InvalidInput("bad message".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = GatewayError::BadUrl("..".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
