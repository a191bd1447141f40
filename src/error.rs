//! Errors that reach API clients.

use serde_json::json;
use thiserror::Error;

use crate::cache::CacheError;
use crate::upstream::UpstreamError;
use crate::{Response, StatusCode};

/// Failure of a weather lookup, mapped onto an HTTP status and a
/// `{"error": "..."}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("City is required")]
    MissingCity,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("cached weather entry is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("weather service is not configured")]
    NotConfigured,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCity => StatusCode::BadRequest,
            ApiError::Upstream(_) => StatusCode::BadGateway,
            ApiError::Cache(_) | ApiError::Decode(_) | ApiError::NotConfigured => {
                StatusCode::InternalServerError
            }
        }
    }

    pub fn into_response(self) -> Response {
        Response::new(self.status()).json(&json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.content()).unwrap()
    }

    #[test]
    fn missing_city_is_400() {
        let response = ApiError::MissingCity.into_response();
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(body(&response), json!({ "error": "City is required" }));
        assert_eq!(response.headers().get("content-type"), Some("application/json"));
    }

    #[test]
    fn upstream_failure_is_502_with_message() {
        let err = ApiError::from(UpstreamError::Status {
            status: 400,
            body: "Bad API Request".to_owned(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BadGateway);
        assert_eq!(
            body(&response),
            json!({ "error": "weather provider returned 400: Bad API Request" })
        );
    }

    #[test]
    fn store_failure_is_500() {
        let err = ApiError::from(CacheError::Unavailable("connection refused".to_owned()));
        assert_eq!(err.status(), StatusCode::InternalServerError);
        assert_eq!(
            body(&err.into_response()),
            json!({ "error": "cache store unavailable: connection refused" })
        );
    }
}
