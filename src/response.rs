//! HTTP response building helpers
//!
//! Every handler answers with JSON; errors are `{"error": message}` with a status
//! chosen by [`error_response`].

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::SpaceError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, message)
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Status code for a [`SpaceError`]
pub fn status_for(error: &SpaceError) -> StatusCode {
    match error {
        SpaceError::InvalidCoordinate(_)
        | SpaceError::InvalidInput(_)
        | SpaceError::NoSuchFeature(_)
        | SpaceError::Json(_) => StatusCode::BAD_REQUEST,
        SpaceError::AlreadyOwned { .. }
        | SpaceError::AlreadyPurchased(_)
        | SpaceError::RequiresOwnership
        | SpaceError::Conflict(_) => StatusCode::CONFLICT,
        SpaceError::NotOwner { .. } => StatusCode::FORBIDDEN,
        SpaceError::NotFound(_) => StatusCode::NOT_FOUND,
        SpaceError::Auth(_) => StatusCode::UNAUTHORIZED,
        SpaceError::Config(_) | SpaceError::Io(_) | SpaceError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert a SpaceError to an appropriate HTTP response
pub fn error_response(error: SpaceError) -> Response<Full<Bytes>> {
    error_body(status_for(&error), &error.to_string())
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, SpaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_ownership_conflicts_are_409() {
        for err in [
            SpaceError::AlreadyOwned { owner: "u1".into() },
            SpaceError::RequiresOwnership,
            SpaceError::AlreadyPurchased("premium_chat".into()),
            SpaceError::Conflict("dup".into()),
        ] {
            assert_eq!(error_response(err).status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_input_errors_are_400() {
        assert_eq!(
            status_for(&SpaceError::InvalidCoordinate("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SpaceError::NoSuchFeature("jetpack".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_other_statuses() {
        assert_eq!(status_for(&SpaceError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&SpaceError::Auth("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&SpaceError::NotOwner { owner: "u1".into() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&SpaceError::Internal("closed".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
