//! Application error codes and the JSON envelope they render to.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use std::fmt;

/// A business error code with its default message and HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    code: i32,
    message: &'static str,
    status: StatusCode,
}

impl Code {
    /// Success.
    pub const OK: Code = Code::new(0, "OK", StatusCode::OK);
    /// An unexpected failure inside a handler.
    pub const INTERNAL_ERROR: Code =
        Code::new(50, "Internal Error", StatusCode::INTERNAL_SERVER_ERROR);
    /// A bound request failed validation.
    pub const VALIDATION_FAILED: Code =
        Code::new(51, "Validation Failed", StatusCode::BAD_REQUEST);
    /// The request could not be decoded.
    pub const INVALID_PARAMETER: Code =
        Code::new(53, "Invalid Parameter", StatusCode::BAD_REQUEST);
    /// The requested resource does not exist.
    pub const NOT_FOUND: Code = Code::new(65, "Not Found", StatusCode::NOT_FOUND);

    /// Defines a custom code.
    pub const fn new(code: i32, message: &'static str, status: StatusCode) -> Self {
        Self {
            code,
            message,
            status,
        }
    }

    /// The numeric code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The default message.
    pub fn message(&self) -> &'static str {
        self.message
    }

    /// The HTTP status used when this code is rendered.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code, self.message)
    }
}

/// An error carrying a [`Code`] and a caller-facing message.
///
/// # Examples
///
/// ```
/// use skein::server::{AppError, Code};
///
/// let err = AppError::new_code(Code::NOT_FOUND, "user 7 does not exist");
/// assert_eq!(err.code(), Code::NOT_FOUND);
/// assert_eq!(err.to_string(), "user 7 does not exist");
/// ```
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AppError {
    code: Code,
    message: String,
}

impl AppError {
    /// Creates an error with `code` and `message`.
    pub fn new_code(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error using the code's default message.
    pub fn from_code(code: Code) -> Self {
        Self::new_code(code, code.message())
    }

    /// The error's code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// The error's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The JSON body every handler outcome is rendered into.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Business code, `0` on success.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Handler payload, `null` on error.
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    /// A success envelope around `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: Code::OK.code(),
            message: Code::OK.message().to_string(),
            data: Some(data),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            code: self.code.code(),
            message: self.message,
            data: None,
        };
        (self.code.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_uses_default_message() {
        let err = AppError::from_code(Code::INTERNAL_ERROR);
        assert_eq!(err.message(), "Internal Error");
        assert_eq!(err.code().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_response_uses_code_status() {
        let response = AppError::new_code(Code::VALIDATION_FAILED, "name is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(Envelope::ok(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": 0, "message": "OK", "data": {"id": 1}})
        );
    }
}
