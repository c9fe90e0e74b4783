//! Top-level request errors and their HTTP mapping.
//!
//! These are the failures that happen before a response stream exists.
//! Failures after forwarding has started are reported through the
//! response sink instead.

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::protocol::EnvelopeError;

/// Fixed diagnostic for backend failures.
pub const EXECUTION_FAILED_REASON: &str = "Story execution failed";
pub const EXECUTION_FAILED_BODY: &str = "HTTP 500: Story execution failed\n";

/// Value of the `Allow` header on OPTIONS and 405 responses.
pub const ALLOWED_METHODS: &str = "GET,HEAD,POST,PUT,PATCH,DELETE,OPTIONS";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route resolves the request.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    /// The HTTP method is outside the forwarded surface.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// The request could not be translated to an envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The forwarding task ended without producing a response head.
    #[error("{}", EXECUTION_FAILED_REASON)]
    ExecutionFailed,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { method, .. } => {
                if method == Method::GET {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::METHOD_NOT_ALLOWED
                }
            }
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Envelope(_) => StatusCode::BAD_REQUEST,
            GatewayError::ExecutionFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            GatewayError::ExecutionFailed => EXECUTION_FAILED_BODY.to_string(),
            _ => format!(
                "HTTP {}: {}\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Error")
            ),
        };
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response();
        if matches!(self, GatewayError::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}
