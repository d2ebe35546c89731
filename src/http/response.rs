//! Error → HTTP status mapping.
//!
//! # Design Decisions
//! - Backend timeouts result in 504 Gateway Timeout, other backend failures in 502,
//!   including a backend body that cannot be read
//! - A backend error status is handed back with its body
//! - Internal failures are logged, not echoed in detail

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::HandlerError;
use crate::envelope::EnvelopeError;
use crate::error::InterceptorError;
use crate::resolver::ResolveError;
use crate::upstream::ForwardError;

fn envelope_status(e: &EnvelopeError) -> StatusCode {
    match e {
        EnvelopeError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        EnvelopeError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl InterceptorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InterceptorError::Resolve(ResolveError::Body(e)) => envelope_status(e),
            InterceptorError::Resolve(_) => StatusCode::BAD_REQUEST,
            InterceptorError::Envelope(e) => envelope_status(e),
            InterceptorError::Denied { .. } => StatusCode::FORBIDDEN,
            InterceptorError::Handler(HandlerError::Envelope(e)) => envelope_status(e),
            InterceptorError::Rules(_) | InterceptorError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InterceptorError::Forward(e) => match e {
                ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ForwardError::Status { status, .. } => *status,
                ForwardError::Envelope(EnvelopeError::TimedOut) => StatusCode::GATEWAY_TIMEOUT,
                ForwardError::Envelope(_) => StatusCode::BAD_GATEWAY,
                ForwardError::Unreachable(_) | ForwardError::NoUpstream { .. } | ForwardError::InvalidUri(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
        }
    }
}

impl IntoResponse for InterceptorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            InterceptorError::Forward(ForwardError::Status { status, body }) => (status, body).into_response(),
            InterceptorError::Rules(_) | InterceptorError::Handler(HandlerError::Failed(_)) => {
                tracing::error!(error = %self, "Interception failed");
                (status, "Internal interceptor error").into_response()
            }
            other => {
                tracing::debug!(error = %other, status = %status, "Call rejected");
                (status, [(header::CONTENT_TYPE, "text/plain")], other.to_string()).into_response()
            }
        }
    }
}
