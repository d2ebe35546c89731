//! Top-level error for one intercepted call.

use thiserror::Error;

use crate::dispatch::HandlerError;
use crate::envelope::EnvelopeError;
use crate::ogc::{Direction, OperationType, ServiceType};
use crate::resolver::ResolveError;
use crate::rules::RuleServiceError;
use crate::upstream::ForwardError;

#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("rule lookup failed: {0}")]
    Rules(#[from] RuleServiceError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("{direction} {service} {operation} denied for endpoint {endpoint:?}")]
    Denied {
        direction: Direction,
        service: ServiceType,
        operation: OperationType,
        endpoint: Option<String>,
    },
}
