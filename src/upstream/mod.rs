//! Backend forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! request Envelope + OgcMessage
//!     → route.rs (namespace-bound / default URL, WMS reflector, query)
//!     → forward.rs (strip hop-by-hop headers, credentials → Authorization)
//!     → hyper client under timeout
//!     → response Envelope (allow-listed headers only)
//! ```
//!
//! # Design Decisions
//! - No retries: a failed backend call is terminal for that call
//! - Timeout is reported separately from connection failures
//! - Non-2xx backend answers become errors that keep status and body

pub mod forward;
pub mod route;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeError};
use crate::ogc::OgcMessage;

pub use forward::{strip_hop_by_hop, HttpUpstream, HOP_BY_HOP_HEADERS};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend answered {status}")]
    Status { status: StatusCode, body: Bytes },

    #[error("no backend configured for namespace {namespace:?}")]
    NoUpstream { namespace: Option<String> },

    #[error("invalid backend URI: {0}")]
    InvalidUri(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Sends a request envelope to the backend and returns its response envelope.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, message: Option<&OgcMessage>, request: Envelope) -> Result<Envelope, ForwardError>;
}
