//! Replayable request/response wrapper.
//!
//! # Responsibilities
//! - Own the metadata (method/URI or status, headers) of one call leg
//! - Buffer the one-shot body on first access and serve every later read from the buffer
//! - Let handlers replace the body, headers and query string
//!
//! # Design Decisions
//! - The raw stream is never exposed once buffering started, even if buffering failed
//! - Buffering is bounded; the limit is enforced while reading, not after
//! - An untouched streaming body is forwarded as-is (no buffering for pass-through GETs)
//! - A backend response carries the forwarding deadline; reading past it fails with
//!   `TimedOut`, both when buffering and when streaming to the caller

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri};
use axum::BoxError;
use futures_util::{stream, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use crate::message::KvpParams;

/// Errors raised while accessing an envelope body or metadata.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("failed to read body: {0}")]
    Read(String),

    /// A previous read failed; the stream is gone.
    #[error("body is no longer available")]
    Unavailable,

    #[error("body was not complete before the deadline")]
    TimedOut,

    #[error("invalid URI: {0}")]
    InvalidUri(String),
}

#[derive(Debug)]
enum Head {
    Request { method: Method, uri: Uri },
    Response { status: StatusCode },
}

enum BodyState {
    Streaming(Body),
    Buffered(Bytes),
    Failed,
}

/// One leg (request or response) of an intercepted call.
pub struct Envelope {
    head: Head,
    headers: HeaderMap,
    body: BodyState,
    limit: usize,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            BodyState::Streaming(_) => "streaming".to_string(),
            BodyState::Buffered(b) => format!("{} bytes", b.len()),
            BodyState::Failed => "failed".to_string(),
        };
        f.debug_struct("Envelope")
            .field("head", &self.head)
            .field("headers", &self.headers)
            .field("body", &body)
            .finish()
    }
}

impl Envelope {
    pub fn from_request(request: Request<Body>, limit: usize) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            head: Head::Request {
                method: parts.method,
                uri: parts.uri,
            },
            headers: parts.headers,
            body: BodyState::Streaming(body),
            limit,
            deadline: None,
        }
    }

    pub fn from_response(response: Response<Body>, limit: usize) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            head: Head::Response { status: parts.status },
            headers: parts.headers,
            body: BodyState::Streaming(body),
            limit,
            deadline: None,
        }
    }

    /// Bounds every later read of a still streaming body by `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Response envelope with an already buffered body.
    pub fn buffered_response(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>, limit: usize) -> Self {
        Self {
            head: Head::Response { status },
            headers,
            body: BodyState::Buffered(body.into()),
            limit,
            deadline: None,
        }
    }

    /// Buffers the body on first call; later calls return the same buffer.
    pub async fn body(&mut self) -> Result<&Bytes, EnvelopeError> {
        if let BodyState::Streaming(_) = self.body {
            let BodyState::Streaming(stream) = std::mem::replace(&mut self.body, BodyState::Failed) else {
                return Err(EnvelopeError::Unavailable);
            };
            let read = read_limited(&self.headers, stream, self.limit);
            let bytes = match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, read)
                    .await
                    .map_err(|_| EnvelopeError::TimedOut)??,
                None => read.await?,
            };
            self.body = BodyState::Buffered(bytes);
        }
        match &self.body {
            BodyState::Buffered(bytes) => Ok(bytes),
            _ => Err(EnvelopeError::Unavailable),
        }
    }

    /// The buffer, if the body has been read or replaced.
    pub fn buffered(&self) -> Option<&Bytes> {
        match &self.body {
            BodyState::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Replaces the body. The stale `Content-Length` is dropped.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = BodyState::Buffered(body.into());
        self.headers.remove(header::CONTENT_LENGTH);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn is_request(&self) -> bool {
        matches!(self.head, Head::Request { .. })
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.head {
            Head::Request { method, .. } => Some(method),
            Head::Response { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&Uri> {
        match &self.head {
            Head::Request { uri, .. } => Some(uri),
            Head::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.head {
            Head::Response { status } => Some(*status),
            Head::Request { .. } => None,
        }
    }

    pub fn set_status(&mut self, new_status: StatusCode) {
        if let Head::Response { status } = &mut self.head {
            *status = new_status;
        }
    }

    /// Query parameters of a request (empty for responses).
    pub fn query_params(&self) -> KvpParams {
        self.uri()
            .and_then(Uri::query)
            .map(KvpParams::parse)
            .unwrap_or_default()
    }

    /// Rewrites the query string of a request.
    pub fn set_query_params(&mut self, params: &KvpParams) -> Result<(), EnvelopeError> {
        let Head::Request { uri, .. } = &mut self.head else {
            return Ok(());
        };
        let query = params.to_query_string();
        let path_and_query = if query.is_empty() {
            uri.path().to_string()
        } else {
            format!("{}?{}", uri.path(), query)
        };
        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(
            path_and_query
                .parse()
                .map_err(|e: axum::http::uri::InvalidUri| EnvelopeError::InvalidUri(e.to_string()))?,
        );
        *uri = Uri::from_parts(parts).map_err(|e| EnvelopeError::InvalidUri(e.to_string()))?;
        Ok(())
    }

    fn into_body(body: BodyState, deadline: Option<Instant>) -> Result<Body, EnvelopeError> {
        match body {
            BodyState::Streaming(stream) => Ok(match deadline {
                Some(deadline) => with_deadline(stream, deadline),
                None => stream,
            }),
            BodyState::Buffered(bytes) => Ok(Body::from(bytes)),
            BodyState::Failed => Err(EnvelopeError::Unavailable),
        }
    }

    /// Decomposes a request envelope into its method, URI, headers and body.
    pub fn into_request_parts(self) -> Result<(Method, Uri, HeaderMap, Body), EnvelopeError> {
        match self.head {
            Head::Request { method, uri } => Ok((method, uri, self.headers, Self::into_body(self.body, self.deadline)?)),
            Head::Response { .. } => Err(EnvelopeError::Unavailable),
        }
    }

    /// Builds the response to hand back to the caller.
    pub fn into_response(self) -> Result<Response<Body>, EnvelopeError> {
        let status = self.status().unwrap_or(StatusCode::OK);
        let mut response = Response::new(Self::into_body(self.body, self.deadline)?);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

/// Ends the stream with `TimedOut` once `deadline` passes.
fn with_deadline(body: Body, deadline: Instant) -> Body {
    let chunks = body.into_data_stream();
    Body::from_stream(stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout_at(deadline, chunks.next()).await {
            Ok(Some(chunk)) => {
                let chunk: Result<Bytes, BoxError> = chunk.map_err(BoxError::from);
                Some((chunk, Some(chunks)))
            }
            Ok(None) => None,
            Err(_) => {
                let timed_out: Result<Bytes, BoxError> = Err(EnvelopeError::TimedOut.into());
                Some((timed_out, None))
            }
        }
    }))
}

async fn read_limited(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, EnvelopeError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(EnvelopeError::TooLarge { limit });
    }

    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| EnvelopeError::Read(e.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(EnvelopeError::TooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}
