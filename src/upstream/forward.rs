//! HTTP forwarding to the geospatial backend.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::route::{upstream_url, with_query};
use super::{ForwardError, Upstream};
use crate::config::UpstreamConfig;
use crate::envelope::{Envelope, EnvelopeError};
use crate::observability::metrics;
use crate::ogc::OgcMessage;

/// Connection-specific headers never forwarded in either direction.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Removes hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    for name in HOP_BY_HOP_HEADERS.iter().copied().chain(listed.iter().map(String::as_str)) {
        headers.remove(name);
    }
}

/// Keeps only the allow-listed response headers.
fn filter_response_headers(headers: &HeaderMap, allowed: &[String]) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(name.as_str())) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Forwards calls with a pooled hyper client.
pub struct HttpUpstream {
    client: Client<HttpConnector, Body>,
    config: Arc<ArcSwap<UpstreamConfig>>,
    timeout: Duration,
    body_limit: usize,
}

impl HttpUpstream {
    pub fn new(
        config: Arc<ArcSwap<UpstreamConfig>>,
        connect_timeout: Duration,
        timeout: Duration,
        body_limit: usize,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            config,
            timeout,
            body_limit,
        }
    }

    fn prepare_headers(&self, mut headers: HeaderMap, config: &UpstreamConfig) -> HeaderMap {
        strip_hop_by_hop(&mut headers);
        if let Ok(name) = HeaderName::from_bytes(config.credentials_header.as_bytes()) {
            if let Some(credentials) = headers.remove(&name) {
                headers.insert(header::AUTHORIZATION, credentials);
            }
        }
        headers
    }

    fn timed_out(&self, target: &url::Url) -> ForwardError {
        metrics::record_upstream_error("timeout");
        tracing::warn!(target = %target, timeout = ?self.timeout, "Backend timed out");
        ForwardError::Timeout(self.timeout)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, message: Option<&OgcMessage>, request: Envelope) -> Result<Envelope, ForwardError> {
        let config = self.config.load_full();
        let base = upstream_url(&config, message)?;
        let (method, uri, headers, body) = request.into_request_parts()?;
        let target = with_query(base, uri.query());

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method.clone();
        *outbound.uri_mut() = target
            .as_str()
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ForwardError::InvalidUri(e.to_string()))?;
        *outbound.headers_mut() = self.prepare_headers(headers, &config);

        tracing::debug!(method = %method, target = %target, "Forwarding to backend");
        let start = Instant::now();
        // one deadline covers the headers and the whole body
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response: hyper::Response<Incoming> = match tokio::time::timeout_at(deadline, self.client.request(outbound)).await {
            Err(_) => return Err(self.timed_out(&target)),
            Ok(Err(e)) => {
                metrics::record_upstream_error("unreachable");
                tracing::warn!(target = %target, error = %e, "Backend unreachable");
                return Err(ForwardError::Unreachable(e.to_string()));
            }
            Ok(Ok(response)) => response,
        };
        metrics::record_upstream_latency(start);

        let status = response.status();
        let mut envelope = Envelope::from_response(response.map(Body::new), self.body_limit).with_deadline(deadline);
        let mut response_headers = envelope.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        *envelope.headers_mut() = filter_response_headers(&response_headers, &config.forward_response_headers);

        if !status.is_success() {
            metrics::record_upstream_error("status");
            let body = match envelope.body().await {
                Ok(body) => body.clone(),
                Err(EnvelopeError::TimedOut) => return Err(self.timed_out(&target)),
                Err(e) => return Err(e.into()),
            };
            tracing::warn!(target = %target, status = %status, "Backend answered with an error status");
            return Err(ForwardError::Status { status, body });
        }
        Ok(envelope)
    }
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("timeout", &self.timeout)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}
