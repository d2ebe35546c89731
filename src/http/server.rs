//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the OWS, health and admin routes
//! - Wire up middleware (timeout, request ID, tracing)
//! - Build the pipeline and its backend client from configuration
//! - Apply hot-reloaded upstream settings
//! - Stop on the shutdown broadcast

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{self, ApiKeyEvaluator, PermissionEvaluator};
use crate::config::{InterceptorConfig, UpstreamConfig};
use crate::dispatch::DispatchTable;
use crate::envelope::Envelope;
use crate::error::InterceptorError;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::pipeline::Pipeline;
use crate::rules::RuleService;
use crate::upstream::{HttpUpstream, Upstream};

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub body_limit: usize,
}

/// HTTP front of the interceptor.
pub struct HttpServer {
    router: Router,
    upstream_config: Arc<ArcSwap<UpstreamConfig>>,
}

impl HttpServer {
    /// Create a server forwarding to the configured backend.
    pub fn new(config: InterceptorConfig, rules: RuleService, dispatch: DispatchTable) -> Self {
        let upstream_config = Arc::new(ArcSwap::from_pointee(config.upstream.clone()));
        let upstream = Arc::new(HttpUpstream::new(
            upstream_config.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.upstream_secs),
            config.listener.max_body_bytes,
        ));
        let evaluator = Arc::new(ApiKeyEvaluator::new(config.admin.api_key.clone()));
        Self::with_parts(config, rules, dispatch, upstream, evaluator, upstream_config)
    }

    /// Create a server with a caller-supplied backend and admin permission check.
    pub fn with_parts(
        config: InterceptorConfig,
        rules: RuleService,
        dispatch: DispatchTable,
        upstream: Arc<dyn Upstream>,
        evaluator: Arc<dyn PermissionEvaluator>,
        upstream_config: Arc<ArcSwap<UpstreamConfig>>,
    ) -> Self {
        let pipeline = Arc::new(Pipeline::new(rules.clone(), Arc::new(dispatch), upstream));
        let state = AppState {
            pipeline,
            body_limit: config.listener.max_body_bytes,
        };

        let mut router = Router::new()
            .route("/ows", get(ows_handler).post(ows_handler))
            .route("/health", get(health_handler))
            .with_state(state);
        if config.admin.enabled {
            router = router.merge(admin::router(rules, evaluator));
        }

        Self {
            router: Self::apply_layers(&config, router),
            upstream_config,
        }
    }

    /// Wrap the router in the middleware stack.
    #[allow(deprecated)]
    fn apply_layers(config: &InterceptorConfig, router: Router) -> Router {
        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// The fully layered router (used by in-process tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` replace the upstream settings;
    /// other sections need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<InterceptorConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let upstream_config = self.upstream_config.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                upstream_config.store(Arc::new(config.upstream));
                tracing::info!("Upstream configuration reloaded");
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Runs one OWS call through the pipeline.
async fn ows_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let envelope = Envelope::from_request(request, state.body_limit);
    match state.pipeline.handle(envelope).await {
        Ok(response) => match response.into_response() {
            Ok(response) => response,
            Err(e) => InterceptorError::from(e).into_response(),
        },
        Err(e) => e.into_response(),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MemoryRuleStore;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let rules = RuleService::new(Arc::new(MemoryRuleStore::new()));
        HttpServer::new(InterceptorConfig::default(), rules, DispatchTable::new())
    }

    #[tokio::test]
    async fn test_health_carries_request_id() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_client_request_id_is_kept() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_malformed_xml_is_bad_request() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ows")
                    .body(Body::from("<GetFeature service=\"WFS\"><Query"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
