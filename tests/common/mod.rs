//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ows_interceptor::config::InterceptorConfig;
use ows_interceptor::dispatch::DispatchTable;
use ows_interceptor::lifecycle::Shutdown;
use ows_interceptor::rules::{MemoryRuleStore, RuleService};
use ows_interceptor::HttpServer;

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
struct BackendState {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// A mock GeoServer that records every request it receives.
pub struct Backend {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl Backend {
    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn ows_url(&self) -> String {
        format!("http://{}/geoserver/ows", self.addr)
    }
}

async fn capture(State(state): State<BackendState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    state.captured.lock().unwrap().push(Captured {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (
        state.status,
        [
            ("content-type", "text/xml"),
            ("geowebcache-cache-result", "MISS"),
            ("set-cookie", "JSESSIONID=backend"),
        ],
        state.body,
    )
        .into_response()
}

/// Start a recording backend answering every call with `status` and `body`.
pub async fn start_capturing_backend(status: u16, body: &'static str, delay: Duration) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = BackendState {
        status: StatusCode::from_u16(status).unwrap(),
        body,
        delay,
        captured: captured.clone(),
    };
    let app = Router::new().fallback(capture).with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Backend { addr, captured }
}

/// Start a simple raw-socket backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Raw backend that sends `head` (status line, headers, part of the body) and then stalls.
pub async fn start_stalling_backend(head: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running interceptor.
pub struct Proxy {
    pub addr: SocketAddr,
    pub rules: RuleService,
    pub config_updates: mpsc::UnboundedSender<InterceptorConfig>,
    pub shutdown: Shutdown,
}

impl Proxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start an interceptor with `config` on an ephemeral port.
pub async fn start_proxy(config: InterceptorConfig) -> Proxy {
    let rules = RuleService::new(Arc::new(MemoryRuleStore::new()));
    let dispatch = DispatchTable::from_config(&config.handlers).unwrap();
    let server = HttpServer::new(config, rules.clone(), dispatch);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    Proxy {
        addr,
        rules,
        config_updates,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Default config pointed at `ows_url`.
pub fn config_for(ows_url: String) -> InterceptorConfig {
    let mut config = InterceptorConfig::default();
    config.upstream.default_ows_url = Some(ows_url);
    config.admin.api_key = "test-key".into();
    config
}
