use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Decides whether a caller may use the admin API.
#[async_trait]
pub trait PermissionEvaluator: Send + Sync {
    async fn is_permitted(&self, method: &Method, headers: &HeaderMap) -> bool;
}

/// Accepts `Authorization: Bearer <api_key>`.
pub struct ApiKeyEvaluator {
    expected: String,
}

impl ApiKeyEvaluator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            expected: format!("Bearer {}", api_key.into()),
        }
    }
}

#[async_trait]
impl PermissionEvaluator for ApiKeyEvaluator {
    async fn is_permitted(&self, _method: &Method, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|value| value == self.expected)
    }
}

pub async fn admin_auth_middleware(
    State(evaluator): State<Arc<dyn PermissionEvaluator>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if evaluator.is_permitted(request.method(), request.headers()).await {
        return Ok(next.run(request).await);
    }
    tracing::warn!(method = %request.method(), uri = %request.uri(), "Admin call rejected");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_key_evaluator() {
        let evaluator = ApiKeyEvaluator::new("secret");
        let mut headers = HeaderMap::new();
        assert!(!evaluator.is_permitted(&Method::GET, &headers).await);
        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!evaluator.is_permitted(&Method::GET, &headers).await);
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(evaluator.is_permitted(&Method::DELETE, &headers).await);
    }
}
