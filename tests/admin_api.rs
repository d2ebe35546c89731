//! Admin API tests driven through the router without a socket.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use ows_interceptor::config::InterceptorConfig;
use ows_interceptor::dispatch::DispatchTable;
use ows_interceptor::rules::{MemoryRuleStore, RuleService};
use ows_interceptor::HttpServer;

fn app() -> (axum::Router, RuleService) {
    let mut config = InterceptorConfig::default();
    config.admin.api_key = "test-key".into();
    let rules = RuleService::new(Arc::new(MemoryRuleStore::new()));
    let server = HttpServer::new(config, rules.clone(), DispatchTable::new());
    (server.router(), rules)
}

fn call(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, "Bearer test-key");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requires_api_key() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/interceptorrules").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/interceptorrules")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rule_crud() {
    let (app, _) = app();
    let rule = json!({
        "direction": "REQUEST",
        "ruleType": "MODIFY",
        "service": "WMS",
        "operation": "GetMap",
        "endpoint": "topp:states"
    });

    let response = app
        .clone()
        .oneshot(call(Method::POST, "/interceptorrules", Some(rule.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_u64().unwrap();
    assert_eq!(created["endpoint"], "topp:states");

    let duplicate = app
        .clone()
        .oneshot(call(Method::POST, "/interceptorrules", Some(rule)))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let updated = app
        .clone()
        .oneshot(call(
            Method::PUT,
            &format!("/interceptorrules/{id}"),
            Some(json!({
                "direction": "REQUEST",
                "ruleType": "DENY",
                "service": "WMS",
                "operation": "GetMap",
                "endpoint": "topp:states"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["ruleType"], "DENY");

    let deleted = app
        .clone()
        .oneshot(call(Method::DELETE, &format!("/interceptorrules/{id}"), None))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = app
        .oneshot(call(Method::GET, &format!("/interceptorrules/{id}"), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_operation_for_service_is_rejected() {
    let (app, _) = app();
    let response = app
        .oneshot(call(
            Method::POST,
            "/interceptorrules",
            Some(json!({
                "direction": "REQUEST",
                "ruleType": "MODIFY",
                "service": "WCS",
                "operation": "GetMap"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_add_and_remove_for_endpoint() {
    let (app, rules) = app();

    let response = app
        .clone()
        .oneshot(call(Method::POST, "/interceptorrules/endpoint/layerA/modifyAllWms", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 12);

    let response = app
        .clone()
        .oneshot(call(
            Method::POST,
            "/interceptorrules/endpoint/layerA/request/WFS/DENY",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let wfs = json_body(response).await;
    assert!(wfs
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["direction"] == "REQUEST" && r["ruleType"] == "DENY"));

    let response = app
        .clone()
        .oneshot(call(
            Method::GET,
            "/interceptorrules/service/WMS/event/RESPONSE",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 6);

    let response = app
        .clone()
        .oneshot(call(Method::DELETE, "/interceptorrules/endpoint/layerA", None))
        .await
        .unwrap();
    let removed = json_body(response).await;
    assert_eq!(removed["removed"].as_u64().unwrap() as usize, 12 + wfs.as_array().unwrap().len());
    assert!(rules.list().await.unwrap().is_empty());

    let response = app
        .oneshot(call(
            Method::POST,
            "/interceptorrules/endpoint/layerA/sideways/WMS/ALLOW",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
