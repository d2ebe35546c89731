//! Concurrent calls through the interceptor.

use std::time::{Duration, Instant};

use ows_interceptor::ogc::{Direction, OperationType, RuleType, ServiceType};
use ows_interceptor::rules::NewRule;

mod common;

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let backend = common::start_capturing_backend(200, "tile", Duration::ZERO).await;
    let proxy = common::start_proxy(common::config_for(backend.ows_url())).await;
    proxy
        .rules
        .create(NewRule::new(
            Direction::Request,
            RuleType::Deny,
            ServiceType::Wms,
            OperationType::GetMap,
            Some("secret:layer"),
        ))
        .await
        .unwrap();

    let client = common::client();
    let num_requests = 200;
    let start = Instant::now();

    let mut handles = Vec::new();
    for i in 0..num_requests {
        let client = client.clone();
        let layer = if i % 2 == 0 { "secret:layer" } else { "public:layer" };
        let url = proxy.url(&format!("/ows?SERVICE=WMS&REQUEST=GetMap&LAYERS={layer}"));
        handles.push(tokio::spawn(async move {
            let res = client.get(url).send().await.unwrap();
            (layer, res.status().as_u16())
        }));
    }

    for handle in handles {
        let (layer, status) = handle.await.unwrap();
        let expected = if layer == "secret:layer" { 403 } else { 200 };
        assert_eq!(status, expected, "{layer}");
    }

    println!("{} calls in {:?}", num_requests, start.elapsed());
    assert_eq!(backend.requests().len(), num_requests / 2);
}

#[tokio::test]
async fn test_rule_change_is_visible_to_next_call() {
    let backend = common::start_capturing_backend(200, "tile", Duration::ZERO).await;
    let proxy = common::start_proxy(common::config_for(backend.ows_url())).await;
    let client = common::client();
    let url = proxy.url("/ows?SERVICE=WMS&REQUEST=GetMap&LAYERS=topp:states");

    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);

    let rule = proxy
        .rules
        .create(NewRule::new(
            Direction::Request,
            RuleType::Deny,
            ServiceType::Wms,
            OperationType::GetMap,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(client.get(&url).send().await.unwrap().status(), 403);

    proxy.rules.delete(rule.id).await.unwrap();
    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);
}
