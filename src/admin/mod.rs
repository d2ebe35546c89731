//! Rule administration API.
//!
//! # Routes (under `/interceptorrules`)
//! ```text
//! GET    /                                           list
//! POST   /                                           create
//! GET    /{id}  PUT /{id}  DELETE /{id}              by id
//! GET    /service/{service}/event/{event}            by service + direction
//! DELETE /endpoint/{endpoint}                        remove all for endpoint
//! POST   /endpoint/{endpoint}/{scope}/{service}/{rule}   bulk add (request|response|all)
//! POST   /endpoint/{endpoint}/modifyAllWms           ...and the other modifyAll* shortcuts
//! ```
//!
//! Every route is gated by a [`PermissionEvaluator`].

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::rules::RuleService;

pub use auth::{ApiKeyEvaluator, PermissionEvaluator};

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub rules: RuleService,
}

pub fn router(rules: RuleService, evaluator: Arc<dyn PermissionEvaluator>) -> Router {
    Router::new()
        .route("/interceptorrules", get(list_rules).post(create_rule))
        .route(
            "/interceptorrules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route(
            "/interceptorrules/service/{service}/event/{event}",
            get(rules_for_service_and_event),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}",
            axum::routing::delete(delete_rules_for_endpoint),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}/modifyAllWms",
            post(modify_all_wms),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}/modifyAllWfs",
            post(modify_all_wfs),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}/modifyAllWmsRequests",
            post(modify_all_wms_requests),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}/modifyAllWfsRequests",
            post(modify_all_wfs_requests),
        )
        .route(
            "/interceptorrules/endpoint/{endpoint}/{scope}/{service}/{rule}",
            post(add_rules_for_endpoint),
        )
        .layer(middleware::from_fn_with_state(evaluator, admin_auth_middleware))
        .with_state(AdminState { rules })
}
