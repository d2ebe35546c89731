use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use super::AdminState;
use crate::ogc::{Direction, ParseEnumError, RuleType, ServiceType};
use crate::rules::{NewRule, Rule, RuleServiceError, StoreError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Rules(#[from] RuleServiceError),
    #[error(transparent)]
    BadValue(#[from] ParseEnumError),
    #[error("unknown scope '{0}', expected request, response or all")]
    BadScope(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Rules(RuleServiceError::Store(StoreError::NotFound(_))) => StatusCode::NOT_FOUND,
            AdminError::Rules(RuleServiceError::Store(StoreError::Conflict(_))) => StatusCode::CONFLICT,
            AdminError::Rules(RuleServiceError::Store(StoreError::Persistence(_))) => {
                tracing::error!(error = %self, "Rule persistence failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AdminError::Rules(RuleServiceError::Invalid(_)) | AdminError::BadValue(_) | AdminError::BadScope(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

type AdminResult<T> = Result<T, AdminError>;

#[derive(Serialize)]
pub struct Removed {
    pub endpoint: String,
    pub removed: usize,
}

pub async fn list_rules(State(state): State<AdminState>) -> AdminResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.list().await?))
}

pub async fn create_rule(
    State(state): State<AdminState>,
    Json(rule): Json<NewRule>,
) -> AdminResult<(StatusCode, Json<Rule>)> {
    let rule = state.rules.create(rule).await?;
    tracing::info!(id = rule.id, "Rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn get_rule(State(state): State<AdminState>, Path(id): Path<u64>) -> AdminResult<Json<Rule>> {
    Ok(Json(state.rules.get(id).await?))
}

pub async fn update_rule(
    State(state): State<AdminState>,
    Path(id): Path<u64>,
    Json(rule): Json<NewRule>,
) -> AdminResult<Json<Rule>> {
    let rule = state.rules.update(id, rule).await?;
    tracing::info!(id, "Rule updated");
    Ok(Json(rule))
}

pub async fn delete_rule(State(state): State<AdminState>, Path(id): Path<u64>) -> AdminResult<StatusCode> {
    state.rules.delete(id).await?;
    tracing::info!(id, "Rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rules_for_service_and_event(
    State(state): State<AdminState>,
    Path((service, event)): Path<(String, String)>,
) -> AdminResult<Json<Vec<Rule>>> {
    let service: ServiceType = service.parse()?;
    let direction: Direction = event.parse()?;
    Ok(Json(
        state
            .rules
            .find_all_rules_for_service_and_direction(service, direction)
            .await?,
    ))
}

pub async fn delete_rules_for_endpoint(
    State(state): State<AdminState>,
    Path(endpoint): Path<String>,
) -> AdminResult<Json<Removed>> {
    let removed = state.rules.remove_all_rules_for_endpoint(&endpoint).await?;
    Ok(Json(Removed { endpoint, removed }))
}

pub async fn add_rules_for_endpoint(
    State(state): State<AdminState>,
    Path((endpoint, scope, service, rule)): Path<(String, String, String, String)>,
) -> AdminResult<Json<Vec<Rule>>> {
    let service: ServiceType = service.parse()?;
    let rule_type: RuleType = rule.parse()?;
    let added = match scope.to_ascii_lowercase().as_str() {
        "request" => {
            state
                .rules
                .add_request_rules_for_endpoint(&endpoint, rule_type, service)
                .await?
        }
        "response" => {
            state
                .rules
                .add_response_rules_for_endpoint(&endpoint, rule_type, service)
                .await?
        }
        "all" => state.rules.add_rule_for_endpoint(&endpoint, rule_type, service).await?,
        _ => return Err(AdminError::BadScope(scope)),
    };
    Ok(Json(added))
}

pub async fn modify_all_wms(
    State(state): State<AdminState>,
    Path(endpoint): Path<String>,
) -> AdminResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.modify_all_wms_actions(&endpoint).await?))
}

pub async fn modify_all_wfs(
    State(state): State<AdminState>,
    Path(endpoint): Path<String>,
) -> AdminResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.modify_all_wfs_actions(&endpoint).await?))
}

pub async fn modify_all_wms_requests(
    State(state): State<AdminState>,
    Path(endpoint): Path<String>,
) -> AdminResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.modify_all_wms_requests(&endpoint).await?))
}

pub async fn modify_all_wfs_requests(
    State(state): State<AdminState>,
    Path(endpoint): Path<String>,
) -> AdminResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.modify_all_wfs_requests(&endpoint).await?))
}
