//! Rule matching and bulk administration.

use std::sync::Arc;

use super::model::{normalize_endpoint, NewRule, Rule, RuleError, RuleKey};
use super::store::{RuleStore, StoreError};
use crate::ogc::{Direction, OperationType, RuleType, ServiceType};

#[derive(Debug, thiserror::Error)]
pub enum RuleServiceError {
    #[error(transparent)]
    Invalid(#[from] RuleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RuleServiceResult<T> = Result<T, RuleServiceError>;

/// Rule CRUD, lookup and bulk operations over a [`RuleStore`].
#[derive(Clone)]
pub struct RuleService {
    store: Arc<dyn RuleStore>,
}

impl RuleService {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> RuleServiceResult<Vec<Rule>> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: u64) -> RuleServiceResult<Rule> {
        Ok(self.store.get(id).await?)
    }

    /// Strict create: an existing identical rule is a conflict.
    pub async fn create(&self, rule: NewRule) -> RuleServiceResult<Rule> {
        Ok(self.store.insert(rule.validated()?).await?)
    }

    pub async fn update(&self, id: u64, rule: NewRule) -> RuleServiceResult<Rule> {
        Ok(self.store.update(id, rule.validated()?).await?)
    }

    pub async fn delete(&self, id: u64) -> RuleServiceResult<()> {
        Ok(self.store.delete(id).await?)
    }

    /// The rule governing one call leg.
    ///
    /// Endpoint-specific rules win over wildcard rules; between rule types of
    /// the same specificity DENY beats MODIFY beats ALLOW.
    pub async fn find_rule(
        &self,
        direction: Direction,
        service: ServiceType,
        operation: OperationType,
        endpoint: Option<&str>,
    ) -> RuleServiceResult<Option<Rule>> {
        let endpoint = normalize_endpoint(endpoint);
        let mut scopes = Vec::with_capacity(2);
        if endpoint.is_some() {
            scopes.push(endpoint);
        }
        scopes.push(None);

        for scope in scopes {
            let mut best: Option<Rule> = None;
            for rule_type in RuleType::ALL {
                let key = RuleKey {
                    direction,
                    rule_type: *rule_type,
                    service,
                    operation,
                    endpoint: scope.clone(),
                };
                if let Some(rule) = self.store.find_by_key(&key).await? {
                    if best
                        .as_ref()
                        .map_or(true, |b| rule.rule_type.precedence() > b.rule_type.precedence())
                    {
                        best = Some(rule);
                    }
                }
            }
            if best.is_some() {
                return Ok(best);
            }
        }
        Ok(None)
    }

    pub async fn find_all_rules_for_service_and_direction(
        &self,
        service: ServiceType,
        direction: Direction,
    ) -> RuleServiceResult<Vec<Rule>> {
        Ok(self.store.find_by_service_and_direction(service, direction).await?)
    }

    /// Deletes every rule for `endpoint`, whatever its service, operation or direction.
    pub async fn remove_all_rules_for_endpoint(&self, endpoint: &str) -> RuleServiceResult<usize> {
        let ids: Vec<u64> = self
            .store
            .find_by_endpoint(endpoint)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_many(&ids).await?;
        tracing::info!(endpoint = %endpoint, removed, "Removed rules for endpoint");
        Ok(removed)
    }

    /// Idempotent add: returns the stored rule with the same composite key if one exists.
    pub async fn add_rule(&self, rule: NewRule) -> RuleServiceResult<Rule> {
        let rule = rule.validated()?;
        let key = rule.key();
        if let Some(existing) = self.store.find_by_key(&key).await? {
            return Ok(existing);
        }
        match self.store.insert(rule).await {
            Ok(stored) => Ok(stored),
            // lost a race against an identical insert
            Err(StoreError::Conflict(_)) => self
                .store
                .find_by_key(&key)
                .await?
                .ok_or_else(|| StoreError::Conflict("rule vanished during insert".into()).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_rules_for_directions(
        &self,
        endpoint: &str,
        rule_type: RuleType,
        service: ServiceType,
        directions: &[Direction],
    ) -> RuleServiceResult<Vec<Rule>> {
        let mut added = Vec::new();
        for direction in directions {
            for operation in service.operations() {
                let rule = NewRule::new(*direction, rule_type, service, *operation, Some(endpoint));
                added.push(self.add_rule(rule).await?);
            }
        }
        tracing::info!(
            endpoint = %endpoint,
            rule_type = %rule_type,
            service = %service,
            count = added.len(),
            "Added rules for endpoint"
        );
        Ok(added)
    }

    /// One REQUEST rule per operation of `service`.
    pub async fn add_request_rules_for_endpoint(
        &self,
        endpoint: &str,
        rule_type: RuleType,
        service: ServiceType,
    ) -> RuleServiceResult<Vec<Rule>> {
        self.add_rules_for_directions(endpoint, rule_type, service, &[Direction::Request])
            .await
    }

    /// One RESPONSE rule per operation of `service`.
    pub async fn add_response_rules_for_endpoint(
        &self,
        endpoint: &str,
        rule_type: RuleType,
        service: ServiceType,
    ) -> RuleServiceResult<Vec<Rule>> {
        self.add_rules_for_directions(endpoint, rule_type, service, &[Direction::Response])
            .await
    }

    /// One REQUEST and one RESPONSE rule per operation of `service`.
    pub async fn add_rule_for_endpoint(
        &self,
        endpoint: &str,
        rule_type: RuleType,
        service: ServiceType,
    ) -> RuleServiceResult<Vec<Rule>> {
        self.add_rules_for_directions(
            endpoint,
            rule_type,
            service,
            &[Direction::Request, Direction::Response],
        )
        .await
    }

    pub async fn modify_all_wms_actions(&self, endpoint: &str) -> RuleServiceResult<Vec<Rule>> {
        self.add_rule_for_endpoint(endpoint, RuleType::Modify, ServiceType::Wms)
            .await
    }

    pub async fn modify_all_wfs_actions(&self, endpoint: &str) -> RuleServiceResult<Vec<Rule>> {
        self.add_rule_for_endpoint(endpoint, RuleType::Modify, ServiceType::Wfs)
            .await
    }

    pub async fn modify_all_wms_requests(&self, endpoint: &str) -> RuleServiceResult<Vec<Rule>> {
        self.add_request_rules_for_endpoint(endpoint, RuleType::Modify, ServiceType::Wms)
            .await
    }

    pub async fn modify_all_wfs_requests(&self, endpoint: &str) -> RuleServiceResult<Vec<Rule>> {
        self.add_request_rules_for_endpoint(endpoint, RuleType::Modify, ServiceType::Wfs)
            .await
    }
}
