//! Rule records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ogc::{Direction, OperationType, RuleType, ServiceType};

/// A stored interception rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: u64,
    pub direction: Direction,
    pub rule_type: RuleType,
    pub service: ServiceType,
    pub operation: OperationType,
    /// `None` applies to every endpoint of the service/operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Rule contents without identity, as submitted by the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub direction: Direction,
    pub rule_type: RuleType,
    pub service: ServiceType,
    pub operation: OperationType,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Composite uniqueness key: (direction, rule type, service, operation, endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub direction: Direction,
    pub rule_type: RuleType,
    pub service: ServiceType,
    pub operation: OperationType,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("operation {operation} is not part of service {service}")]
    OperationNotInService {
        service: ServiceType,
        operation: OperationType,
    },
}

/// Blank endpoints mean "all endpoints".
pub fn normalize_endpoint(endpoint: Option<&str>) -> Option<String> {
    endpoint
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

impl NewRule {
    pub fn new(
        direction: Direction,
        rule_type: RuleType,
        service: ServiceType,
        operation: OperationType,
        endpoint: Option<&str>,
    ) -> Self {
        Self {
            direction,
            rule_type,
            service,
            operation,
            endpoint: normalize_endpoint(endpoint),
        }
    }

    /// Normalizes the endpoint and checks the operation against the service.
    pub fn validated(mut self) -> Result<Self, RuleError> {
        if !self.service.supports(self.operation) {
            return Err(RuleError::OperationNotInService {
                service: self.service,
                operation: self.operation,
            });
        }
        self.endpoint = normalize_endpoint(self.endpoint.as_deref());
        Ok(self)
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            direction: self.direction,
            rule_type: self.rule_type,
            service: self.service,
            operation: self.operation,
            endpoint: normalize_endpoint(self.endpoint.as_deref()),
        }
    }

    pub fn into_rule(self, id: u64) -> Rule {
        Rule {
            id,
            direction: self.direction,
            rule_type: self.rule_type,
            service: self.service,
            operation: self.operation,
            endpoint: normalize_endpoint(self.endpoint.as_deref()),
        }
    }
}

impl Rule {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            direction: self.direction,
            rule_type: self.rule_type,
            service: self.service,
            operation: self.operation,
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_endpoint_is_wildcard() {
        let rule = NewRule::new(Direction::Request, RuleType::Modify, ServiceType::Wms, OperationType::GetMap, Some("  "));
        assert_eq!(rule.endpoint, None);
        assert_eq!(rule.key().endpoint, None);
    }

    #[test]
    fn test_validated_rejects_foreign_operation() {
        let rule = NewRule::new(Direction::Request, RuleType::Modify, ServiceType::Wms, OperationType::Transaction, None);
        assert!(rule.validated().is_err());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"direction":"request","ruleType":"modify","service":"wfs","operation":"GetFeature","endpoint":""}"#;
        let rule: NewRule = serde_json::from_str(json).unwrap();
        let rule = rule.validated().unwrap();
        assert_eq!(rule.endpoint, None);
        let out = serde_json::to_value(rule.into_rule(7)).unwrap();
        assert_eq!(out["ruleType"], "MODIFY");
        assert!(out.get("endpoint").is_none());
    }
}
