//! The interception pipeline.
//!
//! # Data Flow
//! ```text
//! request Envelope
//!     → resolver (service / operation / endpoint, or pass-through)
//!     → REQUEST rule: ALLOW → as-is | DENY → 403 | MODIFY → dispatch
//!     → upstream
//!     → RESPONSE rule: ALLOW → as-is | DENY → 403 | MODIFY → dispatch
//!     → response Envelope
//! ```
//!
//! # Design Decisions
//! - Calls that name no known (service, operation) are forwarded untouched
//! - A missing rule behaves like ALLOW
//! - A denied request never reaches the backend

use std::sync::Arc;

use crate::dispatch::DispatchTable;
use crate::envelope::Envelope;
use crate::error::InterceptorError;
use crate::observability::metrics;
use crate::ogc::{Direction, OgcMessage, RuleType};
use crate::resolver;
use crate::rules::RuleService;
use crate::upstream::Upstream;

/// Resolve, apply rules, forward.
pub struct Pipeline {
    rules: RuleService,
    dispatch: Arc<DispatchTable>,
    upstream: Arc<dyn Upstream>,
}

impl Pipeline {
    pub fn new(rules: RuleService, dispatch: Arc<DispatchTable>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            rules,
            dispatch,
            upstream,
        }
    }

    pub fn rules(&self) -> &RuleService {
        &self.rules
    }

    /// Runs one call through the interceptor.
    pub async fn handle(&self, mut request: Envelope) -> Result<Envelope, InterceptorError> {
        let message = match resolver::resolve(&mut request).await {
            Ok(message) => Some(message),
            Err(e) if e.is_pass_through() => {
                tracing::debug!(reason = %e, "Not an interceptable OGC call, passing through");
                None
            }
            Err(e) => {
                metrics::record_request(None, "rejected");
                return Err(e.into());
            }
        };

        let result = self.intercept(message.as_ref(), request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(InterceptorError::Denied { .. }) => "denied",
            Err(InterceptorError::Forward(_)) => "upstream_error",
            Err(_) => "error",
        };
        metrics::record_request(message.as_ref(), outcome);
        result
    }

    async fn intercept(&self, message: Option<&OgcMessage>, request: Envelope) -> Result<Envelope, InterceptorError> {
        let Some(message) = message else {
            return Ok(self.upstream.forward(None, request).await?);
        };

        tracing::debug!(
            service = %message.service,
            operation = %message.operation,
            endpoint = ?message.endpoint,
            "Resolved OGC call"
        );

        let request = self.apply(Direction::Request, message, request).await?;
        let response = self.upstream.forward(Some(message), request).await?;
        self.apply(Direction::Response, message, response).await
    }

    /// Applies the governing rule for one leg of the call.
    async fn apply(
        &self,
        direction: Direction,
        message: &OgcMessage,
        envelope: Envelope,
    ) -> Result<Envelope, InterceptorError> {
        let rule = self
            .rules
            .find_rule(direction, message.service, message.operation, message.endpoint.as_deref())
            .await?;
        let rule_type = rule.map_or(RuleType::Allow, |r| r.rule_type);
        metrics::record_rule_applied(direction, rule_type);

        match rule_type {
            RuleType::Allow => Ok(envelope),
            RuleType::Deny => {
                tracing::info!(
                    %direction,
                    service = %message.service,
                    operation = %message.operation,
                    endpoint = ?message.endpoint,
                    "Call denied by rule"
                );
                Err(InterceptorError::Denied {
                    direction,
                    service: message.service,
                    operation: message.operation,
                    endpoint: message.endpoint.clone(),
                })
            }
            RuleType::Modify => Ok(self.dispatch.dispatch(direction, message, envelope).await?),
        }
    }
}
