//! Handler dispatch table.
//!
//! # Data Flow
//! ```text
//! MODIFY rule matched for (service, direction, operation)
//!     → DispatchTable lookup
//!     → Handler::handle(message, envelope) → rewritten envelope
//!     → (no handler registered) → envelope unchanged
//! ```
//!
//! # Design Decisions
//! - One table keyed by (service, direction, operation) instead of a trait per service
//! - Registration rejects operations outside the service's fixed operation set
//! - Several configured actions for one key are chained in declaration order

pub mod handlers;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::config::HandlerConfig;
use crate::envelope::{Envelope, EnvelopeError};
use crate::ogc::{Direction, OgcMessage, OperationType, ServiceType};

pub use handlers::Chain;

/// Failure inside a handler. Ends the call.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("handler failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("operation {operation} is not part of service {service}")]
    OperationNotInService {
        service: ServiceType,
        operation: OperationType,
    },

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

/// Transforms one envelope of an intercepted call.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: &OgcMessage, envelope: Envelope) -> Result<Envelope, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

/// Wraps `f` as a handler. The closure receives its own copy of the message.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(OgcMessage, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope, HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(OgcMessage, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope, HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: &OgcMessage, envelope: Envelope) -> Result<Envelope, HandlerError> {
        (self.0)(message.clone(), envelope).await
    }
}

type DispatchKey = (ServiceType, Direction, OperationType);

/// (service, direction, operation) → handler.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<DispatchKey, Arc<dyn Handler>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from configured actions.
    pub fn from_config(configs: &[HandlerConfig]) -> Result<Self, DispatchError> {
        let mut grouped: Vec<(DispatchKey, Vec<Arc<dyn Handler>>)> = Vec::new();
        for config in configs {
            let key = (config.service, config.direction, config.operation);
            let built = config
                .actions
                .iter()
                .map(handlers::from_action)
                .collect::<Result<Vec<_>, _>>()?;
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => existing.extend(built),
                None => grouped.push((key, built)),
            }
        }

        let mut table = Self::new();
        for ((service, direction, operation), mut chain) in grouped {
            let handler: Arc<dyn Handler> = if chain.len() == 1 {
                chain.remove(0)
            } else {
                Arc::new(Chain::new(chain))
            };
            table.register(service, direction, operation, handler)?;
        }
        Ok(table)
    }

    /// Registers `handler`, replacing any previous one for the same key.
    pub fn register(
        &mut self,
        service: ServiceType,
        direction: Direction,
        operation: OperationType,
        handler: Arc<dyn Handler>,
    ) -> Result<(), DispatchError> {
        if !service.supports(operation) {
            return Err(DispatchError::OperationNotInService { service, operation });
        }
        if self.handlers.insert((service, direction, operation), handler).is_some() {
            tracing::warn!(%service, %direction, %operation, "Replaced existing handler");
        }
        Ok(())
    }

    pub fn get(&self, service: ServiceType, direction: Direction, operation: OperationType) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&(service, direction, operation))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for the message's key, or returns the envelope untouched.
    pub async fn dispatch(
        &self,
        direction: Direction,
        message: &OgcMessage,
        envelope: Envelope,
    ) -> Result<Envelope, HandlerError> {
        match self.get(message.service, direction, message.operation) {
            Some(handler) => handler.handle(message, envelope).await,
            None => {
                tracing::debug!(
                    service = %message.service,
                    %direction,
                    operation = %message.operation,
                    "No handler registered, passing through"
                );
                Ok(envelope)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn envelope() -> Envelope {
        Envelope::from_request(Request::builder().uri("/ows?a=1").body(Body::empty()).unwrap(), 1024)
    }

    #[test]
    fn test_register_validates_operation() {
        let mut table = DispatchTable::new();
        let noop = Arc::new(handler_fn(|_, env| async move { Ok(env) }));
        let err = table
            .register(ServiceType::Wcs, Direction::Request, OperationType::GetMap, noop.clone())
            .unwrap_err();
        assert!(matches!(err, DispatchError::OperationNotInService { .. }));
        table
            .register(ServiceType::Wms, Direction::Request, OperationType::GetMap, noop)
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_invokes_matching_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut table = DispatchTable::new();
        table
            .register(
                ServiceType::Wfs,
                Direction::Response,
                OperationType::GetFeature,
                Arc::new(handler_fn(move |_, env| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(env) }
                })),
            )
            .unwrap();

        let message = OgcMessage::new(ServiceType::Wfs, OperationType::GetFeature);
        table.dispatch(Direction::Response, &message, envelope()).await.unwrap();
        table.dispatch(Direction::Request, &message, envelope()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_config_chains_actions_in_order() {
        let configs = vec![
            HandlerConfig {
                service: ServiceType::Wms,
                direction: Direction::Request,
                operation: OperationType::GetMap,
                actions: vec![ActionConfig::SetParam {
                    name: "a".into(),
                    value: "2".into(),
                }],
            },
            HandlerConfig {
                service: ServiceType::Wms,
                direction: Direction::Request,
                operation: OperationType::GetMap,
                actions: vec![ActionConfig::SetParam {
                    name: "A".into(),
                    value: "3".into(),
                }],
            },
        ];
        let table = DispatchTable::from_config(&configs).unwrap();
        assert_eq!(table.len(), 1);

        let message = OgcMessage::new(ServiceType::Wms, OperationType::GetMap);
        let env = table.dispatch(Direction::Request, &message, envelope()).await.unwrap();
        assert_eq!(env.uri().unwrap().query(), Some("a=3"));
    }
}
