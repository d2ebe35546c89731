//! OGC domain model.
//!
//! # Data Flow
//! ```text
//! raw call (KVP or XML)
//!     → resolver (derive service / operation / endpoint)
//!     → OgcMessage
//!     → rule lookup, dispatch, upstream selection
//! ```

pub mod types;

pub use types::{infer_service, services_for, Direction, OperationType, ParseEnumError, RuleType, ServiceType};

use serde::Serialize;

/// What a single call targets, as derived by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OgcMessage {
    pub service: ServiceType,
    pub operation: OperationType,
    /// Qualified resource name (e.g. `topp:states`); `None` means service-wide.
    pub endpoint: Option<String>,
    /// Namespace URI bound to the endpoint prefix in the inspected element.
    pub endpoint_namespace: Option<String>,
    /// WMS reflector requested (`useReflect=true`).
    pub reflect: bool,
}

impl OgcMessage {
    pub fn new(service: ServiceType, operation: OperationType) -> Self {
        Self {
            service,
            operation,
            endpoint: None,
            endpoint_namespace: None,
            reflect: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = if endpoint.trim().is_empty() {
            None
        } else {
            Some(endpoint)
        };
        self
    }

    /// Namespace part of a qualified endpoint (`topp:states` → `topp`).
    pub fn endpoint_prefix(&self) -> Option<&str> {
        let endpoint = self.endpoint.as_deref()?;
        Some(endpoint.split_once(':').map(|(ns, _)| ns).unwrap_or(endpoint))
    }
}
