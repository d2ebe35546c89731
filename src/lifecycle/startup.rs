//! Startup orchestration.
//!
//! Fail fast: any startup error is fatal.

use std::sync::Arc;
use thiserror::Error;

use crate::config::InterceptorConfig;
use crate::dispatch::{DispatchError, DispatchTable};
use crate::http::HttpServer;
use crate::rules::{MemoryRuleStore, RuleService, RuleStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open rule store: {0}")]
    Store(#[from] StoreError),
    #[error("invalid handler configuration: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Everything `main` needs to start serving.
pub struct Bootstrapped {
    pub server: HttpServer,
    pub rules: RuleService,
}

/// Opens the rule store, builds the dispatch table and the HTTP server.
pub fn bootstrap(config: InterceptorConfig) -> Result<Bootstrapped, StartupError> {
    let store: Arc<dyn RuleStore> = match &config.rules.persistence_path {
        Some(path) => Arc::new(MemoryRuleStore::open(path)?),
        None => Arc::new(MemoryRuleStore::new()),
    };
    let rules = RuleService::new(store);

    let dispatch = DispatchTable::from_config(&config.handlers)?;
    tracing::info!(
        handlers = dispatch.len(),
        persistence = ?config.rules.persistence_path,
        "Interceptor initialized"
    );

    let server = HttpServer::new(config, rules.clone(), dispatch);
    Ok(Bootstrapped { server, rules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionConfig, HandlerConfig};
    use crate::ogc::{Direction, OperationType, ServiceType};

    #[tokio::test]
    async fn test_bootstrap_with_persisted_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = InterceptorConfig::default();
        config.rules.persistence_path = Some(dir.path().join("rules.json").display().to_string());

        let boot = bootstrap(config).unwrap();
        assert!(boot.rules.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_bootstrap_rejects_bad_handler() {
        let mut config = InterceptorConfig::default();
        config.handlers.push(HandlerConfig {
            service: ServiceType::Wcs,
            direction: Direction::Request,
            operation: OperationType::GetMap,
            actions: vec![ActionConfig::RemoveParam { name: "x".into() }],
        });
        assert!(matches!(bootstrap(config), Err(StartupError::Dispatch(_))));
    }
}
