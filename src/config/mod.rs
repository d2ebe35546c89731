//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → InterceptorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the upstream section (ArcSwap)
//!     → the next forwarded call uses the new backend settings
//! ```
//!
//! # Design Decisions
//! - Only the upstream section is hot-reloadable; listener, rules and handlers need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ActionConfig, AdminConfig, HandlerConfig, InterceptorConfig, ListenerConfig, NamespaceConfig,
    ObservabilityConfig, RulesConfig, TimeoutConfig, UpstreamConfig,
};
pub use watcher::ConfigWatcher;
