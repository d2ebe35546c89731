//! Interception rules.
//!
//! # Data Flow
//! ```text
//! admin API ──▶ RuleService (validate, bulk expand) ──▶ RuleStore (unique composite key)
//!                                                          │
//! pipeline ──▶ RuleService::find_rule ◀────────────────────┘
//! ```
//!
//! # Design Decisions
//! - A rule edit is visible to the very next call; nothing is cached above the store
//! - Endpoint match is exact and case-sensitive; blank endpoint means "all endpoints"

pub mod model;
pub mod service;
pub mod store;

pub use model::{NewRule, Rule, RuleError, RuleKey};
pub use service::{RuleService, RuleServiceError, RuleServiceResult};
pub use store::{MemoryRuleStore, RuleStore, StoreError, StoreResult};
