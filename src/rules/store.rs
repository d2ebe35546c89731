//! Rule persistence.
//!
//! # Responsibilities
//! - Define the `RuleStore` contract used by the rule service
//! - Provide an in-memory store with optional JSON file persistence
//!
//! # Design Decisions
//! - Composite-key uniqueness is enforced by the store through a key index,
//!   claimed with the dashmap entry API so concurrent inserts cannot both win
//! - The whole rule set is rewritten after every mutation (rules change rarely),
//!   off the async workers
//! - A mutation whose save fails is undone in memory before the error is returned
//! - Reads go straight to the maps; there is no cache to invalidate

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::model::{NewRule, Rule, RuleKey};
use crate::observability::metrics;
use crate::ogc::{Direction, ServiceType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule {0} not found")]
    NotFound(u64),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Rule>>;
    async fn get(&self, id: u64) -> StoreResult<Rule>;
    /// Fails with `Conflict` if the composite key is taken.
    async fn insert(&self, rule: NewRule) -> StoreResult<Rule>;
    async fn update(&self, id: u64, rule: NewRule) -> StoreResult<Rule>;
    async fn delete(&self, id: u64) -> StoreResult<()>;
    /// Deletes the given ids, ignoring unknown ones. Returns how many were removed.
    async fn delete_many(&self, ids: &[u64]) -> StoreResult<usize>;

    async fn find_by_service_and_direction(
        &self,
        service: ServiceType,
        direction: Direction,
    ) -> StoreResult<Vec<Rule>>;
    async fn find_by_endpoint(&self, endpoint: &str) -> StoreResult<Vec<Rule>>;
    async fn find_by_key(&self, key: &RuleKey) -> StoreResult<Option<Rule>>;
}

/// Concurrent in-memory rule store.
#[derive(Clone)]
pub struct MemoryRuleStore {
    rules: Arc<DashMap<u64, Rule>>,
    index: Arc<DashMap<RuleKey, u64>>,
    next_id: Arc<AtomicU64>,
    persistence_path: Option<PathBuf>,
    save_lock: Arc<Mutex<()>>,
}

impl MemoryRuleStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            index: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            persistence_path: None,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a store backed by `path`, loading existing rules if the file exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let mut store = Self::new();
        store.persistence_path = Some(path.to_path_buf());

        if path.exists() {
            let file = File::open(path).map_err(|e| StoreError::Persistence(e.to_string()))?;
            let rules: Vec<Rule> = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StoreError::Persistence(e.to_string()))?;

            let mut max_id = 0;
            for rule in rules {
                max_id = max_id.max(rule.id);
                match store.index.entry(rule.key()) {
                    Entry::Occupied(_) => {
                        tracing::warn!(id = rule.id, "Skipping duplicate rule in rule file");
                        continue;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(rule.id);
                    }
                }
                store.rules.insert(rule.id, rule);
            }
            store.next_id.store(max_id + 1, Ordering::SeqCst);
            metrics::record_rule_count(store.rules.len());
            tracing::info!(path = %path.display(), count = store.rules.len(), "Loaded rules from file");
        }
        Ok(store)
    }

    async fn save(&self) -> StoreResult<()> {
        metrics::record_rule_count(self.rules.len());
        let Some(path) = self.persistence_path.clone() else {
            return Ok(());
        };
        // snapshots are taken and written in lock order, so the file never goes back in time
        let _guard = self.save_lock.lock().await;

        let mut rules: Vec<Rule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by_key(|r| r.id);
        let count = rules.len();

        let written = tokio::task::spawn_blocking(move || write_rules(&path, &rules).map(|()| path))
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))??;

        tracing::debug!(path = %written.display(), count, "Saved rules to file");
        Ok(())
    }

    /// Puts `rule` back under its id and key.
    fn restore(&self, rule: Rule) {
        self.index.insert(rule.key(), rule.id);
        self.rules.insert(rule.id, rule);
    }

    fn collect<F>(&self, filter: F) -> Vec<Rule>
    where
        F: Fn(&Rule) -> bool,
    {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    fn remove(&self, id: u64) -> Option<Rule> {
        let (_, rule) = self.rules.remove(&id)?;
        self.index.remove_if(&rule.key(), |_, owner| *owner == id);
        Some(rule)
    }
}

fn write_rules(path: &Path, rules: &[Rule]) -> StoreResult<()> {
    let persistence = |e: std::io::Error| StoreError::Persistence(e.to_string());
    let tmp = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp).map_err(persistence)?);
    serde_json::to_writer_pretty(&mut writer, rules).map_err(|e| StoreError::Persistence(e.to_string()))?;
    writer.flush().map_err(persistence)?;
    std::fs::rename(&tmp, path).map_err(persistence)
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list(&self) -> StoreResult<Vec<Rule>> {
        Ok(self.collect(|_| true))
    }

    async fn get(&self, id: u64) -> StoreResult<Rule> {
        self.rules
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn insert(&self, rule: NewRule) -> StoreResult<Rule> {
        let key = rule.key();
        let stored = match self.index.entry(key) {
            Entry::Occupied(existing) => {
                return Err(StoreError::Conflict(format!(
                    "an identical rule already exists (id {})",
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let stored = rule.into_rule(id);
                self.rules.insert(id, stored.clone());
                slot.insert(id);
                stored
            }
        };
        if let Err(e) = self.save().await {
            self.remove(stored.id);
            return Err(e);
        }
        Ok(stored)
    }

    async fn update(&self, id: u64, rule: NewRule) -> StoreResult<Rule> {
        let previous = self.get(id).await?;
        let old_key = previous.key();
        let new_key = rule.key();

        if new_key != old_key {
            match self.index.entry(new_key) {
                Entry::Occupied(existing) if *existing.get() != id => {
                    return Err(StoreError::Conflict(format!(
                        "an identical rule already exists (id {})",
                        existing.get()
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            self.index.remove_if(&old_key, |_, owner| *owner == id);
        }

        let stored = rule.into_rule(id);
        self.rules.insert(id, stored.clone());
        if let Err(e) = self.save().await {
            self.remove(id);
            self.restore(previous);
            return Err(e);
        }
        Ok(stored)
    }

    async fn delete(&self, id: u64) -> StoreResult<()> {
        let removed = self.remove(id).ok_or(StoreError::NotFound(id))?;
        if let Err(e) = self.save().await {
            self.restore(removed);
            return Err(e);
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[u64]) -> StoreResult<usize> {
        let removed: Vec<Rule> = ids.iter().filter_map(|id| self.remove(*id)).collect();
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.save().await {
            for rule in removed {
                self.restore(rule);
            }
            return Err(e);
        }
        Ok(removed.len())
    }

    async fn find_by_service_and_direction(
        &self,
        service: ServiceType,
        direction: Direction,
    ) -> StoreResult<Vec<Rule>> {
        Ok(self.collect(|r| r.service == service && r.direction == direction))
    }

    async fn find_by_endpoint(&self, endpoint: &str) -> StoreResult<Vec<Rule>> {
        Ok(self.collect(|r| r.endpoint.as_deref() == Some(endpoint)))
    }

    async fn find_by_key(&self, key: &RuleKey) -> StoreResult<Option<Rule>> {
        let Some(id) = self.index.get(key).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.rules.get(&id).map(|r| r.value().clone()))
    }
}
