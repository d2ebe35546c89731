//! Configuration file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::InterceptorConfig;

/// Sections that only take effect after a restart.
fn restart_required(current: &InterceptorConfig, new: &InterceptorConfig) -> Vec<&'static str> {
    let mut sections = Vec::new();
    if current.listener != new.listener {
        sections.push("listener");
    }
    if current.timeouts != new.timeouts {
        sections.push("timeouts");
    }
    if current.rules != new.rules {
        sections.push("rules");
    }
    if current.admin != new.admin {
        sections.push("admin");
    }
    if current.observability != new.observability {
        sections.push("observability");
    }
    if current.handlers != new.handlers {
        sections.push("handlers");
    }
    sections
}

/// Whether `new` must be published: only upstream changes are applied live.
fn should_publish(current: &InterceptorConfig, new: &InterceptorConfig) -> bool {
    let ignored = restart_required(current, new);
    if !ignored.is_empty() {
        tracing::warn!(sections = ?ignored, "Changed config sections need a restart to take effect");
    }
    current.upstream != new.upstream
}

/// Monitors the configuration file and publishes upstream changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: InterceptorConfig,
    update_tx: mpsc::UnboundedSender<InterceptorConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path, current: InterceptorConfig) -> (Self, mpsc::UnboundedReceiver<InterceptorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => match load_config(&path) {
                    Ok(new_config) => {
                        if should_publish(&current, &new_config) {
                            tracing::info!(path = %path.display(), "Upstream configuration changed, reloading");
                            current = new_config.clone();
                            let _ = update_tx.send(new_config);
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %watched.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_upstream_changes_are_published() {
        let current = InterceptorConfig::default();

        let mut same_upstream = current.clone();
        same_upstream.listener.bind_address = "127.0.0.1:9999".into();
        assert_eq!(restart_required(&current, &same_upstream), vec!["listener"]);
        assert!(!should_publish(&current, &same_upstream));

        let mut new_upstream = current.clone();
        new_upstream.upstream.default_ows_url = Some("http://other:8080/geoserver/ows".into());
        assert!(restart_required(&current, &new_upstream).is_empty());
        assert!(should_publish(&current, &new_upstream));
    }

    #[tokio::test]
    async fn test_file_change_publishes_new_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interceptor.toml");
        std::fs::write(&path, "[upstream]\ndefault_ows_url = \"http://a:8080/geoserver/ows\"\n").unwrap();
        let current = load_config(&path).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path, current);
        let _guard = watcher.run().unwrap();

        std::fs::write(&path, "[upstream]\ndefault_ows_url = \"http://b:8080/geoserver/ows\"\n").unwrap();
        // a truncating write may surface an intermediate (empty) file first
        let reloaded = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(update) = updates.recv().await {
                if update.upstream.default_ows_url.as_deref() == Some("http://b:8080/geoserver/ows") {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(reloaded);
    }
}
