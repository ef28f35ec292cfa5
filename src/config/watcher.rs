//! Configuration hot-reload
//!
//! Watches the config file and reports which settings changed. Only the
//! long-poll wait budget can be applied to a running server; listener and
//! logging changes are reported so the operator knows a restart is needed.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::AppConfig;

/// Delay before re-reading a modified file, so partial writes settle
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// A reloaded configuration and what differs from the previous one
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub config: AppConfig,
    pub wait_budget_changed: bool,
    pub restart_required: bool,
}

impl ConfigChange {
    /// Compare a reloaded config against the running one.
    ///
    /// Returns None when nothing changed.
    pub fn between(old: &AppConfig, new: &AppConfig) -> Option<Self> {
        if old == new {
            return None;
        }

        Some(Self {
            wait_budget_changed: new.datastore.wait_budget_secs != old.datastore.wait_budget_secs,
            restart_required: new.server != old.server
                || new.logging != old.logging
                || new.datastore.seed != old.datastore.seed,
            config: new.clone(),
        })
    }
}

/// Watches a config file and yields a [`ConfigChange`] per effective edit
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
    current: AppConfig,
}

impl ConfigWatcher {
    /// Start watching `path`, comparing future edits against `current`
    pub fn new(path: impl Into<PathBuf>, current: AppConfig) -> Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("Config path has no file name: {}", path.display()))?;
        // Watch the directory: editors often replace the file instead of writing it
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel(8);
        // notify calls back on its own thread, outside the runtime
        let runtime = tokio::runtime::Handle::current();
        let reload_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                return;
            }

            debug!("Config file event: {:?}", event.kind);
            let path = reload_path.clone();
            let tx = tx.clone();
            runtime.spawn(async move {
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                match AppConfig::load(&path).await {
                    Ok(config) => {
                        let _ = tx.send(config).await;
                    }
                    Err(e) => warn!("Ignoring config reload: {:#}", e),
                }
            });
        })?;

        watcher
            .watch(Path::new(&dir), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        debug!("Watching {} for config changes", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            current,
        })
    }

    /// Wait for the next reload that actually changes something.
    ///
    /// Returns None once the watcher shuts down.
    pub async fn next_change(&mut self) -> Option<ConfigChange> {
        loop {
            let config = self.rx.recv().await?;
            if let Some(change) = ConfigChange::between(&self.current, &config) {
                self.current = config;
                return Some(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_wait_budget_change_applies_live() {
        let old = AppConfig::default();
        let mut new = old.clone();
        new.datastore.wait_budget_secs = 3;

        let change = ConfigChange::between(&old, &new).unwrap();
        assert!(change.wait_budget_changed);
        assert!(!change.restart_required);
        assert_eq!(change.config.datastore.wait_budget(), Duration::from_secs(3));
    }

    #[test]
    fn test_port_change_requires_restart() {
        let old = AppConfig::default();
        let mut new = old.clone();
        new.server.port = 1280;

        let change = ConfigChange::between(&old, &new).unwrap();
        assert!(!change.wait_budget_changed);
        assert!(change.restart_required);
    }

    #[test]
    fn test_logging_and_seed_changes_require_restart() {
        let old = AppConfig::default();

        let mut new = old.clone();
        new.logging.level = "debug".to_string();
        assert!(ConfigChange::between(&old, &new).unwrap().restart_required);

        let mut new = old.clone();
        new.datastore.seed = Some("datastore.json".into());
        assert!(ConfigChange::between(&old, &new).unwrap().restart_required);
    }

    #[test]
    fn test_identical_config_is_not_a_change() {
        let config = AppConfig::default();
        assert!(ConfigChange::between(&config, &config.clone()).is_none());
    }

    #[tokio::test]
    async fn test_watcher_starts_on_existing_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "datastore:\n  wait_budget_secs: 15\n")?;

        let initial = AppConfig::load(&config_path).await?;
        assert!(ConfigWatcher::new(config_path, initial).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_watcher_rejects_path_without_file_name() {
        assert!(ConfigWatcher::new("/", AppConfig::default()).is_err());
    }
}
