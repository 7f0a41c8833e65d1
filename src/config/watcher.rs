//! Hot reload of the configuration file.
//!
//! # Data Flow
//! ```text
//! notify event (parent dir) ──► filter by file name ──► signal
//!                                                         │
//!        debounce window (bursts collapse into one reload) ◄┘
//!                │
//!                ▼
//!   read ──► unchanged? skip ──► parse + validate ──► mpsc::Sender<SentinelConfig>
//! ```
//!
//! # Design Decisions
//! - The parent directory is watched so editors that save by rename are seen
//! - Invalid files are logged and dropped; the running config stays in place

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::loader::parse_config;
use crate::config::schema::SentinelConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches one configuration file and emits validated reloads.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Quiet period a burst of file events must settle for before reloading.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching until `cancel` fires.
    ///
    /// The returned [`RecommendedWatcher`] must be kept alive; dropping it
    /// ends the event feed and with it the reload task.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> Result<(RecommendedWatcher, mpsc::Receiver<SentinelConfig>, JoinHandle<()>), notify::Error>
    {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::channel(1);

        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = (event.kind.is_modify() || event.kind.is_create())
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant && signal_tx.send(()).is_err() {
                    tracing::debug!("Config reload task gone, dropping file event");
                }
            }
            Err(e) => tracing::error!(error = %e, "Config watch error"),
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");

        let handle = tokio::spawn(reload_loop(
            self.path,
            self.debounce,
            signal_rx,
            update_tx,
            cancel,
        ));
        Ok((watcher, update_rx, handle))
    }
}

/// Turn change signals into validated configs, one per settled burst.
async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut signals: mpsc::UnboundedReceiver<()>,
    updates: mpsc::Sender<SentinelConfig>,
    cancel: CancellationToken,
) {
    let mut last_content = tokio::fs::read_to_string(&path).await.ok();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            signal = signals.recv() => {
                if signal.is_none() {
                    break;
                }
            }
        }

        // Swallow follow-up events until the file has been quiet for `debounce`
        loop {
            match tokio::time::timeout(debounce, signals.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => break,
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config file unreadable, keeping current configuration");
                continue;
            }
        };
        if last_content.as_deref() == Some(content.as_str()) {
            tracing::debug!(path = %path.display(), "Config file unchanged");
            continue;
        }

        match parse_config(&content) {
            Ok(config) => {
                last_content = Some(content);
                tracing::info!(
                    path = %path.display(),
                    services = config.services.len(),
                    providers = config.providers.len(),
                    "Config reload accepted"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = updates.send(config) => if sent.is_err() {
                        tracing::warn!("Config reload receiver dropped, stopping watcher");
                        break;
                    },
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Config reload rejected, keeping current configuration");
            }
        }
    }

    tracing::debug!(path = %path.display(), "Config reload task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SERVICE: &str = r#"
[[services]]
name = "llm-engine"
target = "http://127.0.0.1:11434/health"
"#;

    const TWO_SERVICES: &str = r#"
[[services]]
name = "llm-engine"
target = "http://127.0.0.1:11434/health"

[[services]]
name = "tts-engine"
target = "http://127.0.0.1:5002/health"
"#;

    struct Harness {
        _dir: tempfile::TempDir,
        path: PathBuf,
        signals: mpsc::UnboundedSender<()>,
        updates: mpsc::Receiver<SentinelConfig>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    async fn harness(initial: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.toml");
        std::fs::write(&path, initial).unwrap();

        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (update_tx, updates) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reload_loop(
            path.clone(),
            Duration::from_millis(50),
            signal_rx,
            update_tx,
            cancel.clone(),
        ));
        // Let the task read the initial contents
        tokio::time::sleep(Duration::from_millis(50)).await;

        Harness {
            _dir: dir,
            path,
            signals,
            updates,
            cancel,
            task,
        }
    }

    async fn next_update(updates: &mut mpsc::Receiver<SentinelConfig>) -> Option<SentinelConfig> {
        tokio::time::timeout(Duration::from_millis(500), updates.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_burst_of_events_yields_one_reload() {
        let mut h = harness(ONE_SERVICE).await;

        std::fs::write(&h.path, TWO_SERVICES).unwrap();
        for _ in 0..5 {
            h.signals.send(()).unwrap();
        }

        let config = next_update(&mut h.updates).await.expect("reload");
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].name, "tts-engine");
        assert!(next_update(&mut h.updates).await.is_none());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_and_invalid_files_are_not_emitted() {
        let mut h = harness(ONE_SERVICE).await;

        // Touch without changes
        h.signals.send(()).unwrap();
        assert!(next_update(&mut h.updates).await.is_none());

        // Duplicate service names fail validation
        let invalid = format!("{}{}", ONE_SERVICE, ONE_SERVICE);
        std::fs::write(&h.path, invalid).unwrap();
        h.signals.send(()).unwrap();
        assert!(next_update(&mut h.updates).await.is_none());

        // A later valid edit still goes through
        std::fs::write(&h.path, TWO_SERVICES).unwrap();
        h.signals.send(()).unwrap();
        assert_eq!(next_update(&mut h.updates).await.unwrap().services.len(), 2);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let h = harness(ONE_SERVICE).await;
        drop(h.updates);

        std::fs::write(&h.path, TWO_SERVICES).unwrap();
        h.signals.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .expect("task exits")
            .unwrap();
    }

    #[tokio::test]
    async fn test_file_rewrite_delivers_validated_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.toml");
        std::fs::write(&path, ONE_SERVICE).unwrap();

        let cancel = CancellationToken::new();
        let (_watcher, mut updates, task) = ConfigWatcher::new(&path)
            .with_debounce(Duration::from_millis(100))
            .spawn(cancel.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(&path, TWO_SERVICES).unwrap();

        let config = tokio::time::timeout(Duration::from_secs(10), updates.recv())
            .await
            .expect("reload within timeout")
            .expect("channel open");
        assert_eq!(config.services.len(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
