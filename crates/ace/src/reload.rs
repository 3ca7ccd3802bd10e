//! Hot-reload orchestration: a broadcast of policy-change notifications and a
//! debounced, retrying service that drives [`PolicyLoader::update_policy`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::VerdictCache;
use crate::loader::PolicyLoader;

/// An event published whenever the policy source may have changed.
#[derive(Debug, Clone)]
pub enum PolicyChange {
    /// The policy document at a known path was modified.
    Updated(PathBuf),
    /// An external caller requests an unconditional reload.
    BulkReload,
}

/// A broadcast channel of [`PolicyChange`] events.
///
/// Multiple reload services (or any other interested listener) can
/// subscribe; each gets its own receiver, matching `tokio::sync::broadcast`'s
/// multi-consumer fan-out semantics.
#[derive(Clone)]
pub struct PolicyChangeNotifier {
    sender: broadcast::Sender<PolicyChange>,
}

impl PolicyChangeNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyChange> {
        self.sender.subscribe()
    }

    /// Publishes a change. Errors only when there are no subscribers, which
    /// is harmless — there is simply nothing to notify yet.
    pub fn notify(&self, change: PolicyChange) {
        let _ = self.sender.send(change);
    }
}

impl Default for PolicyChangeNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Tuning knobs for [`PolicyReloadService`].
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// How long to wait after a change notification before reloading, so a
    /// burst of rapid edits to the same file collapses into one reload.
    pub debounce: Duration,
    /// How many times to retry a failed reload before giving up on that
    /// notification.
    pub max_attempts: u32,
    /// Base delay for the retry backoff; attempt `n` waits `base * 2^(n-1)`.
    pub retry_backoff_base: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            max_attempts: 3,
            retry_backoff_base: Duration::from_millis(100),
        }
    }
}

/// Cumulative counters for the reload service's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Debounces [`PolicyChange`] notifications and retries failed reloads with
/// exponential backoff, driving a shared [`PolicyLoader`] and purging a
/// shared [`VerdictCache`] once a reload lands.
///
/// This reacts only to explicit notifications a caller publishes through a
/// [`PolicyChangeNotifier`] — it does not watch the filesystem itself.
pub struct PolicyReloadService {
    loader: Arc<PolicyLoader>,
    cache: Arc<VerdictCache>,
    config: ReloadConfig,
    default_path: PathBuf,
}

impl PolicyReloadService {
    #[must_use]
    pub fn new(
        loader: Arc<PolicyLoader>,
        cache: Arc<VerdictCache>,
        default_path: PathBuf,
        config: ReloadConfig,
    ) -> Self {
        Self {
            loader,
            cache,
            config,
            default_path,
        }
    }

    /// Runs until `receiver` closes, debouncing bursts and retrying failures.
    ///
    /// Stats are returned once the loop exits so a caller can log a final
    /// summary; a long-running caller typically spawns this as a task and
    /// only inspects stats on shutdown.
    pub async fn run(mut self, mut receiver: broadcast::Receiver<PolicyChange>) -> ReloadStats {
        let mut stats = ReloadStats::default();
        loop {
            let change = tokio::select! {
                result = receiver.recv() => match result {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "reload notifier lagged, coalescing into one reload");
                        PolicyChange::BulkReload
                    }
                },
            };

            // Debounce: drain any further notifications that arrive within
            // the debounce window before acting on the first one.
            sleep(self.config.debounce).await;
            while receiver.try_recv().is_ok() {}

            let path = match &change {
                PolicyChange::Updated(path) => path.clone(),
                PolicyChange::BulkReload => self.default_path.clone(),
            };

            self.reload_with_retry(&path, &mut stats).await;
        }
        stats
    }

    async fn reload_with_retry(&mut self, path: &std::path::Path, stats: &mut ReloadStats) {
        for attempt in 1..=self.config.max_attempts {
            stats.attempted += 1;
            match self.loader.update_policy(path) {
                Ok(()) => {
                    if let Err(e) = self.cache.purge_all().await {
                        warn!(error = %e, "verdict cache purge failed after successful reload");
                    }
                    info!(?path, attempt, "policy reload succeeded");
                    stats.succeeded += 1;
                    return;
                }
                Err(e) => {
                    stats.failed += 1;
                    if attempt == self.config.max_attempts {
                        warn!(?path, attempt, error = %e, "policy reload failed, giving up");
                        return;
                    }
                    let backoff = self.config.retry_backoff_base * 2u32.pow(attempt - 1);
                    debug!(?path, attempt, error = %e, ?backoff, "policy reload failed, retrying");
                    sleep(backoff).await;
                }
            }
        }
    }
}
