//! In-process registry of revoked identity tokens.
//!
//! Entries are keyed by the full token string and forgotten once they are older
//! than the retention window. The registry is not persisted: a restart forgets
//! every revocation, and tokens revoked before it become valid again until
//! they expire.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info};

pub const DEFAULT_RETENTION_SECONDS: i64 = 24 * 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;

#[derive(Debug)]
pub struct RevocationRegistry {
    entries: DashMap<String, DateTime<Utc>>,
    retention: Duration,
}

impl Default for RevocationRegistry {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RETENTION_SECONDS))
    }
}

impl RevocationRegistry {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Record `token` as revoked now. Revoking twice refreshes the timestamp.
    pub fn revoke(&self, token: &str) {
        self.revoke_at(token, Utc::now());
    }

    pub fn revoke_at(&self, token: &str, revoked_at: DateTime<Utc>) {
        self.entries.insert(token.to_string(), revoked_at);
    }

    #[must_use]
    pub fn is_revoked(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the retention window, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, revoked_at| now.signed_duration_since(*revoked_at) <= retention);
        before.saturating_sub(self.entries.len())
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    #[must_use]
    pub fn start(self: &Arc<Self>, interval: std::time::Duration) -> SweepTask {
        let registry = Arc::clone(self);
        let (shutdown, mut stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            info!("Swept {removed} expired token revocations");
                        } else {
                            debug!("Revocation sweep found nothing to remove");
                        }
                    }
                    _ = &mut stop => {
                        debug!("Revocation sweeper stopped");
                        break;
                    }
                }
            }
        });

        SweepTask { shutdown, handle }
    }
}

/// Handle to the background sweep started by [`RevocationRegistry::start`].
#[derive(Debug)]
pub struct SweepTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Stop the sweeper and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
