//! Periodic retention cleanup.
//!
//! Runs [`CredentialStore::cleanup_expired`] on an interval until the
//! shutdown channel flips. The store sits behind a mutex because SQLite
//! connections are not shared; the lock is held only for the duration of
//! one cleanup pass.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::store::CredentialStore;

/// Background service purging retired credentials past retention.
pub struct Janitor {
    store: Arc<Mutex<CredentialStore>>,
    interval: Duration,
}

impl Janitor {
    pub fn new(store: Arc<Mutex<CredentialStore>>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until `shutdown` signals. One cleanup pass per interval tick.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let result = {
                let store = self.store.lock().expect("credential store poisoned");
                store.cleanup_expired()
            };
            match result {
                Ok(0) => {}
                Ok(n) => log::info!("janitor removed {n} retired credentials"),
                Err(e) => log::error!("janitor cleanup failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, IssueRequest, KeyHasher, RETENTION_DAYS};
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test(start_paused = true)]
    async fn test_janitor_purges_on_tick_and_stops_on_shutdown() {
        let store = Arc::new(Mutex::new(CredentialStore::open_in_memory().unwrap()));
        let hasher = KeyHasher::new(None);
        let now = Utc::now();

        let prefix = {
            let guard = store.lock().unwrap();
            let (mut credential, _raw) = Credential::issue_at(
                IssueRequest::new("stale", "ops"),
                &hasher,
                now - ChronoDuration::days(300),
            )
            .unwrap();
            credential.is_active = false;
            credential.expires_at = Some(now - ChronoDuration::days(RETENTION_DAYS + 5));
            guard.insert(&credential).unwrap();
            credential.key_prefix.clone()
        };

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let janitor = Janitor::new(store.clone(), Duration::from_secs(60));
        let handle = tokio::spawn(janitor.run(shutdown_rx));

        // Advance past one tick; the paused clock makes this deterministic.
        tokio::time::sleep(Duration::from_secs(61)).await;

        {
            let guard = store.lock().unwrap();
            assert!(guard.find_by_prefix(&prefix).unwrap().is_none());
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
