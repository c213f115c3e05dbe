//! Background auto-lock.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::Session;

/// Tokio task that locks the session when its deadline passes.
///
/// Re-arms whenever the published `unlocked_till` changes. Aborted on drop.
pub struct ExpiryWatcher {
    handle: JoinHandle<()>,
}

impl ExpiryWatcher {
    pub fn spawn(session: Session, mut shutdown: broadcast::Receiver<()>) -> Self {
        let mut status = session.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let deadline = status.borrow_and_update().unlocked_till;
                match deadline {
                    Some(till) => {
                        let wait = (till - session.now_ms()).max(0) as u64;
                        debug!(wait_ms = wait, "expiry watcher armed");
                        tokio::select! {
                            _ = shutdown.recv() => break,
                            changed = status.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(Duration::from_millis(wait)) => {
                                if let Err(e) = session.check_expiry() {
                                    error!(error = %e, "expiry check failed");
                                    break;
                                }
                            }
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = shutdown.recv() => break,
                            changed = status.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            debug!("expiry watcher stopped");
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ExpiryWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::KdfParams;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn session(timeout_ms: u64) -> Session {
        Session::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Duration::from_millis(timeout_ms),
            KdfParams::insecure_fast(),
        )
        .unwrap()
    }

    async fn wait_locked(session: &Session) {
        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !rx.borrow_and_update().is_locked {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("session should auto-lock");
    }

    #[tokio::test]
    async fn locks_when_deadline_passes() {
        let session = session(50);
        let (_tx, rx) = broadcast::channel(1);
        let _watcher = ExpiryWatcher::spawn(session.clone(), rx);

        session.setup_password("password123").unwrap();
        wait_locked(&session).await;
        assert!(session.password().is_none());
    }

    #[tokio::test]
    async fn reset_pushes_deadline_out() {
        let session = session(400);
        let (_tx, rx) = broadcast::channel(1);
        let _watcher = ExpiryWatcher::spawn(session.clone(), rx);

        session.setup_password("password123").unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        session.reset_timer().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!session.status().unwrap().is_locked);

        wait_locked(&session).await;
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let session = session(60_000);
        let (tx, rx) = broadcast::channel(1);
        let watcher = ExpiryWatcher::spawn(session.clone(), rx);
        let _ = tx.send(());
        tokio::time::timeout(Duration::from_secs(1), async {
            while watcher.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watcher should stop on shutdown");
    }
}
