//! Password session: setup, unlock, lock and expiry.
//!
//! The password is never written anywhere. Setup encrypts [`SENTINEL`] with
//! it and stores the ciphertext under `system_message`; unlock succeeds when
//! that ciphertext decrypts back to the sentinel.
//!
//! ```text
//! NoPasswordSet --setup--> Unlocked <--unlock-- Locked
//!                              │                  ▲
//!                              └──lock / expiry───┘
//! ```
//!
//! Expiry is enforced lazily on every read, and eagerly by [`ExpiryWatcher`]
//! when one is running.

pub mod countdown;
mod expiry;
pub mod forms;

pub use countdown::{CountdownBand, SessionCountdown};
pub use expiry::ExpiryWatcher;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::core::paths;
use crate::crypto::{self, KdfParams};
use crate::error::{ValidationError, VaultError, VaultResult};
use crate::storage::KeyValueStore;

/// Plaintext encrypted under the password to verify it later.
pub const SENTINEL: &str = "keyvault system message";

/// Default unlocked window.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Longest accepted unlocked window (30 days).
pub const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoPasswordSet,
    Locked,
    Unlocked,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NoPasswordSet => "no_password_set",
            SessionState::Locked => "locked",
            SessionState::Unlocked => "unlocked",
        }
    }
}

/// Snapshot published to subscribers. Never carries the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub is_locked: bool,
    pub has_setup_password: bool,
    /// Epoch milliseconds, present only while unlocked.
    pub unlocked_till: Option<i64>,
    pub timeout_ms: u64,
}

enum Phase {
    NoPasswordSet,
    Locked,
    Unlocked {
        password: Zeroizing<String>,
        unlocked_till: i64,
    },
}

impl Phase {
    fn is_unlocked(&self) -> bool {
        matches!(self, Phase::Unlocked { .. })
    }

    fn state(&self) -> SessionState {
        match self {
            Phase::NoPasswordSet => SessionState::NoPasswordSet,
            Phase::Locked => SessionState::Locked,
            Phase::Unlocked { .. } => SessionState::Unlocked,
        }
    }

    fn expire(&mut self, now: i64) -> bool {
        match self {
            Phase::Unlocked { unlocked_till, .. } if now >= *unlocked_till => {
                *self = Phase::Locked;
                true
            }
            _ => false,
        }
    }
}

type LockListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, LockListener)>>,
}

struct SessionShared {
    phase: Mutex<Phase>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    timeout_ms: i64,
    kdf: KdfParams,
    status_tx: watch::Sender<SessionStatus>,
    listeners: Arc<Listeners>,
}

/// Shared session handle. Clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Open a session over `store`. Starts `Locked` when a sentinel exists,
    /// `NoPasswordSet` otherwise. `timeout` must be non-zero and at most
    /// [`MAX_SESSION_TIMEOUT`].
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        kdf: KdfParams,
    ) -> VaultResult<Self> {
        let timeout_ms = timeout_millis(timeout)?;
        let phase = match store.get(paths::storage::SYSTEM_MESSAGE)? {
            Some(_) => Phase::Locked,
            None => Phase::NoPasswordSet,
        };
        let initial = status_of(&phase, timeout);
        let (status_tx, _) = watch::channel(initial);

        Ok(Self {
            shared: Arc::new(SessionShared {
                phase: Mutex::new(phase),
                store,
                clock,
                timeout,
                timeout_ms,
                kdf,
                status_tx,
                listeners: Arc::new(Listeners::default()),
            }),
        })
    }

    /// Store the sentinel encrypted under `password` and unlock.
    pub fn setup_password(&self, password: &str) -> VaultResult<()> {
        if password.is_empty() {
            return Err(ValidationError::Required.into());
        }
        if self.has_setup_password() {
            return Err(VaultError::PasswordAlreadySet);
        }

        let sealed = crypto::encrypt(SENTINEL, password, &self.shared.kdf)?;
        let timeout = self.timeout_ms();
        let store = self.shared.store.clone();

        self.transact(|phase, now| {
            if !matches!(phase, Phase::NoPasswordSet) {
                return Err(VaultError::PasswordAlreadySet);
            }
            store.set(paths::storage::SYSTEM_MESSAGE, &sealed)?;
            *phase = Phase::Unlocked {
                password: Zeroizing::new(password.to_string()),
                unlocked_till: now.saturating_add(timeout),
            };
            Ok(())
        })??;

        info!("password set up, session unlocked");
        Ok(())
    }

    /// Try to unlock with `password`. Wrong, empty or unverifiable
    /// passwords all give `false`.
    pub fn unlock_app(&self, password: &str) -> bool {
        if password.is_empty() || !self.has_setup_password() {
            return false;
        }

        let sealed = match self.shared.store.get(paths::storage::SYSTEM_MESSAGE) {
            Ok(Some(sealed)) => sealed,
            Ok(None) => return false,
            Err(e) => {
                error!(error = %e, "failed to read system message");
                return false;
            }
        };
        let verified = matches!(
            crypto::decrypt(&sealed, password),
            Ok(plain) if plain.as_str() == SENTINEL
        );
        if !verified {
            warn!("unlock attempt with incorrect password");
            return false;
        }

        let timeout = self.timeout_ms();
        let unlocked = self.transact(|phase, now| {
            if matches!(phase, Phase::NoPasswordSet) {
                return false;
            }
            *phase = Phase::Unlocked {
                password: Zeroizing::new(password.to_string()),
                unlocked_till: now.saturating_add(timeout),
            };
            true
        });

        match unlocked {
            Ok(true) => {
                info!("session unlocked");
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(error = %e, "unlock failed");
                false
            }
        }
    }

    /// Drop the password and lock. Returns whether a transition happened.
    pub fn lock_app(&self) -> VaultResult<bool> {
        let locked = self.transact(|phase, _| {
            if phase.is_unlocked() {
                *phase = Phase::Locked;
                true
            } else {
                false
            }
        })?;
        if locked {
            info!("session locked");
        }
        Ok(locked)
    }

    /// Push expiry out to now + timeout. No-op unless unlocked.
    pub fn reset_timer(&self) -> VaultResult<bool> {
        let timeout = self.timeout_ms();
        let reset = self.transact(|phase, now| match phase {
            Phase::Unlocked { unlocked_till, .. } => {
                *unlocked_till = now.saturating_add(timeout);
                true
            }
            _ => false,
        })?;
        if reset {
            debug!("session timer reset");
        }
        Ok(reset)
    }

    /// Lock if the deadline has passed. Returns whether this call locked.
    pub fn check_expiry(&self) -> VaultResult<bool> {
        self.apply(|_, _| ()).map(|(_, locked)| locked)
    }

    pub fn status(&self) -> VaultResult<SessionStatus> {
        let timeout = self.shared.timeout;
        self.transact(|phase, _| status_of(phase, timeout))
    }

    pub fn is_locked(&self) -> bool {
        self.transact(|phase, _| !phase.is_unlocked()).unwrap_or(true)
    }

    pub fn has_setup_password(&self) -> bool {
        self.transact(|phase, _| !matches!(phase, Phase::NoPasswordSet))
            .unwrap_or(false)
    }

    pub fn unlocked_till(&self) -> Option<i64> {
        self.transact(|phase, _| match phase {
            Phase::Unlocked { unlocked_till, .. } => Some(*unlocked_till),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// The in-memory password, if unlocked.
    pub fn password(&self) -> Option<Zeroizing<String>> {
        self.transact(|phase, _| match phase {
            Phase::Unlocked { password, .. } => Some(password.clone()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    pub fn kdf(&self) -> KdfParams {
        self.shared.kdf
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.shared.clock.clone()
    }

    pub fn now_ms(&self) -> i64 {
        self.shared.clock.now_ms()
    }

    /// Countdown for the current status, evaluated now.
    pub fn countdown(&self) -> VaultResult<SessionCountdown> {
        let status = self.status()?;
        Ok(SessionCountdown::new(&status, self.now_ms()))
    }

    /// Status snapshots, updated on every transition and timer reset.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Run `callback` after every Unlocked -> Locked transition.
    pub fn on_lock<F>(&self, callback: F) -> LockSubscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listeners = &self.shared.listeners;
        let id = listeners.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = listeners.entries.lock() {
            entries.push((id, Arc::new(callback)));
        }
        LockSubscription {
            id,
            listeners: Arc::downgrade(listeners),
        }
    }

    fn timeout_ms(&self) -> i64 {
        self.shared.timeout_ms
    }

    fn transact<R>(&self, f: impl FnOnce(&mut Phase, i64) -> R) -> VaultResult<R> {
        self.apply(f).map(|(result, _)| result)
    }

    /// Run `f` against the phase after applying expiry, then publish the new
    /// status and fire lock listeners outside the mutex.
    fn apply<R>(&self, f: impl FnOnce(&mut Phase, i64) -> R) -> VaultResult<(R, bool)> {
        let now = self.shared.clock.now_ms();
        let (result, status, locked) = {
            let mut phase = self
                .shared
                .phase
                .lock()
                .map_err(|_| VaultError::Poisoned("session lock"))?;
            let was_unlocked = phase.is_unlocked();
            let expired = phase.expire(now);
            if expired {
                info!("session expired, locking");
            }
            let result = f(&mut phase, now);
            let locked = was_unlocked && (expired || !phase.is_unlocked());
            (result, status_of(&phase, self.shared.timeout), locked)
        };

        self.shared.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if locked {
            self.notify_lock();
        }
        Ok((result, locked))
    }

    fn notify_lock(&self) {
        let callbacks: Vec<LockListener> = match self.shared.listeners.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &*self.shared.status_tx.borrow())
            .finish()
    }
}

fn timeout_millis(timeout: Duration) -> VaultResult<i64> {
    if timeout.is_zero() || timeout > MAX_SESSION_TIMEOUT {
        return Err(VaultError::InvalidTimeout(timeout.as_millis()));
    }
    i64::try_from(timeout.as_millis()).map_err(|_| VaultError::InvalidTimeout(timeout.as_millis()))
}

fn status_of(phase: &Phase, timeout: Duration) -> SessionStatus {
    SessionStatus {
        state: phase.state(),
        is_locked: !phase.is_unlocked(),
        has_setup_password: !matches!(phase, Phase::NoPasswordSet),
        unlocked_till: match phase {
            Phase::Unlocked { unlocked_till, .. } => Some(*unlocked_till),
            _ => None,
        },
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// Handle for a lock listener. Unregisters on drop.
pub struct LockSubscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for LockSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut entries) = listeners.entries.lock() {
                entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
