//! Private-key reveal: password re-entry before showing a decrypted key.
//!
//! Every flow registers a lock listener on the session, so any lock
//! (explicit or expiry) hides a revealed key immediately.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, error};
use zeroize::{Zeroize, Zeroizing};

use super::{decrypt_private_key, Wallet};
use crate::auth::{LockSubscription, Session};
use crate::error::RevealError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    Hidden,
    Revealed,
}

#[derive(Default)]
struct RevealInner {
    confirmation: Zeroizing<String>,
    private_key: Option<Zeroizing<String>>,
    error: Option<RevealError>,
}

impl RevealInner {
    fn hide(&mut self) {
        self.private_key = None;
        self.confirmation.zeroize();
    }
}

pub struct RevealFlow {
    wallet: Wallet,
    session: Session,
    inner: Arc<Mutex<RevealInner>>,
    _on_lock: LockSubscription,
}

impl RevealFlow {
    pub fn new(wallet: Wallet, session: Session) -> Self {
        let inner = Arc::new(Mutex::new(RevealInner::default()));
        let weak: Weak<Mutex<RevealInner>> = Arc::downgrade(&inner);
        let address = wallet.address.clone();
        let on_lock = session.on_lock(move || {
            if let Some(inner) = weak.upgrade() {
                lock_inner(&inner).hide();
                debug!(address = %address, "session locked, private key hidden");
            }
        });

        Self {
            wallet,
            session,
            inner,
            _on_lock: on_lock,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn set_confirmation(&self, confirmation: &str) {
        let mut inner = lock_inner(&self.inner);
        inner.confirmation = Zeroizing::new(confirmation.to_string());
    }

    /// Check the pending confirmation against the session password and decrypt.
    pub fn reveal(&self) -> Result<Zeroizing<String>, RevealError> {
        self.run(None)
    }

    /// Set the confirmation and reveal in one step. Concurrent callers on the
    /// same flow each have their own input checked.
    pub fn reveal_with(&self, confirmation: &str) -> Result<Zeroizing<String>, RevealError> {
        self.run(Some(confirmation))
    }

    fn run(&self, confirmation: Option<&str>) -> Result<Zeroizing<String>, RevealError> {
        // Session calls may fire the lock listener, which takes `inner`.
        if let Err(e) = self.session.reset_timer() {
            error!(error = %e, address = %self.wallet.address, "session timer reset failed");
        }
        let password = self.session.password();

        let mut inner = lock_inner(&self.inner);
        if let Some(confirmation) = confirmation {
            inner.confirmation = Zeroizing::new(confirmation.to_string());
        }
        let result = self.check(&mut inner, password);
        inner.error = result.as_ref().err().copied();
        result
    }

    fn check(
        &self,
        inner: &mut RevealInner,
        password: Option<Zeroizing<String>>,
    ) -> Result<Zeroizing<String>, RevealError> {
        let password = password.ok_or(RevealError::SessionExpired)?;
        if inner.confirmation.is_empty() {
            return Err(RevealError::ConfirmationRequired);
        }
        if inner.confirmation.as_str() != password.as_str() {
            inner.confirmation.zeroize();
            return Err(RevealError::IncorrectPassword);
        }

        let key = decrypt_private_key(&self.wallet.encrypted_private_key, &password)
            .map_err(|_| RevealError::DecryptionFailed)?;
        inner.private_key = Some(key.clone());
        inner.confirmation.zeroize();
        Ok(key)
    }

    pub fn hide(&self) {
        lock_inner(&self.inner).hide();
    }

    pub fn state(&self) -> RevealState {
        if self.private_key().is_some() {
            RevealState::Revealed
        } else {
            RevealState::Hidden
        }
    }

    /// The revealed key, if any. Never returned once the session has locked.
    pub fn private_key(&self) -> Option<Zeroizing<String>> {
        // Reading the session applies expiry, which fires the lock listener.
        if self.session.is_locked() {
            self.hide();
            return None;
        }
        lock_inner(&self.inner).private_key.clone()
    }

    pub fn error(&self) -> Option<RevealError> {
        lock_inner(&self.inner).error
    }

    pub fn has_confirmation(&self) -> bool {
        !lock_inner(&self.inner).confirmation.is_empty()
    }
}

impl std::fmt::Debug for RevealFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealFlow")
            .field("address", &self.wallet.address)
            .field("revealed", &lock_inner(&self.inner).private_key.is_some())
            .finish()
    }
}

fn lock_inner(inner: &Mutex<RevealInner>) -> MutexGuard<'_, RevealInner> {
    inner.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SESSION_TIMEOUT;
    use crate::clock::{Clock, ManualClock};
    use crate::crypto::KdfParams;
    use crate::keys::EthKeyGenerator;
    use crate::error::{StorageError, VaultError};
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::wallet::WalletStore;

    struct Fixture {
        session: Session,
        clock: ManualClock,
        wallet: Wallet,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(
            store.clone(),
            Arc::new(clock.clone()),
            SESSION_TIMEOUT,
            KdfParams::insecure_fast(),
        )
        .unwrap();
        session.setup_password("abc12345").unwrap();
        let wallets = WalletStore::load(store, Arc::new(EthKeyGenerator)).unwrap();
        let wallet = wallets.generate_wallet(&session).unwrap().unwrap();
        Fixture { session, clock, wallet }
    }

    #[test]
    fn wrong_confirmation_stays_hidden_and_clears_input() {
        let f = fixture();
        let flow = RevealFlow::new(f.wallet, f.session);
        flow.set_confirmation("wrong");
        assert_eq!(flow.reveal().unwrap_err(), RevealError::IncorrectPassword);
        assert_eq!(flow.error().map(|e| e.to_string()).as_deref(), Some("Incorrect password"));
        assert_eq!(flow.state(), RevealState::Hidden);
        assert!(!flow.has_confirmation());
    }

    #[test]
    fn correct_confirmation_reveals_and_resets_timer() {
        let f = fixture();
        f.clock.advance_ms(100_000);
        let flow = RevealFlow::new(f.wallet.clone(), f.session.clone());
        flow.set_confirmation("abc12345");

        let key = flow.reveal().unwrap();
        assert_eq!(crate::keys::address_from_private_key(&key).unwrap(), f.wallet.address);
        assert_eq!(flow.state(), RevealState::Revealed);
        assert!(!flow.has_confirmation());
        assert!(flow.error().is_none());
        assert_eq!(f.session.unlocked_till(), Some(f.clock.now_ms() + 300_000));
    }

    #[test]
    fn empty_confirmation_is_required() {
        let f = fixture();
        let flow = RevealFlow::new(f.wallet, f.session);
        assert_eq!(flow.reveal().unwrap_err(), RevealError::ConfirmationRequired);
    }

    #[test]
    fn locked_session_reports_expiry_first() {
        let f = fixture();
        f.session.lock_app().unwrap();
        let flow = RevealFlow::new(f.wallet, f.session);
        flow.set_confirmation("abc12345");
        assert_eq!(flow.reveal().unwrap_err(), RevealError::SessionExpired);
    }

    #[test]
    fn undecryptable_key_fails_cleanly() {
        let f = fixture();
        let mut wallet = f.wallet;
        wallet.encrypted_private_key = "garbage".into();
        let flow = RevealFlow::new(wallet, f.session);
        flow.set_confirmation("abc12345");
        assert_eq!(flow.reveal().unwrap_err(), RevealError::DecryptionFailed);
    }

    #[test]
    fn lock_hides_revealed_key() {
        let f = fixture();
        let flow = RevealFlow::new(f.wallet, f.session.clone());
        flow.set_confirmation("abc12345");
        flow.reveal().unwrap();

        f.session.lock_app().unwrap();
        assert_eq!(flow.state(), RevealState::Hidden);
        assert!(flow.private_key().is_none());
    }

    #[test]
    fn expiry_hides_revealed_key() {
        let f = fixture();
        let flow = RevealFlow::new(f.wallet, f.session.clone());
        flow.set_confirmation("abc12345");
        flow.reveal().unwrap();

        f.clock.advance_ms(300_001);
        assert!(flow.private_key().is_none());
        assert_eq!(flow.state(), RevealState::Hidden);
    }

    #[test]
    fn hide_returns_to_hidden() {
        let f = fixture();
        let flow = RevealFlow::new(f.wallet, f.session);
        flow.set_confirmation("abc12345");
        flow.reveal().unwrap();
        flow.hide();
        assert_eq!(flow.state(), RevealState::Hidden);
    }

    #[test]
    fn concurrent_reveals_check_their_own_confirmation() {
        let f = fixture();
        let flow = Arc::new(RevealFlow::new(f.wallet, f.session));
        for _ in 0..200 {
            let wrong = {
                let flow = flow.clone();
                std::thread::spawn(move || flow.reveal_with("wrong-guess"))
            };
            let right = {
                let flow = flow.clone();
                std::thread::spawn(move || flow.reveal_with("abc12345"))
            };
            assert_eq!(wrong.join().unwrap().unwrap_err(), RevealError::IncorrectPassword);
            assert!(right.join().unwrap().is_ok());
        }
    }

    struct PanickingStore;

    impl KeyValueStore for PanickingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            panic!("store unavailable");
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn poisoned_session_reports_expiry() {
        let f = fixture();
        let broken = Session::new(
            Arc::new(PanickingStore),
            Arc::new(f.clock.clone()),
            SESSION_TIMEOUT,
            KdfParams::insecure_fast(),
        )
        .unwrap();
        let setup = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            broken.setup_password("abc12345")
        }));
        assert!(setup.is_err());
        assert!(matches!(broken.reset_timer(), Err(VaultError::Poisoned(_))));

        let flow = RevealFlow::new(f.wallet, broken);
        assert_eq!(flow.reveal_with("abc12345").unwrap_err(), RevealError::SessionExpired);
        assert_eq!(flow.error(), Some(RevealError::SessionExpired));
        assert_eq!(flow.state(), RevealState::Hidden);
    }
}
