//! Wallet module - generated key pairs with encrypted private keys
//!
//! # Architecture
//!
//! ```text
//! WalletStore (Arc<Mutex<Vec<Wallet>>>)
//!     │
//!     ├── generate_wallet(session) ── KeyGenerator ── crypto::encrypt(password)
//!     │                                                   │
//!     │                                                   ▼
//!     │                                       KeyValueStore["wallets"] (JSON)
//!     │
//!     └── per wallet: WalletCard
//!               ├── RevealFlow   (password re-entry, hides on lock)
//!               └── BalanceView  (async BalanceClient lookup)
//! ```
//!
//! # Stored JSON
//!
//! | Field | Description |
//! |-------|-------------|
//! | `address` | EIP-55 checksummed `0x` address |
//! | `encryptedPrivateKey` | `crypto::encrypt` output |
//! | `createdAt` | RFC 3339 timestamp |

pub mod balance;
pub mod card;
pub mod reveal;

pub use balance::{format_ether, BalanceClient, BalanceState, BalanceView, RpcBalanceClient};
pub use card::{CardSnapshot, WalletCard};
pub use reveal::{RevealFlow, RevealState};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::auth::Session;
use crate::core::paths;
use crate::crypto;
use crate::error::{CryptoError, VaultError, VaultResult};
use crate::keys::{is_address, KeyGenerator};
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub address: String,
    pub encrypted_private_key: String,
    pub created_at: DateTime<Utc>,
}

/// Decrypt a stored private key with `password`.
pub fn decrypt_private_key(
    encrypted: &str,
    password: &str,
) -> Result<Zeroizing<String>, CryptoError> {
    crypto::decrypt(encrypted, password)
}

/// Ordered wallet list, persisted under `wallets` after every change.
#[derive(Clone)]
pub struct WalletStore {
    inner: Arc<Mutex<Vec<Wallet>>>,
    store: Arc<dyn KeyValueStore>,
    keygen: Arc<dyn KeyGenerator>,
}

impl WalletStore {
    /// Load persisted wallets. Unparseable data is logged and treated as empty.
    pub fn load(store: Arc<dyn KeyValueStore>, keygen: Arc<dyn KeyGenerator>) -> VaultResult<Self> {
        let wallets = match store.get(paths::storage::WALLETS)? {
            Some(raw) => parse_wallets(&raw),
            None => Vec::new(),
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(wallets)),
            store,
            keygen,
        })
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.inner.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up by address, ignoring checksum case.
    pub fn find(&self, address: &str) -> Option<Wallet> {
        let guard = self.inner.lock().ok()?;
        guard
            .iter()
            .find(|w| w.address.eq_ignore_ascii_case(address))
            .cloned()
    }

    pub fn require(&self, address: &str) -> VaultResult<Wallet> {
        self.find(address)
            .ok_or_else(|| VaultError::WalletNotFound(address.to_string()))
    }

    /// Generate, encrypt and persist a new wallet.
    ///
    /// Returns `Ok(None)` without doing anything when the session is locked.
    pub fn generate_wallet(&self, session: &Session) -> VaultResult<Option<Wallet>> {
        let Some(password) = session.password() else {
            return Ok(None);
        };
        session.reset_timer()?;

        let key = self.keygen.generate()?;
        if !is_address(&key.address) {
            return Err(VaultError::KeyGeneration(format!("invalid address: {}", key.address)));
        }
        let encrypted = crypto::encrypt(&key.private_key, &password, &session.kdf())?;
        let wallet = Wallet {
            address: key.address,
            encrypted_private_key: encrypted,
            created_at: session.clock().now(),
        };

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| VaultError::Poisoned("wallet lock"))?;
        if guard.iter().any(|w| w.address.eq_ignore_ascii_case(&wallet.address)) {
            return Err(VaultError::DuplicateAddress(wallet.address));
        }

        let mut next = guard.clone();
        next.push(wallet.clone());
        let raw = serde_json::to_string(&next).map_err(crate::error::StorageError::from)?;
        self.store.set(paths::storage::WALLETS, &raw)?;
        *guard = next;

        info!(address = %wallet.address, count = guard.len(), "wallet generated");
        Ok(Some(wallet))
    }

    pub fn decrypt_private_key(
        &self,
        encrypted: &str,
        password: &str,
    ) -> Result<Zeroizing<String>, CryptoError> {
        decrypt_private_key(encrypted, password)
    }
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore").field("wallets", &self.len()).finish()
    }
}

fn parse_wallets(raw: &str) -> Vec<Wallet> {
    let parsed: Vec<Wallet> = match serde_json::from_str(raw) {
        Ok(wallets) => wallets,
        Err(e) => {
            error!(error = %e, "failed to parse stored wallets");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    parsed
        .into_iter()
        .filter(|w| {
            let fresh = seen.insert(w.address.to_ascii_lowercase());
            if !fresh {
                warn!(address = %w.address, "dropping duplicate stored wallet");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SESSION_TIMEOUT;
    use crate::clock::{Clock, ManualClock};
    use crate::crypto::KdfParams;
    use crate::keys::{EthKeyGenerator, GeneratedKey};
    use crate::storage::MemoryStore;

    struct FixedKey;

    impl KeyGenerator for FixedKey {
        fn generate(&self) -> VaultResult<GeneratedKey> {
            Ok(GeneratedKey {
                address: "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".into(),
                private_key: Zeroizing::new(
                    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into(),
                ),
            })
        }
    }

    fn setup(keygen: Arc<dyn KeyGenerator>) -> (Session, WalletStore, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(
            store.clone(),
            Arc::new(clock.clone()),
            SESSION_TIMEOUT,
            KdfParams::insecure_fast(),
        )
        .unwrap();
        let wallets = WalletStore::load(store.clone(), keygen).unwrap();
        (session, wallets, store, clock)
    }

    #[test]
    fn generate_requires_unlocked_session() {
        let (session, wallets, store, _) = setup(Arc::new(EthKeyGenerator));
        assert!(wallets.generate_wallet(&session).unwrap().is_none());
        assert!(wallets.is_empty());
        assert!(store.get(paths::storage::WALLETS).unwrap().is_none());
    }

    #[test]
    fn generated_wallets_persist_and_decrypt() {
        let (session, wallets, store, _) = setup(Arc::new(EthKeyGenerator));
        session.setup_password("password123").unwrap();

        for _ in 0..3 {
            wallets.generate_wallet(&session).unwrap().unwrap();
        }
        assert_eq!(wallets.len(), 3);

        let raw = store.get(paths::storage::WALLETS).unwrap().unwrap();
        assert!(raw.contains("encryptedPrivateKey"));
        assert!(raw.contains("createdAt"));

        let reloaded = WalletStore::load(store, Arc::new(EthKeyGenerator)).unwrap();
        assert_eq!(reloaded.wallets(), wallets.wallets());

        for wallet in reloaded.wallets() {
            let key = decrypt_private_key(&wallet.encrypted_private_key, "password123").unwrap();
            assert_eq!(crate::keys::address_from_private_key(&key).unwrap(), wallet.address);
            assert_eq!(
                decrypt_private_key(&wallet.encrypted_private_key, "password124"),
                Err(CryptoError::IncorrectPassword)
            );
        }
    }

    #[test]
    fn generation_resets_the_timer() {
        let (session, wallets, _, clock) = setup(Arc::new(EthKeyGenerator));
        session.setup_password("password123").unwrap();
        clock.advance_ms(120_000);
        wallets.generate_wallet(&session).unwrap();
        assert_eq!(session.unlocked_till(), Some(clock.now_ms() + 300_000));
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let (session, wallets, _, _) = setup(Arc::new(FixedKey));
        session.setup_password("password123").unwrap();
        wallets.generate_wallet(&session).unwrap().unwrap();
        assert!(matches!(
            wallets.generate_wallet(&session),
            Err(VaultError::DuplicateAddress(_))
        ));
        assert_eq!(wallets.len(), 1);
    }

    #[test]
    fn corrupt_json_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(paths::storage::WALLETS, "{not json").unwrap();
        let wallets = WalletStore::load(store, Arc::new(EthKeyGenerator)).unwrap();
        assert!(wallets.is_empty());
    }

    #[test]
    fn duplicate_stored_addresses_keep_first() {
        let store = Arc::new(MemoryStore::new());
        let raw = r#"[
            {"address":"0xAb","encryptedPrivateKey":"first","createdAt":"2024-01-01T00:00:00Z"},
            {"address":"0xab","encryptedPrivateKey":"second","createdAt":"2024-01-02T00:00:00Z"}
        ]"#;
        store.set(paths::storage::WALLETS, raw).unwrap();
        let wallets = WalletStore::load(store, Arc::new(EthKeyGenerator)).unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets.wallets()[0].encrypted_private_key, "first");
    }

    #[test]
    fn find_ignores_case() {
        let (session, wallets, _, _) = setup(Arc::new(FixedKey));
        session.setup_password("password123").unwrap();
        wallets.generate_wallet(&session).unwrap();
        assert!(wallets.find("0x2c7536e3605d9c16a7a3d7b1898e529396a65c23").is_some());
        assert!(matches!(wallets.require("0xdead"), Err(VaultError::WalletNotFound(_))));
    }

    struct BadAddress;

    impl KeyGenerator for BadAddress {
        fn generate(&self) -> VaultResult<GeneratedKey> {
            Ok(GeneratedKey {
                address: "2c7536E3605D9C16a7a3D7b1898e529396a65c23".into(),
                private_key: Zeroizing::new(
                    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into(),
                ),
            })
        }
    }

    #[test]
    fn malformed_generated_address_is_rejected() {
        let (session, wallets, store, _) = setup(Arc::new(BadAddress));
        session.setup_password("password123").unwrap();
        assert!(matches!(
            wallets.generate_wallet(&session),
            Err(VaultError::KeyGeneration(_))
        ));
        assert!(wallets.is_empty());
        assert!(store.get(paths::storage::WALLETS).unwrap().is_none());
    }
}
