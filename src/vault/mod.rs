//! Vault - wires storage, session, wallets and balance lookups together.
//!
//! Everything is passed explicitly; the vault owns one of each collaborator
//! and hands out cheap clones.

mod config;

pub use config::{VaultConfig, DEFAULT_APP, DEFAULT_EXPLORER_URL, DEFAULT_NETWORK_LABEL, DEFAULT_RPC_URL};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::info;
use zeroize::Zeroizing;

use crate::auth::{ExpiryWatcher, Session};
use crate::clock::{Clock, SystemClock};
use crate::error::{VaultError, VaultResult};
use crate::keys::{EthKeyGenerator, KeyGenerator};
use crate::storage::{FileStore, KeyValueStore};
use crate::wallet::{BalanceClient, BalanceState, CardSnapshot, RpcBalanceClient, Wallet, WalletCard, WalletStore};

pub struct Vault {
    config: VaultConfig,
    session: Session,
    wallets: WalletStore,
    balance: Arc<dyn BalanceClient>,
    cards: Arc<Mutex<HashMap<String, Arc<WalletCard>>>>,
}

impl Vault {
    /// File-backed vault with the system clock and the default collaborators.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        let store = FileStore::open(&config.app, config.data_dir.as_deref())?;
        info!(app = %config.app, dir = %store.dir().display(), "opening vault");
        let balance = RpcBalanceClient::new(config.rpc_url.clone())?;
        Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(SystemClock),
            Arc::new(EthKeyGenerator),
            Arc::new(balance),
        )
    }

    pub fn with_parts(
        config: VaultConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        keygen: Arc<dyn KeyGenerator>,
        balance: Arc<dyn BalanceClient>,
    ) -> VaultResult<Self> {
        let session = Session::new(store.clone(), clock, config.session_timeout, config.kdf)?;
        let wallets = WalletStore::load(store, keygen)?;
        Ok(Self {
            config,
            session,
            wallets,
            balance,
            cards: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    pub fn balance_client(&self) -> Arc<dyn BalanceClient> {
        self.balance.clone()
    }

    /// `Ok(None)` while locked.
    pub fn generate_wallet(&self) -> VaultResult<Option<Wallet>> {
        self.wallets.generate_wallet(&self.session)
    }

    /// The display card for `address`, created on first use.
    pub fn card(&self, address: &str) -> VaultResult<Arc<WalletCard>> {
        let key = address.to_ascii_lowercase();
        let mut cards = self
            .cards
            .lock()
            .map_err(|_| VaultError::Poisoned("card lock"))?;
        if let Some(card) = cards.get(&key) {
            return Ok(card.clone());
        }

        let all = self.wallets.wallets();
        let (index, wallet) = all
            .into_iter()
            .enumerate()
            .find(|(_, w)| w.address.eq_ignore_ascii_case(address))
            .ok_or_else(|| VaultError::WalletNotFound(address.to_string()))?;
        let card = Arc::new(WalletCard::new(index + 1, wallet, self.session.clone()));
        cards.insert(key, card.clone());
        Ok(card)
    }

    /// Run the reveal flow for one wallet with `confirmation`.
    pub fn reveal(&self, address: &str, confirmation: &str) -> VaultResult<Zeroizing<String>> {
        let card = self.card(address)?;
        Ok(card.reveal().reveal_with(confirmation)?)
    }

    pub fn hide(&self, address: &str) -> VaultResult<()> {
        self.card(address)?.reveal().hide();
        Ok(())
    }

    pub async fn load_balance(&self, address: &str) -> VaultResult<BalanceState> {
        let card = self.card(address)?;
        Ok(card.balance().load(self.balance.as_ref()).await)
    }

    pub fn snapshots(&self) -> VaultResult<Vec<CardSnapshot>> {
        let now = self.session.clock().now();
        self.wallets
            .wallets()
            .iter()
            .map(|w| {
                let card = self.card(&w.address)?;
                Ok(card.snapshot(&self.config.network_label, &self.config.explorer_url, now))
            })
            .collect()
    }

    pub fn explorer_link(&self, address: &str) -> String {
        crate::wallet::balance::explorer_link(&self.config.explorer_url, address)
    }

    pub fn spawn_expiry_watcher(&self, shutdown: broadcast::Receiver<()>) -> ExpiryWatcher {
        ExpiryWatcher::spawn(self.session.clone(), shutdown)
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("app", &self.config.app)
            .field("session", &self.session)
            .field("wallets", &self.wallets)
            .finish()
    }
}
