//! Per-wallet display model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::balance::{explorer_link, BalanceView};
use super::reveal::{RevealFlow, RevealState};
use super::Wallet;
use crate::auth::Session;
use crate::clock::relative_time;

pub struct WalletCard {
    index: usize,
    reveal: RevealFlow,
    balance: BalanceView,
}

/// Rendered snapshot of a card. The private key is only present while revealed.
#[derive(Debug, Clone, Serialize)]
pub struct CardSnapshot {
    pub title: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub created: String,
    pub balance: String,
    pub explorer: String,
    pub reveal: RevealState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WalletCard {
    /// `index` is 1-based, as shown to the user.
    pub fn new(index: usize, wallet: Wallet, session: Session) -> Self {
        let balance = BalanceView::new(wallet.address.clone());
        Self {
            index,
            reveal: RevealFlow::new(wallet, session),
            balance,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn wallet(&self) -> &Wallet {
        self.reveal.wallet()
    }

    pub fn title(&self) -> String {
        format!("Wallet {}", self.index)
    }

    pub fn reveal(&self) -> &RevealFlow {
        &self.reveal
    }

    pub fn balance(&self) -> &BalanceView {
        &self.balance
    }

    pub fn created_relative(&self, now: DateTime<Utc>) -> String {
        relative_time(self.wallet().created_at, now)
    }

    pub fn snapshot(&self, network_label: &str, explorer_url: &str, now: DateTime<Utc>) -> CardSnapshot {
        let wallet = self.wallet();
        let private_key = self.reveal.private_key().map(|k| k.to_string());
        CardSnapshot {
            title: self.title(),
            address: wallet.address.clone(),
            created_at: wallet.created_at,
            created: self.created_relative(now),
            balance: self.balance.display(network_label),
            explorer: explorer_link(explorer_url, &wallet.address),
            reveal: if private_key.is_some() { RevealState::Revealed } else { RevealState::Hidden },
            private_key,
            error: self.reveal.error().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SESSION_TIMEOUT;
    use crate::clock::{Clock, ManualClock};
    use crate::crypto::KdfParams;
    use crate::keys::EthKeyGenerator;
    use crate::storage::MemoryStore;
    use crate::wallet::WalletStore;
    use std::sync::Arc;

    #[test]
    fn snapshot_tracks_reveal_and_lock() {
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

        let card = WalletCard::new(1, wallet.clone(), session.clone());
        clock.advance_ms(4 * 60_000);
        let snap = card.snapshot("Sepolia Testnet", "https://sepolia.etherscan.io/address/", clock.now());
        assert_eq!(snap.title, "Wallet 1");
        assert_eq!(snap.created, "4 minutes ago");
        assert_eq!(snap.balance, "0 ETH (Sepolia Testnet)");
        assert_eq!(snap.explorer, format!("https://sepolia.etherscan.io/address/{}", wallet.address));
        assert_eq!(snap.reveal, RevealState::Hidden);

        session.reset_timer().unwrap();
        card.reveal().set_confirmation("abc12345");
        card.reveal().reveal().unwrap();
        let snap = card.snapshot("Sepolia Testnet", "", clock.now());
        assert_eq!(snap.reveal, RevealState::Revealed);
        assert!(snap.private_key.is_some());

        session.lock_app().unwrap();
        let snap = card.snapshot("Sepolia Testnet", "", clock.now());
        assert_eq!(snap.reveal, RevealState::Hidden);
        assert!(snap.private_key.is_none());
    }
}
