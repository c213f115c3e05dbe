//! Keyvault: a password-gated wallet vault. One password, a timed session,
//! private keys encrypted at rest and revealed only on re-entry.
//!
//! # Architecture
//!
//! ```text
//! Vault (entry point)
//!   │
//!   ├── Session (auth)
//!   │     ├── Phase: NoPasswordSet → Locked ⇄ Unlocked { password, unlocked_till }
//!   │     ├── sentinel "system_message" (proves the password)
//!   │     └── ExpiryWatcher (locks the app when unlocked_till passes)
//!   │
//!   ├── WalletStore (wallet)
//!   │     ├── "wallets" → [{address, encryptedPrivateKey, createdAt}]
//!   │     └── WalletCard → RevealFlow + BalanceView
//!   │
//!   └── KeyValueStore (storage)
//!         ├── FileStore (one file per key under <data>/<app>/data)
//!         └── MemoryStore (tests)
//! ```
//!
//! # Session operations
//!
//! | Operation | Method | Effect |
//! |-----------|--------|--------|
//! | setup | `session.setup_password(pw)` | First password, unlocks |
//! | unlock | `session.unlock_app(pw)` | Verify sentinel, unlocks |
//! | lock | `session.lock_app()` | Forget password |
//! | reset | `session.reset_timer()` | Extend deadline by the timeout |
//! | expire | `session.check_expiry()` | Lock if past the deadline |
//!
//! # Features
//!
//! - `server` - HTTP JSON API (axum) over a shared [`Vault`]
//!
//! # Usage
//!
//! ```ignore
//! use keyvault::{Vault, VaultConfig};
//!
//! let vault = Vault::open(VaultConfig::from_env())?;
//! vault.session().setup_password("password123")?;
//!
//! let wallet = vault.generate_wallet()?.expect("unlocked");
//! let key = vault.reveal(&wallet.address, "password123")?;
//! ```

pub mod auth;
pub mod clock;
pub mod core;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod logging;
pub mod runtime;
pub mod storage;
pub mod vault;
pub mod wallet;

#[cfg(feature = "server")]
pub mod server;

// =============================================================================
// Re-exports
// =============================================================================
pub use auth::{CountdownBand, ExpiryWatcher, Session, SessionCountdown, SessionState, SessionStatus};
pub use clock::{Clock, ManualClock, SystemClock, Ticker, TickerConfig};
pub use crypto::KdfParams;
pub use error::{RevealError, VaultError, VaultResult};
pub use keys::{EthKeyGenerator, KeyGenerator};
pub use logging::init_logging;
pub use runtime::{install_signal_handlers, Shutdown};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use vault::{Vault, VaultConfig};
pub use wallet::{RevealFlow, RevealState, Wallet, WalletCard, WalletStore};

#[cfg(feature = "server")]
pub use server::{create_router, serve};
