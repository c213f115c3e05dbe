//! Storage keys and HTTP route constants
//!
//! Centralized registry so the CLI, server and stores agree on names.

/// Persisted storage keys
pub mod storage {
    /// Encrypted sentinel used to verify the password.
    pub const SYSTEM_MESSAGE: &str = "system_message";
    /// JSON array of wallet records.
    pub const WALLETS: &str = "wallets";
}

/// HTTP routes
pub mod routes {
    pub const HEALTH: &str = "/health";

    pub const AUTH_STATUS: &str = "/auth/status";
    pub const AUTH_SETUP: &str = "/auth/setup";
    pub const AUTH_UNLOCK: &str = "/auth/unlock";
    pub const AUTH_LOCK: &str = "/auth/lock";
    pub const AUTH_RESET: &str = "/auth/reset";

    pub const WALLETS: &str = "/wallets";
    pub const WALLET_REVEAL: &str = "/wallets/:address/reveal";
    pub const WALLET_BALANCE: &str = "/wallets/:address/balance";
}

/// Environment variables read by `VaultConfig::from_env` and the binary
pub mod env {
    pub const APP: &str = "KEYVAULT_APP";
    pub const ROOT: &str = "KEYVAULT_ROOT";
    pub const DATA_DIR: &str = "KEYVAULT_DATA_DIR";
    pub const SESSION_TIMEOUT_MS: &str = "KEYVAULT_SESSION_TIMEOUT_MS";
    pub const KDF_MEMORY_KIB: &str = "KEYVAULT_KDF_MEMORY_KIB";
    pub const KDF_ITERATIONS: &str = "KEYVAULT_KDF_ITERATIONS";
    pub const KDF_LANES: &str = "KEYVAULT_KDF_LANES";
    pub const RPC_URL: &str = "KEYVAULT_RPC_URL";
    pub const EXPLORER_URL: &str = "KEYVAULT_EXPLORER_URL";
    pub const PORT: &str = "KEYVAULT_PORT";
    pub const PASSWORD: &str = "KEYVAULT_PASSWORD";
    pub const LOG_JSON: &str = "KEYVAULT_LOG_JSON";
}
