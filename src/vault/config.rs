//! Vault configuration - built by the binary or by embedding code

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::auth::{MAX_SESSION_TIMEOUT, SESSION_TIMEOUT};
use crate::core::paths::env;
use crate::crypto::KdfParams;

pub const DEFAULT_APP: &str = "keyvault";
pub const DEFAULT_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.etherscan.io/address/";
pub const DEFAULT_NETWORK_LABEL: &str = "Sepolia Testnet";

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub app: String,
    /// Explicit storage directory. `None` resolves under the data root.
    pub data_dir: Option<PathBuf>,
    pub session_timeout: Duration,
    pub kdf: KdfParams,
    pub rpc_url: String,
    pub explorer_url: String,
    pub network_label: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP.into(),
            data_dir: None,
            session_timeout: SESSION_TIMEOUT,
            kdf: KdfParams::default(),
            rpc_url: DEFAULT_RPC_URL.into(),
            explorer_url: DEFAULT_EXPLORER_URL.into(),
            network_label: DEFAULT_NETWORK_LABEL.into(),
        }
    }
}

impl VaultConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }

    /// Defaults overridden by `KEYVAULT_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(app) = env_string(env::APP) {
            config.app = app;
        }
        if let Some(dir) = env_string(env::DATA_DIR) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = env_number::<u64>(env::SESSION_TIMEOUT_MS) {
            let timeout = Duration::from_millis(ms);
            if timeout.is_zero() || timeout > MAX_SESSION_TIMEOUT {
                warn!(key = env::SESSION_TIMEOUT_MS, value = ms, "ignoring out-of-range session timeout");
            } else {
                config.session_timeout = timeout;
            }
        }
        if let Some(m) = env_number(env::KDF_MEMORY_KIB) {
            config.kdf.memory_kib = m;
        }
        if let Some(t) = env_number(env::KDF_ITERATIONS) {
            config.kdf.iterations = t;
        }
        if let Some(p) = env_number(env::KDF_LANES) {
            config.kdf.lanes = p;
        }
        if let Some(url) = env_string(env::RPC_URL) {
            config.rpc_url = url;
        }
        if let Some(url) = env_string(env::EXPLORER_URL) {
            config.explorer_url = url;
        }
        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.data_dir = Some(dir.into()); self }
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self { self.session_timeout = timeout; self }
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self { self.kdf = kdf; self }
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self { self.rpc_url = url.into(); self }
    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self { self.explorer_url = url.into(); self }
    pub fn with_network_label(mut self, label: impl Into<String>) -> Self { self.network_label = label.into(); self }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL: &[&str] = &[
        env::APP,
        env::DATA_DIR,
        env::SESSION_TIMEOUT_MS,
        env::KDF_MEMORY_KIB,
        env::KDF_ITERATIONS,
        env::KDF_LANES,
        env::RPC_URL,
        env::EXPLORER_URL,
    ];

    fn clear() {
        for key in ALL {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.app, "keyvault");
        assert_eq!(config.session_timeout, Duration::from_millis(300_000));
        assert_eq!(config.kdf, KdfParams::new(19 * 1024, 2, 1));
        assert_eq!(config.network_label, "Sepolia Testnet");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        std::env::set_var(env::APP, "vault-test");
        std::env::set_var(env::SESSION_TIMEOUT_MS, "60000");
        std::env::set_var(env::KDF_MEMORY_KIB, "64");
        std::env::set_var(env::RPC_URL, "http://127.0.0.1:8545");

        let config = VaultConfig::from_env();
        assert_eq!(config.app, "vault-test");
        assert_eq!(config.session_timeout, Duration::from_millis(60_000));
        assert_eq!(config.kdf.memory_kib, 64);
        assert_eq!(config.kdf.iterations, 2);
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        clear();
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        std::env::set_var(env::SESSION_TIMEOUT_MS, "soon");
        let config = VaultConfig::from_env();
        assert_eq!(config.session_timeout, SESSION_TIMEOUT);
        clear();
    }

    #[test]
    fn out_of_range_timeout_falls_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        for raw in ["0", "18446744073709551615", "9223372036854775807"] {
            std::env::set_var(env::SESSION_TIMEOUT_MS, raw);
            assert_eq!(VaultConfig::from_env().session_timeout, SESSION_TIMEOUT, "{raw}");
        }
        clear();
    }
}
