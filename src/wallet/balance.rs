//! Balance lookups over Ethereum JSON-RPC.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::error::BalanceError;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

#[async_trait]
pub trait BalanceClient: Send + Sync {
    /// Balance in ether, formatted like `"0.0"` or `"1.5"`.
    async fn fetch_balance(&self, address: &str) -> Result<String, BalanceError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `eth_getBalance` against a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcBalanceClient {
    client: reqwest::Client,
    url: String,
}

impl RpcBalanceClient {
    pub fn new(url: impl Into<String>) -> Result<Self, BalanceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BalanceClient for RpcBalanceClient {
    async fn fetch_balance(&self, address: &str) -> Result<String, BalanceError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address, "latest"],
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(BalanceError::Status(response.status().as_u16()));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(BalanceError::Rpc { code: err.code, message: err.message });
        }
        let quantity = body
            .result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| BalanceError::Parse("missing result".into()))?;

        let wei = parse_quantity(quantity)?;
        debug!(address, wei = %wei, "balance fetched");
        Ok(format_ether(wei))
    }
}

/// Parse a JSON-RPC hex quantity (`0x1bc16d674ec80000`).
pub fn parse_quantity(quantity: &str) -> Result<u128, BalanceError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| BalanceError::Parse(format!("not a hex quantity: {quantity}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| BalanceError::Parse(format!("{quantity}: {e}")))
}

/// Wei to a decimal ether string. Always has a fractional part.
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    if frac == 0 {
        return format!("{whole}.0");
    }
    let frac = format!("{frac:018}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "balance", rename_all = "snake_case")]
pub enum BalanceState {
    Idle,
    Loading,
    Loaded(String),
    Failed,
}

/// One wallet's balance display. Failures degrade to the text `Error`.
#[derive(Debug, Clone)]
pub struct BalanceView {
    address: String,
    state: Arc<Mutex<BalanceState>>,
}

impl BalanceView {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(BalanceState::Idle)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> BalanceState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(BalanceState::Failed)
    }

    fn set(&self, next: BalanceState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Fetch and store the balance. Never fails; errors become `Failed`.
    pub async fn load(&self, client: &dyn BalanceClient) -> BalanceState {
        self.set(BalanceState::Loading);
        let next = match client.fetch_balance(&self.address).await {
            Ok(balance) => BalanceState::Loaded(balance),
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to fetch balance");
                BalanceState::Failed
            }
        };
        self.set(next.clone());
        next
    }

    pub fn is_loading(&self) -> bool {
        self.state() == BalanceState::Loading
    }

    /// `"fetching..."` while loading, otherwise `"<balance> ETH (<network>)"`.
    pub fn display(&self, network_label: &str) -> String {
        let balance = match self.state() {
            BalanceState::Loading => return "fetching...".to_string(),
            BalanceState::Loaded(balance) if !balance.is_empty() => balance,
            BalanceState::Failed => "Error".to_string(),
            _ => "0".to_string(),
        };
        format!("{balance} ETH ({network_label})")
    }

    pub fn explorer_link(&self, explorer_url: &str) -> String {
        explorer_link(explorer_url, &self.address)
    }
}

pub fn explorer_link(explorer_url: &str, address: &str) -> String {
    format!("{explorer_url}{address}")
}
