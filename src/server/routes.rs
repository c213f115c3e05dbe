//! HTTP routes for the vault

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::forms;
use crate::auth::{CountdownBand, SessionState};
use crate::core::paths::routes;
use crate::error::{VaultError, VaultResult};
use crate::vault::Vault;

#[derive(Clone)]
pub struct VaultState {
    pub vault: Arc<Vault>,
    pub app_name: String,
}

impl VaultState {
    pub fn new(vault: Arc<Vault>, app_name: impl Into<String>) -> Self {
        Self { vault, app_name: app_name.into() }
    }
}

pub fn create_router(vault: Arc<Vault>, app_name: &str) -> Router {
    Router::new()
        .route(routes::HEALTH, get(health))
        .route(routes::AUTH_STATUS, get(auth_status))
        .route(routes::AUTH_SETUP, post(auth_setup))
        .route(routes::AUTH_UNLOCK, put(auth_unlock))
        .route(routes::AUTH_LOCK, put(auth_lock))
        .route(routes::AUTH_RESET, put(auth_reset))
        .route(routes::WALLETS, get(list_wallets).post(generate_wallet))
        .route(routes::WALLET_REVEAL, post(reveal_wallet))
        .route(routes::WALLET_BALANCE, get(wallet_balance))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(VaultState::new(vault, app_name))
}

async fn health(State(s): State<VaultState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.app_name}))
}

#[derive(Deserialize)]
struct SetupRequest {
    password: String,
    confirm: String,
}

#[derive(Deserialize)]
struct PasswordRequest {
    password: String,
}

#[derive(Serialize)]
struct AuthStatusResponse {
    state: SessionState,
    locked: bool,
    initialized: bool,
    unlocked_till: Option<i64>,
    remaining_ms: i64,
    remaining: String,
    band: CountdownBand,
}

#[derive(Serialize)]
struct AuthActionResponse {
    success: bool,
}

async fn auth_status(State(s): State<VaultState>) -> VaultResult<Json<AuthStatusResponse>> {
    let session = s.vault.session();
    let status = session.status()?;
    let countdown = session.countdown()?;
    Ok(Json(AuthStatusResponse {
        state: status.state,
        locked: status.is_locked,
        initialized: status.has_setup_password,
        unlocked_till: status.unlocked_till,
        remaining_ms: countdown.remaining_ms,
        remaining: countdown.formatted(),
        band: countdown.band(),
    }))
}

async fn auth_setup(
    State(s): State<VaultState>,
    Json(payload): Json<SetupRequest>,
) -> VaultResult<Json<AuthActionResponse>> {
    forms::submit_setup(s.vault.session(), &payload.password, &payload.confirm)?;
    Ok(Json(AuthActionResponse { success: true }))
}

async fn auth_unlock(
    State(s): State<VaultState>,
    Json(payload): Json<PasswordRequest>,
) -> Json<AuthActionResponse> {
    let success = forms::submit_unlock(s.vault.session(), &payload.password).is_ok();
    Json(AuthActionResponse { success })
}

async fn auth_lock(State(s): State<VaultState>) -> VaultResult<Json<AuthActionResponse>> {
    let success = s.vault.session().lock_app()?;
    Ok(Json(AuthActionResponse { success }))
}

async fn auth_reset(State(s): State<VaultState>) -> VaultResult<Json<AuthActionResponse>> {
    let success = s.vault.session().reset_timer()?;
    Ok(Json(AuthActionResponse { success }))
}

async fn list_wallets(State(s): State<VaultState>) -> VaultResult<Json<Value>> {
    if s.vault.session().is_locked() {
        return Err(VaultError::Locked);
    }
    let wallets: Vec<Value> = s
        .vault
        .snapshots()?
        .into_iter()
        .map(|card| {
            json!({
                "title": card.title,
                "address": card.address,
                "created_at": card.created_at,
                "created": card.created,
                "explorer": card.explorer,
            })
        })
        .collect();
    Ok(Json(json!({"count": wallets.len(), "wallets": wallets})))
}

async fn generate_wallet(State(s): State<VaultState>) -> VaultResult<Json<Value>> {
    let wallet = s.vault.generate_wallet()?.ok_or(VaultError::Locked)?;
    Ok(Json(json!({
        "address": wallet.address,
        "created_at": wallet.created_at,
        "explorer": s.vault.explorer_link(&wallet.address),
    })))
}

async fn reveal_wallet(
    State(s): State<VaultState>,
    Path(address): Path<String>,
    Json(payload): Json<PasswordRequest>,
) -> VaultResult<Json<Value>> {
    let key = s.vault.reveal(&address, &payload.password)?;
    Ok(Json(json!({
        "address": address,
        "private_key": key.as_str(),
    })))
}

async fn wallet_balance(
    State(s): State<VaultState>,
    Path(address): Path<String>,
) -> VaultResult<Json<Value>> {
    let state = s.vault.load_balance(&address).await?;
    let card = s.vault.card(&address)?;
    Ok(Json(json!({
        "address": card.wallet().address,
        "balance": state,
        "display": card.balance().display(&s.vault.config().network_label),
        "explorer": s.vault.explorer_link(&card.wallet().address),
    })))
}
