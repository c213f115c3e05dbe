//! Error types for the vault.
//!
//! Incorrect passwords on unlock are a normal `false`, not an error. Everything
//! here is recoverable: callers show the message inline and carry on.

use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Password already set")]
    PasswordAlreadySet,

    #[error("Vault is locked")]
    Locked,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already exists: {0}")]
    DuplicateAddress(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("{0}")]
    Reveal(#[from] RevealError),

    #[error("Invalid session timeout: {0} ms")]
    InvalidTimeout(u128),

    #[error("internal lock poisoned: {0}")]
    Poisoned(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Cipher failure: {0}")]
    Cipher(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Form-level validation failures. Display text is what the user sees.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Password is required")]
    Required,

    #[error("Password must be at least {0} characters")]
    TooShort(usize),

    #[error("Passwords do not match")]
    Mismatch,
}

/// Reveal-flow failures. Display text is what the user sees.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealError {
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Please confirm your password")]
    ConfirmationRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Failed to decrypt private key")]
    DecryptionFailed,
}

#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid balance response: {0}")]
    Parse(String),
}

#[cfg(feature = "server")]
mod response {
    use super::{RevealError, VaultError};
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use serde_json::json;

    impl VaultError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                VaultError::Validation(_) => StatusCode::BAD_REQUEST,
                VaultError::IncorrectPassword => StatusCode::UNAUTHORIZED,
                VaultError::Locked => StatusCode::LOCKED,
                VaultError::WalletNotFound(_) => StatusCode::NOT_FOUND,
                VaultError::PasswordAlreadySet | VaultError::DuplicateAddress(_) => {
                    StatusCode::CONFLICT
                }
                VaultError::Balance(_) => StatusCode::SERVICE_UNAVAILABLE,
                VaultError::Reveal(e) => match e {
                    RevealError::SessionExpired => StatusCode::LOCKED,
                    RevealError::ConfirmationRequired => StatusCode::BAD_REQUEST,
                    RevealError::IncorrectPassword => StatusCode::UNAUTHORIZED,
                    RevealError::DecryptionFailed => StatusCode::INTERNAL_SERVER_ERROR,
                },
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for VaultError {
        fn into_response(self) -> Response {
            let status = self.status_code();
            let body = Json(json!({
                "error": self.to_string(),
            }));
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_match_form_text() {
        assert_eq!(ValidationError::Required.to_string(), "Password is required");
        assert_eq!(
            ValidationError::TooShort(8).to_string(),
            "Password must be at least 8 characters"
        );
        assert_eq!(ValidationError::Mismatch.to_string(), "Passwords do not match");
    }

    #[test]
    fn reveal_messages_match_ui_text() {
        assert_eq!(
            RevealError::SessionExpired.to_string(),
            "Session expired. Please log in again."
        );
        assert_eq!(RevealError::ConfirmationRequired.to_string(), "Please confirm your password");
        assert_eq!(RevealError::IncorrectPassword.to_string(), "Incorrect password");
        assert_eq!(RevealError::DecryptionFailed.to_string(), "Failed to decrypt private key");
    }

    #[test]
    fn crypto_incorrect_password_lifts_into_vault_error() {
        let err: VaultError = CryptoError::IncorrectPassword.into();
        assert_eq!(err.to_string(), "Crypto error: Incorrect password");
    }

    #[cfg(feature = "server")]
    #[test]
    fn status_codes() {
        use axum::http::StatusCode;
        assert_eq!(VaultError::Locked.status_code(), StatusCode::LOCKED);
        assert_eq!(VaultError::IncorrectPassword.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            VaultError::WalletNotFound("0xabc".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            VaultError::Validation(ValidationError::Mismatch).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            VaultError::from(RevealError::SessionExpired).status_code(),
            StatusCode::LOCKED
        );
    }
}
