//! Setup and unlock form handling.

use thiserror::Error;

use super::Session;
use crate::error::{ValidationError, VaultError};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum FormError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<FormError> for VaultError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::Validation(v) => VaultError::Validation(v),
            FormError::IncorrectPassword => VaultError::IncorrectPassword,
            FormError::Vault(e) => e,
        }
    }
}

pub fn validate_setup(password: &str, confirm: &str) -> Result<(), ValidationError> {
    validate_password(password)?;
    if password != confirm {
        return Err(ValidationError::Mismatch);
    }
    Ok(())
}

pub fn validate_unlock(password: &str) -> Result<(), ValidationError> {
    validate_password(password)
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort(MIN_PASSWORD_LEN));
    }
    Ok(())
}

pub fn submit_setup(session: &Session, password: &str, confirm: &str) -> Result<(), FormError> {
    validate_setup(password, confirm)?;
    session.setup_password(password)?;
    Ok(())
}

pub fn submit_unlock(session: &Session, password: &str) -> Result<(), FormError> {
    validate_unlock(password)?;
    if session.unlock_app(password) {
        Ok(())
    } else {
        Err(FormError::IncorrectPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::KdfParams;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            super::super::SESSION_TIMEOUT,
            KdfParams::insecure_fast(),
        )
        .unwrap()
    }

    #[test]
    fn setup_validation_order() {
        assert_eq!(validate_setup("", ""), Err(ValidationError::Required));
        assert_eq!(validate_setup("short", "short"), Err(ValidationError::TooShort(8)));
        assert_eq!(validate_setup("password123", "password124"), Err(ValidationError::Mismatch));
        assert_eq!(validate_setup("password123", "password123"), Ok(()));
    }

    #[test]
    fn unlock_validation() {
        assert_eq!(validate_unlock(""), Err(ValidationError::Required));
        assert_eq!(validate_unlock("1234567"), Err(ValidationError::TooShort(8)));
        assert_eq!(validate_unlock("12345678"), Ok(()));
    }

    #[test]
    fn submit_setup_then_unlock() {
        let session = session();
        let err = submit_setup(&session, "password123", "nope").unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(!session.has_setup_password());

        submit_setup(&session, "password123", "password123").unwrap();
        session.lock_app().unwrap();

        let err = submit_unlock(&session, "password124").unwrap_err();
        assert!(matches!(err, FormError::IncorrectPassword));
        assert_eq!(err.to_string(), "Incorrect password");

        submit_unlock(&session, "password123").unwrap();
        assert!(!session.is_locked());
    }

    #[test]
    fn second_setup_surfaces_vault_error() {
        let session = session();
        submit_setup(&session, "password123", "password123").unwrap();
        let err = submit_setup(&session, "password456", "password456").unwrap_err();
        assert!(matches!(err, FormError::Vault(VaultError::PasswordAlreadySet)));
    }
}
