//! Password-based encryption for private keys and the system sentinel.
//!
//! Argon2id stretches the password, AES-256-GCM seals the plaintext. The
//! output is a single base64 string so it can sit next to JSON in storage:
//!
//! ```text
//! version(1) | m_cost(4 LE) | t_cost(4 LE) | p_cost(4 LE) | salt(16) | nonce(12) | ciphertext+tag
//! ```
//!
//! KDF parameters travel with every ciphertext, so changing the configured
//! cost never strands existing wallets.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

const FORMAT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 4 * 3 + SALT_LEN + NONCE_LEN;

// Upper bounds accepted when reading a ciphertext header.
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 64;
const MAX_LANES: u32 = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            lanes: 1,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, lanes: u32) -> Self {
        Self { memory_kib, iterations, lanes }
    }

    /// Smallest cost argon2 accepts. Tests only.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            lanes: 1,
        }
    }

    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(self.memory_kib, self.iterations, self.lanes, Some(KEY_LEN))
            .map_err(|e| CryptoError::Kdf(e.to_string()))
    }

    fn within_limits(&self) -> bool {
        self.memory_kib <= MAX_MEMORY_KIB
            && self.iterations <= MAX_ITERATIONS
            && self.lanes <= MAX_LANES
    }
}

/// Encrypt `plaintext` under a key derived from `password`.
///
/// Salt and nonce are fresh on every call, so encrypting the same value twice
/// gives different strings.
pub fn encrypt(plaintext: &str, password: &str, params: &KdfParams) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password.as_bytes(), &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&params.memory_kib.to_le_bytes());
    out.extend_from_slice(&params.iterations.to_le_bytes());
    out.extend_from_slice(&params.lanes.to_le_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);

    Ok(encode_base64(&out))
}

/// Decrypt a string produced by [`encrypt`].
///
/// A wrong password, or any input that decrypts to nothing usable (bad tag,
/// invalid UTF-8, empty plaintext), is `IncorrectPassword`. Only structural
/// damage to the envelope is `Malformed`.
pub fn decrypt(ciphertext: &str, password: &str) -> Result<Zeroizing<String>, CryptoError> {
    let raw = decode_base64(ciphertext.trim())?;
    if raw.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::Malformed(format!("too short: {} bytes", raw.len())));
    }
    if raw[0] != FORMAT_VERSION {
        return Err(CryptoError::Malformed(format!("unsupported version {}", raw[0])));
    }

    let params = KdfParams {
        memory_kib: read_u32(&raw[1..5])?,
        iterations: read_u32(&raw[5..9])?,
        lanes: read_u32(&raw[9..13])?,
    };
    if !params.within_limits() {
        return Err(CryptoError::Malformed(format!("kdf parameters out of range: {params:?}")));
    }

    let salt = &raw[13..13 + SALT_LEN];
    let nonce = &raw[13 + SALT_LEN..HEADER_LEN];
    let sealed = &raw[HEADER_LEN..];

    let key = derive_key(password.as_bytes(), salt, &params).map_err(|e| match e {
        CryptoError::Kdf(msg) => CryptoError::Malformed(msg),
        other => other,
    })?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::IncorrectPassword)?,
    );

    let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::IncorrectPassword)?;
    if text.is_empty() {
        return Err(CryptoError::IncorrectPassword);
    }
    Ok(Zeroizing::new(text.to_owned()))
}

fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut *key)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(key)
}

fn read_u32(bytes: &[u8]) -> Result<u32, CryptoError> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| CryptoError::Malformed("truncated header".into()))?;
    Ok(u32::from_le_bytes(arr))
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn decode_base64(value: &str) -> Result<Vec<u8>, CryptoError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Malformed(format!("base64: {e}")))
}
