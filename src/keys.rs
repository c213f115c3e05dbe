//! Key generation - secp256k1 key pairs with Ethereum-style addresses.
//!
//! Address = EIP-55 checksummed `0x` + last 20 bytes of
//! keccak256(uncompressed public key without the 0x04 prefix).

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// A freshly generated key pair, private half still in the clear.
pub struct GeneratedKey {
    pub address: String,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Produces new key pairs. Swappable so tests can pin addresses.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> VaultResult<GeneratedKey>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EthKeyGenerator;

impl KeyGenerator for EthKeyGenerator {
    fn generate(&self) -> VaultResult<GeneratedKey> {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut secp256k1::rand::thread_rng());
        let private_key = Zeroizing::new(format!("0x{}", hex::encode(secret.secret_bytes())));
        Ok(GeneratedKey {
            address: address_from_public_key(&public),
            private_key,
        })
    }
}

/// Derive the checksummed address for a `0x`-prefixed (or bare) hex private key.
pub fn address_from_private_key(private_key: &str) -> VaultResult<String> {
    let hex_key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = Zeroizing::new(
        hex::decode(hex_key).map_err(|e| VaultError::KeyGeneration(format!("invalid hex key: {e}")))?,
    );
    let secret = SecretKey::from_slice(&bytes)
        .map_err(|e| VaultError::KeyGeneration(format!("invalid secret key: {e}")))?;
    let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
    Ok(address_from_public_key(&public))
}

fn address_from_public_key(public: &PublicKey) -> String {
    let uncompressed = public.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    to_checksum_address(&hex::encode(&hash[12..]))
}

/// Apply EIP-55 mixed-case checksumming to a 20-byte hex address.
pub fn to_checksum_address(address: &str) -> String {
    let lower = address
        .strip_prefix("0x")
        .unwrap_or(address)
        .to_ascii_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// True for a `0x` + 40 hex character address (case not checked).
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|body| body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip55_vectors() {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(to_checksum_address(&expected.to_lowercase()), expected);
        }
    }

    #[test]
    fn known_private_key_address() {
        let address = address_from_private_key(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(address, "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23");
    }

    #[test]
    fn generated_key_matches_its_address() {
        let key = EthKeyGenerator.generate().unwrap();
        assert!(is_address(&key.address));
        assert!(key.private_key.starts_with("0x"));
        assert_eq!(key.private_key.len(), 66);
        assert_eq!(address_from_private_key(&key.private_key).unwrap(), key.address);
    }

    #[test]
    fn generated_keys_differ() {
        let a = EthKeyGenerator.generate().unwrap();
        let b = EthKeyGenerator.generate().unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn debug_redacts_private_key() {
        let key = EthKeyGenerator.generate().unwrap();
        let printed = format!("{key:?}");
        assert!(!printed.contains(key.private_key.as_str()));
    }

    #[test]
    fn rejects_bad_private_keys() {
        assert!(address_from_private_key("0xzz").is_err());
        assert!(address_from_private_key(&format!("0x{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn address_shape() {
        assert!(is_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_address("0x5aAeb6"));
    }
}
