//! Keccak-256 hashing and secp256k1 ECDSA signing
//!
//! Signatures use RFC 6979 deterministic nonces and are normalized to low-s
//! form, with the recovery id adjusted to match.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::rlp::RlpError;
use crate::types::{strip_hex_prefix, Address};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("invalid secp256k1 private key: {0}")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] RlpError),

    #[error("unexpected recovery id {0}")]
    UnexpectedRecoveryId(u8),

    #[error("malformed signed transaction: {0}")]
    Malformed(String),

    #[error("public key recovery failed: {0}")]
    Recovery(String),
}

/// Keccak-256 (the pre-standard padding, not NIST SHA3-256)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// secp256k1 signing key
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Build from a 32-byte big-endian scalar; zero and values >= n are rejected
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SigningError> {
        let inner = SigningKey::from_slice(bytes)
            .map_err(|_| SigningError::InvalidKey("scalar out of range".to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a hex key with or without `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(strip_hex_prefix(s.trim()))
            .map_err(|e| SigningError::InvalidKey(format!("invalid hex: {}", e)))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SigningError::InvalidKey(format!("private key must be 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(&arr)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn address(&self) -> Address {
        address_of(self.inner.verifying_key())
    }

    /// Sign a 32-byte digest
    pub fn sign_prehash(&self, hash: &[u8; 32]) -> Result<Signature, SigningError> {
        let (sig, recid) = self
            .inner
            .sign_prehash_recoverable(hash)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;

        let (sig, recid) = match sig.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced()),
            ),
            None => (sig, recid),
        };

        let recovery_id = recid.to_byte();
        if recovery_id > 1 {
            return Err(SigningError::UnexpectedRecoveryId(recovery_id));
        }

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(Signature { r, s, recovery_id })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Recoverable ECDSA signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1
    pub recovery_id: u8,
}

impl Signature {
    /// Replay-protected `v` value: `recovery_id + 35 + chain_id * 2`
    pub fn eip155_v(&self, chain_id: u64) -> Result<u64, RlpError> {
        chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + self.recovery_id as u64))
            .ok_or(RlpError::IntegerOverflow { width: 8 })
    }

    /// Split a replay-protected `v` into `(chain_id, recovery_id)`
    pub fn split_eip155_v(v: u64) -> Option<(u64, u8)> {
        if v < 35 {
            return None;
        }
        Some(((v - 35) / 2, ((v - 35) % 2) as u8))
    }

    /// Recover the signer address for the given digest
    pub fn recover_address(&self, hash: &[u8; 32]) -> Result<Address, SigningError> {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        let sig = EcdsaSignature::from_slice(&bytes)
            .map_err(|e| SigningError::Recovery(e.to_string()))?;
        let recid = RecoveryId::from_byte(self.recovery_id)
            .ok_or(SigningError::UnexpectedRecoveryId(self.recovery_id))?;
        let key = VerifyingKey::recover_from_prehash(hash, &sig, recid)
            .map_err(|e| SigningError::Recovery(e.to_string()))?;
        Ok(address_of(&key))
    }
}

/// Address = last 20 bytes of keccak256(uncompressed public key without the 0x04 tag)
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}
