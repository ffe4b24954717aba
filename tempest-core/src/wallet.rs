//! Per-client wallet registry
//!
//! Virtual client `i` (1-based) is bound to the wallet configured as
//! `VU_<i>_PK` / `VU_<i>_ADDR`. The registry is populated once before any
//! client starts and is read-only afterwards.

use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::signer::PrivateKey;
use crate::types::Address;

/// A funded account a virtual client signs with
#[derive(Debug, Clone)]
pub struct Wallet {
    address: Address,
    key: PrivateKey,
}

impl Wallet {
    pub fn from_key(key: PrivateKey) -> Self {
        Self {
            address: key.address(),
            key,
        }
    }

    /// Parse a configured key/address pair; the address must match the key
    pub fn from_hex_pair(ordinal: u32, private_key: &str, address: &str) -> Result<Self, ConfigError> {
        let key = PrivateKey::from_hex(private_key).map_err(|e| ConfigError::InvalidKey {
            ordinal,
            reason: e.to_string(),
        })?;
        let configured: Address = address.parse().map_err(|e: crate::types::AddressParseError| {
            ConfigError::InvalidAddress {
                ordinal,
                reason: e.to_string(),
            }
        })?;

        let derived = key.address();
        if configured != derived {
            return Err(ConfigError::AddressMismatch {
                ordinal,
                configured: configured.to_string(),
                derived: derived.to_checksum(),
            });
        }
        Ok(Self::from_key(key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }
}

pub fn private_key_var(ordinal: u32) -> String {
    format!("VU_{}_PK", ordinal)
}

pub fn address_var(ordinal: u32) -> String {
    format!("VU_{}_ADDR", ordinal)
}

/// Ordinal → wallet map, with per-ordinal load failures kept for `resolve`
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    wallets: BTreeMap<u32, Wallet>,
    failures: BTreeMap<u32, ConfigError>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load wallets for ordinals `1..=count` from the process environment
    pub fn from_env(count: u32) -> Self {
        Self::from_lookup(count, |name| std::env::var(name).ok())
    }

    /// Load wallets for ordinals `1..=count` through `lookup`.
    ///
    /// Ordinals with neither variable set are simply absent. A half-configured
    /// or invalid pair is recorded and reported when that ordinal resolves.
    pub fn from_lookup<F>(count: u32, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();
        for ordinal in 1..=count {
            let pk_var = private_key_var(ordinal);
            let addr_var = address_var(ordinal);
            let pk = lookup(&pk_var).filter(|v| !v.trim().is_empty());
            let addr = lookup(&addr_var).filter(|v| !v.trim().is_empty());

            let entry = match (pk, addr) {
                (None, None) => continue,
                (Some(_), None) => Err(ConfigError::MissingEnv(addr_var)),
                (None, Some(_)) => Err(ConfigError::MissingEnv(pk_var)),
                (Some(pk), Some(addr)) => Wallet::from_hex_pair(ordinal, &pk, &addr),
            };
            match entry {
                Ok(wallet) => {
                    registry.insert(ordinal, wallet);
                }
                Err(e) => {
                    registry.failures.insert(ordinal, e);
                }
            }
        }
        registry
    }

    pub fn insert(&mut self, ordinal: u32, wallet: Wallet) -> Option<Wallet> {
        self.failures.remove(&ordinal);
        self.wallets.insert(ordinal, wallet)
    }

    pub fn resolve(&self, ordinal: u32) -> Result<&Wallet, ConfigError> {
        if let Some(wallet) = self.wallets.get(&ordinal) {
            return Ok(wallet);
        }
        Err(self
            .failures
            .get(&ordinal)
            .cloned()
            .unwrap_or(ConfigError::MissingWallet { ordinal }))
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&u32, &ConfigError)> {
        self.failures.iter()
    }
}
