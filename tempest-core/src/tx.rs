//! Legacy (type 0) value-transfer transactions with EIP-155 replay protection
//!
//! Signing payload: `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, "", ""])`.
//! Signed encoding: `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`
//! with `v = recovery_id + 35 + chainId * 2`.

use crate::rlp::{self, RlpItem};
use crate::signer::{keccak256, PrivateKey, Signature, SigningError};
use crate::types::Address;

/// Unsigned transaction fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFields {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    /// Transfer amount in wei
    pub value: u128,
    /// Empty for plain transfers
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl TransactionFields {
    /// The six value fields shared by the signing payload and the signed encoding
    fn value_items(&self) -> Vec<RlpItem> {
        vec![
            RlpItem::uint(self.nonce),
            RlpItem::uint128(self.gas_price),
            RlpItem::uint(self.gas_limit),
            RlpItem::bytes(self.to.as_bytes().to_vec()),
            RlpItem::uint128(self.value),
            RlpItem::bytes(self.data.clone()),
        ]
    }

    pub fn signing_payload(&self) -> Vec<u8> {
        let mut items = self.value_items();
        items.push(RlpItem::uint(self.chain_id));
        items.push(RlpItem::empty());
        items.push(RlpItem::empty());
        rlp::encode_list(&items)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    /// Hash, sign and assemble the broadcast-ready encoding
    pub fn sign(self, key: &PrivateKey) -> Result<SignedTransaction, SigningError> {
        let hash = self.signing_hash();
        let signature = key.sign_prehash(&hash)?;
        SignedTransaction::assemble(self, signature)
    }
}

/// A signed transaction and its wire encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    fields: TransactionFields,
    signature: Signature,
    v: u64,
    raw: Vec<u8>,
}

impl SignedTransaction {
    pub fn assemble(fields: TransactionFields, signature: Signature) -> Result<Self, SigningError> {
        let v = signature.eip155_v(fields.chain_id)?;

        let mut items = fields.value_items();
        items.push(RlpItem::uint(v));
        items.push(RlpItem::uint_be(&signature.r));
        items.push(RlpItem::uint_be(&signature.s));
        let raw = rlp::encode_list(&items);

        Ok(Self {
            fields,
            signature,
            v,
            raw,
        })
    }

    /// Parse a signed legacy transaction; only replay-protected `v` values are accepted
    pub fn decode(raw: &[u8]) -> Result<Self, SigningError> {
        let item = rlp::decode(raw)?;
        let items = item.as_list()?;
        if items.len() != 9 {
            return Err(rlp::RlpError::ItemCount {
                expected: 9,
                found: items.len(),
            }
            .into());
        }

        let to = Address::from_slice(items[3].as_bytes()?).ok_or_else(|| {
            SigningError::Malformed("recipient must be a 20-byte address".to_string())
        })?;
        let v = items[6].as_u64()?;
        let (chain_id, recovery_id) = Signature::split_eip155_v(v)
            .ok_or_else(|| SigningError::Malformed(format!("v={} is not replay-protected", v)))?;

        let fields = TransactionFields {
            nonce: items[0].as_u64()?,
            gas_price: items[1].as_u128()?,
            gas_limit: items[2].as_u64()?,
            to,
            value: items[4].as_u128()?,
            data: items[5].as_bytes()?.to_vec(),
            chain_id,
        };
        let signature = Signature {
            r: items[7].as_word()?,
            s: items[8].as_word()?,
            recovery_id,
        };

        Ok(Self {
            fields,
            signature,
            v,
            raw: raw.to_vec(),
        })
    }

    pub fn decode_hex(s: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(crate::types::strip_hex_prefix(s))
            .map_err(|e| SigningError::Malformed(format!("invalid hex: {}", e)))?;
        Self::decode(&bytes)
    }

    pub fn fields(&self) -> &TransactionFields {
        &self.fields
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn v(&self) -> u64 {
        self.v
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// `0x`-prefixed hex, the `eth_sendRawTransaction` parameter
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// Transaction hash as reported by the node
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.raw)
    }

    pub fn recover_signer(&self) -> Result<Address, SigningError> {
        self.signature.recover_address(&self.fields.signing_hash())
    }
}
