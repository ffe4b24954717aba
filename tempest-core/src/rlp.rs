//! Recursive-length prefix (RLP) encoding
//!
//! Covers the subset needed for legacy transactions: byte strings, unsigned
//! integers in minimal big-endian form, and flat or nested lists. Integers
//! are always encoded without leading zero bytes, so zero encodes as the
//! empty string (`0x80`), never as a literal `0x00` byte.

use crate::types::strip_hex_prefix;

const STRING_OFFSET: u8 = 0x80;
const LIST_OFFSET: u8 = 0xc0;
const SHORT_MAX: usize = 55;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RlpError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("integer is wider than {width} bytes")]
    IntegerOverflow { width: usize },

    #[error("integer has leading zero bytes")]
    LeadingZero,

    #[error("input truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("non-canonical length prefix")]
    NonCanonical,

    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),

    #[error("expected a byte string, found a list")]
    ExpectedBytes,

    #[error("expected a list, found a byte string")]
    ExpectedList,

    #[error("expected {expected} list items, found {found}")]
    ItemCount { expected: usize, found: usize },
}

/// A single RLP item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    /// Empty byte string (also the encoding of integer zero)
    pub fn empty() -> Self {
        Self::Bytes(Vec::new())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn uint(n: u64) -> Self {
        Self::uint_be(&n.to_be_bytes())
    }

    pub fn uint128(n: u128) -> Self {
        Self::uint_be(&n.to_be_bytes())
    }

    /// Integer given as big-endian bytes of any width; leading zeros are dropped
    pub fn uint_be(bytes: &[u8]) -> Self {
        Self::Bytes(trim_leading_zeros(bytes).to_vec())
    }

    /// Raw byte string from a hex literal, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, RlpError> {
        let bytes = hex::decode(strip_hex_prefix(s)).map_err(|_| RlpError::InvalidHex(s.to_string()))?;
        Ok(Self::Bytes(bytes))
    }

    /// Integer from a hex quantity, rejecting values wider than 32 bytes
    pub fn uint_from_hex(s: &str) -> Result<Self, RlpError> {
        let digits = strip_hex_prefix(s);
        let padded = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|_| RlpError::InvalidHex(s.to_string()))?;
        let trimmed = trim_leading_zeros(&bytes);
        if trimmed.len() > 32 {
            return Err(RlpError::IntegerOverflow { width: 32 });
        }
        Ok(Self::Bytes(trimmed.to_vec()))
    }

    pub fn as_bytes(&self) -> Result<&[u8], RlpError> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::List(_) => Err(RlpError::ExpectedBytes),
        }
    }

    pub fn as_list(&self) -> Result<&[RlpItem], RlpError> {
        match self {
            Self::List(items) => Ok(items),
            Self::Bytes(_) => Err(RlpError::ExpectedList),
        }
    }

    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let bytes = self.as_bytes()?;
        let buf = uint_to_array::<8>(bytes)?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn as_u128(&self) -> Result<u128, RlpError> {
        let bytes = self.as_bytes()?;
        let buf = uint_to_array::<16>(bytes)?;
        Ok(u128::from_be_bytes(buf))
    }

    /// 256-bit integer left-padded into 32 bytes
    pub fn as_word(&self) -> Result<[u8; 32], RlpError> {
        uint_to_array::<32>(self.as_bytes()?)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bytes(data) => {
                if data.len() == 1 && data[0] < STRING_OFFSET {
                    out.push(data[0]);
                } else {
                    encode_header(out, data.len(), STRING_OFFSET);
                    out.extend_from_slice(data);
                }
            }
            Self::List(items) => {
                let mut payload = Vec::new();
                for item in items {
                    item.encode_into(&mut payload);
                }
                encode_header(out, payload.len(), LIST_OFFSET);
                out.extend_from_slice(&payload);
            }
        }
    }
}

/// Encode an ordered list of items as one RLP list
pub fn encode_list(items: &[RlpItem]) -> Vec<u8> {
    RlpItem::List(items.to_vec()).encode()
}

/// Decode exactly one item spanning the whole input
pub fn decode(input: &[u8]) -> Result<RlpItem, RlpError> {
    let (item, consumed) = decode_item(input)?;
    if consumed != input.len() {
        return Err(RlpError::TrailingBytes(input.len() - consumed));
    }
    Ok(item)
}

fn decode_item(input: &[u8]) -> Result<(RlpItem, usize), RlpError> {
    let first = *input.first().ok_or(RlpError::Truncated { needed: 1, have: 0 })?;

    match first {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![first]), 1)),
        0x80..=0xb7 => {
            let len = (first - STRING_OFFSET) as usize;
            let data = take(input, 1, len)?;
            if len == 1 && data[0] < STRING_OFFSET {
                return Err(RlpError::NonCanonical);
            }
            Ok((RlpItem::Bytes(data.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            let len = decode_long_length(input, len_of_len)?;
            let data = take(input, 1 + len_of_len, len)?;
            Ok((RlpItem::Bytes(data.to_vec()), 1 + len_of_len + len))
        }
        0xc0..=0xf7 => {
            let len = (first - LIST_OFFSET) as usize;
            let payload = take(input, 1, len)?;
            Ok((RlpItem::List(decode_payload(payload)?), 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let len = decode_long_length(input, len_of_len)?;
            let payload = take(input, 1 + len_of_len, len)?;
            Ok((RlpItem::List(decode_payload(payload)?), 1 + len_of_len + len))
        }
    }
}

fn decode_payload(mut payload: &[u8]) -> Result<Vec<RlpItem>, RlpError> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, consumed) = decode_item(payload)?;
        items.push(item);
        payload = &payload[consumed..];
    }
    Ok(items)
}

fn decode_long_length(input: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
    let len_bytes = take(input, 1, len_of_len)?;
    if len_bytes[0] == 0 {
        return Err(RlpError::NonCanonical);
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(RlpError::IntegerOverflow {
            width: std::mem::size_of::<usize>(),
        });
    }
    let len = len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if len <= SHORT_MAX {
        return Err(RlpError::NonCanonical);
    }
    Ok(len)
}

fn take(input: &[u8], offset: usize, len: usize) -> Result<&[u8], RlpError> {
    let end = offset.checked_add(len).ok_or(RlpError::Truncated {
        needed: usize::MAX,
        have: input.len(),
    })?;
    input.get(offset..end).ok_or(RlpError::Truncated {
        needed: end,
        have: input.len(),
    })
}

fn encode_header(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len <= SHORT_MAX {
        out.push(offset + len as u8);
    } else {
        let len_bytes = trim_leading_zeros(&len.to_be_bytes()).to_vec();
        out.push(offset + SHORT_MAX as u8 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_non_zero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first_non_zero..]
}

fn uint_to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RlpError> {
    if bytes.first() == Some(&0) {
        return Err(RlpError::LeadingZero);
    }
    if bytes.len() > N {
        return Err(RlpError::IntegerOverflow { width: N });
    }
    let mut buf = [0u8; N];
    buf[N - bytes.len()..].copy_from_slice(bytes);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zero_is_empty_string() {
        assert_eq!(RlpItem::uint(0).encode(), vec![0x80]);
        assert_eq!(RlpItem::uint128(0).encode(), vec![0x80]);
        assert_eq!(RlpItem::uint_be(&[0, 0, 0]).encode(), vec![0x80]);
        assert_eq!(RlpItem::uint(0), RlpItem::empty());
    }

    #[test]
    fn test_encode_uint() {
        assert_eq!(RlpItem::uint(1).encode(), vec![0x01]);
        assert_eq!(RlpItem::uint(127).encode(), vec![0x7f]);
        assert_eq!(RlpItem::uint(128).encode(), vec![0x81, 0x80]);
        assert_eq!(RlpItem::uint(256).encode(), vec![0x82, 0x01, 0x00]);
        assert_eq!(RlpItem::uint(1024).encode(), vec![0x82, 0x04, 0x00]);
        assert_eq!(
            RlpItem::uint128(1_000_000_000_000).encode(),
            vec![0x85, 0xe8, 0xd4, 0xa5, 0x10, 0x00]
        );
    }

    #[test]
    fn test_uint_256_is_minimal() {
        let RlpItem::Bytes(payload) = RlpItem::uint(256) else {
            panic!("expected bytes");
        };
        assert_eq!(payload, vec![0x01, 0x00]);
    }

    #[test]
    fn test_encode_bytes() {
        assert_eq!(RlpItem::bytes(vec![]).encode(), vec![0x80]);
        assert_eq!(RlpItem::bytes(vec![0x7f]).encode(), vec![0x7f]);
        assert_eq!(RlpItem::bytes(vec![0x80]).encode(), vec![0x81, 0x80]);
        assert_eq!(RlpItem::bytes(b"dog".to_vec()).encode(), vec![0x83, b'd', b'o', b'g']);

        let long = vec![0xab; 56];
        let encoded = RlpItem::bytes(long.clone()).encode();
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(&encoded[2..], &long[..]);

        let longer = vec![0xcd; 1024];
        let encoded = RlpItem::bytes(longer).encode();
        assert_eq!(&encoded[..3], &[0xb9, 0x04, 0x00]);
        assert_eq!(encoded.len(), 1027);
    }

    #[test]
    fn test_encode_lists() {
        assert_eq!(encode_list(&[]), vec![0xc0]);
        assert_eq!(
            encode_list(&[RlpItem::bytes(b"cat".to_vec()), RlpItem::bytes(b"dog".to_vec())]),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        // [ [], [[]], [ [], [[]] ] ]
        let nested = RlpItem::List(vec![
            RlpItem::List(vec![]),
            RlpItem::List(vec![RlpItem::List(vec![])]),
            RlpItem::List(vec![
                RlpItem::List(vec![]),
                RlpItem::List(vec![RlpItem::List(vec![])]),
            ]),
        ]);
        assert_eq!(nested.encode(), vec![0xc7, 0xc0, 0xc1, 0xc0, 0xc3, 0xc0, 0xc1, 0xc0]);
    }

    #[test]
    fn test_encode_long_list_header() {
        let items: Vec<RlpItem> = (0..60).map(|_| RlpItem::uint(1)).collect();
        let encoded = encode_list(&items);
        assert_eq!(&encoded[..2], &[0xf8, 60]);
        assert_eq!(encoded.len(), 62);
    }

    #[test]
    fn test_from_hex() {
        assert_eq!(RlpItem::from_hex("0xdead").unwrap(), RlpItem::bytes(vec![0xde, 0xad]));
        assert_eq!(RlpItem::from_hex("beef").unwrap(), RlpItem::bytes(vec![0xbe, 0xef]));
        assert_eq!(RlpItem::from_hex("0x").unwrap(), RlpItem::empty());
        assert!(matches!(RlpItem::from_hex("0xabc"), Err(RlpError::InvalidHex(_))));
    }

    #[test]
    fn test_uint_from_hex() {
        assert_eq!(RlpItem::uint_from_hex("0x0").unwrap(), RlpItem::empty());
        assert_eq!(RlpItem::uint_from_hex("0x100").unwrap(), RlpItem::uint(256));
        assert_eq!(RlpItem::uint_from_hex("0x0001e0f3").unwrap(), RlpItem::uint(123123));
        let too_wide = format!("0x1{}", "00".repeat(32));
        assert_eq!(
            RlpItem::uint_from_hex(&too_wide),
            Err(RlpError::IntegerOverflow { width: 32 })
        );
    }

    #[test]
    fn test_decode_roundtrip_nested() {
        let item = RlpItem::List(vec![
            RlpItem::uint(0),
            RlpItem::uint(1024),
            RlpItem::bytes(vec![0x42; 70]),
            RlpItem::List(vec![RlpItem::bytes(b"cat".to_vec())]),
        ]);
        assert_eq!(decode(&item.encode()).unwrap(), item);
    }

    #[test]
    fn test_decode_rejects_non_canonical() {
        // single byte < 0x80 must not carry a prefix
        assert_eq!(decode(&[0x81, 0x05]), Err(RlpError::NonCanonical));
        // long form used for a short string
        let mut bad = vec![0xb8, 0x05];
        bad.extend_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(decode(&bad), Err(RlpError::NonCanonical));
        // length with leading zero
        assert_eq!(decode(&[0xb9, 0x00, 0x40]), Err(RlpError::NonCanonical));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[]), Err(RlpError::Truncated { needed: 1, have: 0 }));
        assert_eq!(decode(&[0x83, b'd']), Err(RlpError::Truncated { needed: 4, have: 2 }));
        assert_eq!(decode(&[0x01, 0x02]), Err(RlpError::TrailingBytes(1)));
    }

    #[test]
    fn test_integer_accessors() {
        assert_eq!(RlpItem::uint(0).as_u64().unwrap(), 0);
        assert_eq!(RlpItem::uint(u64::MAX).as_u64().unwrap(), u64::MAX);
        assert_eq!(RlpItem::uint128(u128::MAX).as_u128().unwrap(), u128::MAX);
        assert_eq!(
            RlpItem::uint128(u64::MAX as u128 + 1).as_u64(),
            Err(RlpError::IntegerOverflow { width: 8 })
        );
        assert_eq!(RlpItem::bytes(vec![0, 1]).as_u64(), Err(RlpError::LeadingZero));
        assert_eq!(RlpItem::List(vec![]).as_u64(), Err(RlpError::ExpectedBytes));

        let word = RlpItem::uint(0x0102).as_word().unwrap();
        assert_eq!(&word[30..], &[0x01, 0x02]);
        assert!(word[..30].iter().all(|&b| b == 0));
    }
}
