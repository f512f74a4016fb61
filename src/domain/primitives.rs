//! Domain primitives: Address, PoolId, Timestamp, Amount.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Account or token identity (20-byte hex, `0x`-prefixed, lowercase).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("address contains non-hex characters")]
    InvalidHex,
}

impl Address {
    /// The null identity. Never a valid token, treasury, or exchange reference.
    pub fn zero() -> Self {
        Address(format!("0x{}", "0".repeat(40)))
    }

    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressParseError::MissingPrefix)?;
        if body.len() != 40 {
            return Err(AddressParseError::InvalidLength(body.len()));
        }
        if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressParseError::InvalidHex);
        }
        Ok(Address(format!("0x{}", body.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::from_str(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool identifier. Dense, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub u64);

impl PoolId {
    pub fn new(id: u64) -> Self {
        PoolId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// SQLite stores integers as i64; ids never approach that range.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time in seconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn new(secs: i64) -> Self {
        Timestamp(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp())
    }

    pub fn saturating_add_secs(&self, secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token or reward amount in base units.
///
/// Serialized as a decimal string since values routinely exceed 2^53.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: u128) -> Self {
        Amount(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    /// Canonical decimal representation used for storage and JSON.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Amount(value)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).sum())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                Amount::from_str(v).map_err(|_| E::custom(format!("invalid amount: {}", v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(v as u128))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u128::try_from(v)
                    .map(Amount)
                    .map_err(|_| E::custom("amount must be non-negative"))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    #[test]
    fn test_address_normalizes_case() {
        let a = addr("0xABCDEF0000000000000000000000000000000001");
        assert_eq!(a.as_str(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert_eq!(
            Address::from_str("abcdef"),
            Err(AddressParseError::MissingPrefix)
        );
        assert_eq!(
            Address::from_str("0x1234"),
            Err(AddressParseError::InvalidLength(4))
        );
        assert_eq!(
            Address::from_str("0xzz00000000000000000000000000000000000000"),
            Err(AddressParseError::InvalidHex)
        );
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::zero().is_zero());
        assert!(!addr("0x0000000000000000000000000000000000000001").is_zero());
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let json = serde_json::to_string(&Amount::new(u128::MAX)).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
    }

    #[test]
    fn test_amount_deserializes_from_number_or_string() {
        let a: Amount = serde_json::from_str("\"500\"").unwrap();
        let b: Amount = serde_json::from_str("500").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<Amount>("-1").is_err());
    }

    #[test]
    fn test_timestamp_saturating_add() {
        assert_eq!(Timestamp::new(0).saturating_add_secs(3600), Timestamp::new(3600));
        assert_eq!(
            Timestamp::new(i64::MAX).saturating_add_secs(1),
            Timestamp::new(i64::MAX)
        );
    }
}
