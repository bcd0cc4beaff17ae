//! Identifier derivation and name validation.
//!
//! Every machine, state and action is addressed by a 4-byte identifier
//! derived from its name: the first four bytes of the Keccak-256 digest of
//! the name's UTF-8 bytes. Identifiers are never assigned, only derived, so
//! any party holding a name can compute the id without a central registry.
//!
//! Names follow one of two policies:
//!
//! - **strict** (machine and state names): an ASCII letter followed by
//!   letters, digits or `_`. These names feed guard selector derivation and
//!   must be unambiguous tokens.
//! - **lax** (action names): a non-empty run of letters, digits, `_` or
//!   space. Action names are display text and never derive a selector.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// A 4-byte name-derived identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id([u8; 4]);

impl Id {
    /// The zero id. Never derived from a name in practice; marks "unset".
    pub const ZERO: Id = Id([0; 4]);

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Derives the identifier for a name.
    pub fn derive(name: &str) -> Self {
        let digest = Keccak256::digest(name.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest[..4]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

/// Error parsing an [`Id`] or [`crate::Address`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex value '{input}': expected 0x followed by {expected} hex digits")]
pub struct ParseHexError {
    pub input: String,
    pub expected: usize,
}

pub(crate) fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let err = || ParseHexError {
        input: s.to_string(),
        expected: N * 2,
    };
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != N * 2 {
        return Err(err());
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| err())?;
    Ok(out)
}

impl FromStr for Id {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex::<4>(s).map(Id)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Derives the identifier for a name.
pub fn derive_id(name: &str) -> Id {
    Id::derive(name)
}

/// Returns true iff `id` is the identifier derived from `name`.
pub fn validate_id(name: &str, id: Id) -> bool {
    Id::derive(name) == id
}

/// Strict policy: `^[A-Za-z][A-Za-z0-9_]*$`.
pub fn validate_name_strict(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Lax policy: `^[A-Za-z0-9_ ]+$`.
pub fn validate_name_lax(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids() {
        assert_eq!(Id::derive("NightClub").to_string(), "0xf1b3092a");
        assert_eq!(Id::derive("Home").to_string(), "0x13728da8");
        assert_eq!(Id::derive("Meditate").to_string(), "0x05c79070");
        assert_eq!(Id::derive("Be").to_string(), "0x0ed7822d");
        assert_eq!(Id::derive("Inhale").to_string(), "0x92b8da8b");
    }

    #[test]
    fn test_validate_id() {
        let id = derive_id("Locked");
        assert!(validate_id("Locked", id));
        assert!(!validate_id("locked", id));

        let mut bytes = *id.as_bytes();
        bytes[3] ^= 0x01;
        assert!(!validate_id("Locked", Id::from_bytes(bytes)));
    }

    #[test]
    fn test_hex_roundtrip() {
        let id: Id = "0x10bc01d6".parse().unwrap();
        assert_eq!(id, Id::derive("Locked"));
        assert!("0x10bc01".parse::<Id>().is_err());
        assert!("0xzzbc01d6".parse::<Id>().is_err());

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0x10bc01d6\"");
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_strict_names() {
        assert!(validate_name_strict("Closed"));
        assert!(validate_name_strict("VIP_Lounge"));
        assert!(validate_name_strict("a1"));
        assert!(!validate_name_strict(""));
        assert!(!validate_name_strict("1st"));
        assert!(!validate_name_strict("_hidden"));
        assert!(!validate_name_strict("Has Space"));
        assert!(!validate_name_strict("dash-name"));
    }

    #[test]
    fn test_lax_names() {
        assert!(validate_name_lax("Go chill with the fabulous people"));
        assert!(validate_name_lax("Inhale"));
        assert!(validate_name_lax("2 steps_back"));
        assert!(!validate_name_lax(""));
        assert!(!validate_name_lax("Exit!"));
        assert!(!validate_name_lax("tab\there"));
    }

    #[test]
    fn test_zero() {
        assert!(Id::ZERO.is_zero());
        assert!(!Id::derive("").is_zero());
    }
}
