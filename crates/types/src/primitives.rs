//! Scalar aliases and fixed-length byte identifiers shared across the workspace.
//!
//! Byte identifiers serialize as `0x`-prefixed lowercase hex. Integer quantities
//! that may exceed 2^53 serialize as decimal strings through [`quoted_u64`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Slot number.
pub type Slot = u64;
/// Epoch number.
pub type Epoch = u64;
/// Balance in the native sub-unit.
pub type Gwei = u64;
/// Position of a validator inside one state's registry.
pub type ValidatorIndex = u64;

/// Sentinel epoch meaning "not scheduled".
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

/// Number of slots grouped into one epoch.
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Length of a BLS public key in bytes.
pub const PUBLIC_KEY_BYTES: usize = 48;

/// Length of a root hash in bytes.
pub const ROOT_BYTES: usize = 32;

/// Epoch containing `slot`.
pub fn epoch_at_slot(slot: Slot) -> Epoch {
    slot / SLOTS_PER_EPOCH
}

/// Errors produced while decoding fixed-length hex identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Decode a fixed-length hex string with an optional `0x` prefix.
pub fn decode_hex_array<const N: usize>(value: &str) -> Result<[u8; N], HexError> {
    let normalized = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if normalized.len() != N * 2 {
        return Err(HexError::InvalidLength {
            expected: N * 2,
            actual: normalized.len(),
        });
    }

    let mut output = [0u8; N];
    hex::decode_to_slice(normalized, &mut output)
        .map_err(|err| HexError::InvalidHex(err.to_string()))?;
    Ok(output)
}

/// Encode bytes as `0x`-prefixed lowercase hex.
pub fn encode_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// 32-byte root (state root, withdrawal credentials).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Root(pub [u8; ROOT_BYTES]);

impl Root {
    pub const ZERO: Root = Root([0u8; ROOT_BYTES]);

    pub fn from_bytes(bytes: [u8; ROOT_BYTES]) -> Self {
        Root(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex_prefixed(&self.0)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Root({})", self.to_hex())
    }
}

impl FromStr for Root {
    type Err = HexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        decode_hex_array::<ROOT_BYTES>(value).map(Root)
    }
}

impl From<Root> for String {
    fn from(value: Root) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Root {
    type Error = HexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 48-byte BLS public key. Only the encoding is handled here; no curve checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlsPublicKey(pub [u8; PUBLIC_KEY_BYTES]);

impl BlsPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_BYTES]) -> Self {
        BlsPublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex_prefixed(&self.0)
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", self.to_hex())
    }
}

impl FromStr for BlsPublicKey {
    type Err = HexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        decode_hex_array::<PUBLIC_KEY_BYTES>(value).map(BlsPublicKey)
    }
}

impl From<BlsPublicKey> for String {
    fn from(value: BlsPublicKey) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for BlsPublicKey {
    type Error = HexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Serde adapter writing `u64` as a decimal string.
///
/// Deserialization accepts either a decimal string or a bare JSON number so
/// hand-written state bundles stay readable.
pub mod quoted_u64 {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(QuotedU64Visitor)
    }

    struct QuotedU64Visitor;

    impl<'de> Visitor<'de> for QuotedU64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a u64 as a decimal string or integer")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::custom(format!("negative value {value}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value
                .parse::<u64>()
                .map_err(|_| E::custom(format!("invalid u64 string {value:?}")))
        }
    }
}

/// [`quoted_u64`] for sequences.
pub mod quoted_u64_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    struct Quoted(#[serde(with = "super::quoted_u64")] u64);

    pub fn serialize<S>(values: &[u64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|value| Quoted(*value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<Quoted>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|quoted| quoted.0).collect())
    }
}
