//! Identifiers accepted at the query boundary.
//!
//! Both are parsed once from their textual form; code past the boundary only
//! ever matches on the enum.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::primitives::{
    BlsPublicKey, Root, Slot, ValidatorIndex, PUBLIC_KEY_BYTES, ROOT_BYTES,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid state id: {0}")]
pub struct InvalidStateId(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid validator id: {0}")]
pub struct InvalidValidatorId(pub String);

/// Reference to a point-in-time chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    Head,
    Genesis,
    Justified,
    Finalized,
    Slot(Slot),
    Root(Root),
}

impl FromStr for StateId {
    type Err = InvalidStateId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        match value {
            "head" => return Ok(StateId::Head),
            "genesis" => return Ok(StateId::Genesis),
            "justified" => return Ok(StateId::Justified),
            "finalized" => return Ok(StateId::Finalized),
            _ => {}
        }

        if is_decimal(value) {
            if let Ok(slot) = value.parse::<Slot>() {
                return Ok(StateId::Slot(slot));
            }
        }

        if is_prefixed_hex_of_len(value, ROOT_BYTES) {
            return value
                .parse::<Root>()
                .map(StateId::Root)
                .map_err(|_| InvalidStateId(value.to_string()));
        }

        Err(InvalidStateId(value.to_string()))
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateId::Head => f.write_str("head"),
            StateId::Genesis => f.write_str("genesis"),
            StateId::Justified => f.write_str("justified"),
            StateId::Finalized => f.write_str("finalized"),
            StateId::Slot(slot) => write!(f, "{slot}"),
            StateId::Root(root) => write!(f, "{root}"),
        }
    }
}

/// Validator named either by registry index or by public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidatorId {
    Index(ValidatorIndex),
    PublicKey(BlsPublicKey),
}

impl From<ValidatorIndex> for ValidatorId {
    fn from(index: ValidatorIndex) -> Self {
        ValidatorId::Index(index)
    }
}

impl From<BlsPublicKey> for ValidatorId {
    fn from(pubkey: BlsPublicKey) -> Self {
        ValidatorId::PublicKey(pubkey)
    }
}

impl FromStr for ValidatorId {
    type Err = InvalidValidatorId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if is_decimal(value) {
            if let Ok(index) = value.parse::<ValidatorIndex>() {
                return Ok(ValidatorId::Index(index));
            }
        }

        if is_prefixed_hex_of_len(value, PUBLIC_KEY_BYTES) {
            return value
                .parse::<BlsPublicKey>()
                .map(ValidatorId::PublicKey)
                .map_err(|_| InvalidValidatorId(value.to_string()));
        }

        Err(InvalidValidatorId(value.to_string()))
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorId::Index(index) => write!(f, "{index}"),
            ValidatorId::PublicKey(pubkey) => write!(f, "{pubkey}"),
        }
    }
}

fn is_decimal(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// True when `value` has the shape of `bytes` hex-encoded bytes, `0x` optional.
fn is_prefixed_hex_of_len(value: &str, bytes: usize) -> bool {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    digits.len() == bytes * 2
}
