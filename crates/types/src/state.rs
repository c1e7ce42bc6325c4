//! Immutable beacon state snapshot.
//!
//! A snapshot owns an ordered validator registry and a parallel balances
//! list. Fields are private so the equal-length invariant holds for every
//! value of the type, including deserialized ones.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::primitives::{
    epoch_at_slot, quoted_u64, quoted_u64_vec, BlsPublicKey, Epoch, Gwei, Root, Slot,
    ValidatorIndex,
};
use crate::validator::Validator;

const STATE_ROOT_CONTEXT: &str = "beacon-state-content-root";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("registry has {validators} validators but {balances} balances")]
    LengthMismatch { validators: usize, balances: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawBeaconState", into = "RawBeaconState")]
pub struct BeaconState {
    slot: Slot,
    state_root: Root,
    validators: Vec<Validator>,
    balances: Vec<Gwei>,
    pubkey_index: OnceCell<HashMap<BlsPublicKey, ValidatorIndex>>,
}

/// Wire form of [`BeaconState`]. `state_root` may be omitted, in which case a
/// content root is derived.
#[derive(Serialize, Deserialize)]
struct RawBeaconState {
    #[serde(with = "quoted_u64")]
    slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_root: Option<Root>,
    validators: Vec<Validator>,
    #[serde(with = "quoted_u64_vec")]
    balances: Vec<Gwei>,
}

impl TryFrom<RawBeaconState> for BeaconState {
    type Error = StateError;

    fn try_from(raw: RawBeaconState) -> Result<Self, Self::Error> {
        match raw.state_root {
            Some(root) => BeaconState::with_root(raw.slot, root, raw.validators, raw.balances),
            None => BeaconState::new(raw.slot, raw.validators, raw.balances),
        }
    }
}

impl From<BeaconState> for RawBeaconState {
    fn from(state: BeaconState) -> Self {
        RawBeaconState {
            slot: state.slot,
            state_root: Some(state.state_root),
            validators: state.validators,
            balances: state.balances,
        }
    }
}

impl BeaconState {
    /// Build a snapshot whose root is a BLAKE3 digest over its contents.
    pub fn new(
        slot: Slot,
        validators: Vec<Validator>,
        balances: Vec<Gwei>,
    ) -> Result<Self, StateError> {
        let root = content_root(slot, &validators, &balances);
        Self::with_root(slot, root, validators, balances)
    }

    /// Build a snapshot with an externally supplied state root.
    pub fn with_root(
        slot: Slot,
        state_root: Root,
        validators: Vec<Validator>,
        balances: Vec<Gwei>,
    ) -> Result<Self, StateError> {
        if validators.len() != balances.len() {
            return Err(StateError::LengthMismatch {
                validators: validators.len(),
                balances: balances.len(),
            });
        }

        Ok(Self {
            slot,
            state_root,
            validators,
            balances,
            pubkey_index: OnceCell::new(),
        })
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn state_root(&self) -> Root {
        self.state_root
    }

    pub fn current_epoch(&self) -> Epoch {
        epoch_at_slot(self.slot)
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn balances(&self) -> &[Gwei] {
        &self.balances
    }

    /// Registry length as a validator index bound.
    pub fn validator_count(&self) -> u64 {
        self.validators.len() as u64
    }

    pub fn validator(&self, index: ValidatorIndex) -> Option<&Validator> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.validators.get(index))
    }

    pub fn balance(&self, index: ValidatorIndex) -> Option<Gwei> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.balances.get(index))
            .copied()
    }

    /// Registry position of `pubkey` in this snapshot.
    ///
    /// The lookup table is built on first use and lives as long as the
    /// snapshot; it never outlives or crosses into another state.
    pub fn validator_index(&self, pubkey: &BlsPublicKey) -> Option<ValidatorIndex> {
        self.pubkey_index
            .get_or_init(|| {
                let mut index = HashMap::with_capacity(self.validators.len());
                for (position, validator) in self.validators.iter().enumerate() {
                    index
                        .entry(validator.pubkey)
                        .or_insert(position as ValidatorIndex);
                }
                index
            })
            .get(pubkey)
            .copied()
    }
}

fn content_root(slot: Slot, validators: &[Validator], balances: &[Gwei]) -> Root {
    let mut hasher = blake3::Hasher::new();
    hasher.update(STATE_ROOT_CONTEXT.as_bytes());
    hasher.update(&slot.to_le_bytes());
    hasher.update(&(validators.len() as u64).to_le_bytes());
    for validator in validators {
        hasher.update(validator.pubkey.as_bytes());
        hasher.update(validator.withdrawal_credentials.as_bytes());
        hasher.update(&validator.effective_balance.to_le_bytes());
        hasher.update(&[validator.slashed as u8]);
        hasher.update(&validator.activation_eligibility_epoch.to_le_bytes());
        hasher.update(&validator.activation_epoch.to_le_bytes());
        hasher.update(&validator.exit_epoch.to_le_bytes());
        hasher.update(&validator.withdrawable_epoch.to_le_bytes());
    }
    for balance in balances {
        hasher.update(&balance.to_le_bytes());
    }
    Root(*hasher.finalize().as_bytes())
}
