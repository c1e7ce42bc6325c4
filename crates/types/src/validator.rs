use serde::{Deserialize, Serialize};

use crate::primitives::{quoted_u64, BlsPublicKey, Epoch, Gwei, Root, FAR_FUTURE_EPOCH};
use crate::status::ValidatorStatus;

/// Validator record as stored in a state's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub pubkey: BlsPublicKey,
    #[serde(default)]
    pub withdrawal_credentials: Root,
    #[serde(with = "quoted_u64")]
    pub effective_balance: Gwei,
    pub slashed: bool,
    #[serde(with = "quoted_u64")]
    pub activation_eligibility_epoch: Epoch,
    #[serde(with = "quoted_u64")]
    pub activation_epoch: Epoch,
    #[serde(with = "quoted_u64")]
    pub exit_epoch: Epoch,
    #[serde(with = "quoted_u64")]
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    /// A freshly deposited validator with every lifecycle epoch unscheduled.
    pub fn new(pubkey: BlsPublicKey, effective_balance: Gwei) -> Self {
        Self {
            pubkey,
            withdrawal_credentials: Root::ZERO,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    /// Lifecycle status at `epoch`.
    pub fn status(&self, epoch: Epoch) -> ValidatorStatus {
        ValidatorStatus::classify(self, epoch)
    }

    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }
}
