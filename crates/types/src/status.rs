//! Validator lifecycle classification.
//!
//! Every validator maps to exactly one of nine statuses for a given epoch.
//! Slashing does not get its own bucket: it refines the active and exited
//! branches, since a slashed validator still walks the same epoch-driven
//! lifecycle with an earlier forced exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::primitives::{Epoch, FAR_FUTURE_EPOCH};
use crate::validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown validator status: {0}")]
pub struct ParseStatusError(pub String);

impl ValidatorStatus {
    pub const ALL: [ValidatorStatus; 9] = [
        ValidatorStatus::PendingInitialized,
        ValidatorStatus::PendingQueued,
        ValidatorStatus::ActiveOngoing,
        ValidatorStatus::ActiveExiting,
        ValidatorStatus::ActiveSlashed,
        ValidatorStatus::ExitedUnslashed,
        ValidatorStatus::ExitedSlashed,
        ValidatorStatus::WithdrawalPossible,
        ValidatorStatus::WithdrawalDone,
    ];

    const PENDING: &'static [ValidatorStatus] = &[
        ValidatorStatus::PendingInitialized,
        ValidatorStatus::PendingQueued,
    ];
    const ACTIVE: &'static [ValidatorStatus] = &[
        ValidatorStatus::ActiveOngoing,
        ValidatorStatus::ActiveExiting,
        ValidatorStatus::ActiveSlashed,
    ];
    const EXITED: &'static [ValidatorStatus] = &[
        ValidatorStatus::ExitedUnslashed,
        ValidatorStatus::ExitedSlashed,
    ];
    const WITHDRAWAL: &'static [ValidatorStatus] = &[
        ValidatorStatus::WithdrawalPossible,
        ValidatorStatus::WithdrawalDone,
    ];

    /// Classify `validator` at `epoch`. Branches are evaluated in order and the
    /// first match wins; `FAR_FUTURE_EPOCH` is never reached by a real epoch.
    pub fn classify(validator: &Validator, epoch: Epoch) -> Self {
        if validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH {
            return ValidatorStatus::PendingInitialized;
        }

        if validator.activation_epoch == FAR_FUTURE_EPOCH || epoch < validator.activation_epoch {
            return ValidatorStatus::PendingQueued;
        }

        // activation_epoch <= epoch from here on
        if epoch < validator.exit_epoch {
            return if validator.slashed {
                ValidatorStatus::ActiveSlashed
            } else if validator.exit_epoch != FAR_FUTURE_EPOCH {
                ValidatorStatus::ActiveExiting
            } else {
                ValidatorStatus::ActiveOngoing
            };
        }

        // exit_epoch <= epoch from here on
        if epoch < validator.withdrawable_epoch {
            return if validator.slashed {
                ValidatorStatus::ExitedSlashed
            } else {
                ValidatorStatus::ExitedUnslashed
            };
        }

        if validator.effective_balance != 0 {
            ValidatorStatus::WithdrawalPossible
        } else {
            ValidatorStatus::WithdrawalDone
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorStatus::PendingInitialized => "pending_initialized",
            ValidatorStatus::PendingQueued => "pending_queued",
            ValidatorStatus::ActiveOngoing => "active_ongoing",
            ValidatorStatus::ActiveExiting => "active_exiting",
            ValidatorStatus::ActiveSlashed => "active_slashed",
            ValidatorStatus::ExitedUnslashed => "exited_unslashed",
            ValidatorStatus::ExitedSlashed => "exited_slashed",
            ValidatorStatus::WithdrawalPossible => "withdrawal_possible",
            ValidatorStatus::WithdrawalDone => "withdrawal_done",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Expand a status filter token.
    ///
    /// Accepts any concrete status plus the aggregates `pending`, `active`,
    /// `exited` and `withdrawal`.
    pub fn expand_filter(token: &str) -> Result<Vec<ValidatorStatus>, ParseStatusError> {
        let token = token.trim();
        let group = match token {
            "pending" => Self::PENDING,
            "active" => Self::ACTIVE,
            "exited" => Self::EXITED,
            "withdrawal" => Self::WITHDRAWAL,
            other => return other.parse::<ValidatorStatus>().map(|status| vec![status]),
        };
        Ok(group.to_vec())
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidatorStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ParseStatusError(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::BlsPublicKey;

    fn validator(
        eligibility: Epoch,
        activation: Epoch,
        exit: Epoch,
        withdrawable: Epoch,
        slashed: bool,
        effective_balance: u64,
    ) -> Validator {
        Validator {
            activation_eligibility_epoch: eligibility,
            activation_epoch: activation,
            exit_epoch: exit,
            withdrawable_epoch: withdrawable,
            slashed,
            ..Validator::new(BlsPublicKey([7u8; 48]), effective_balance)
        }
    }

    const NEVER: Epoch = FAR_FUTURE_EPOCH;

    #[test]
    fn test_pending_initialized_when_not_eligible() {
        let v = validator(NEVER, NEVER, NEVER, NEVER, false, 32);
        assert_eq!(v.status(0), ValidatorStatus::PendingInitialized);
        // eligibility sentinel wins even if later epochs are set
        let v = validator(NEVER, 0, NEVER, NEVER, false, 32);
        assert_eq!(v.status(10), ValidatorStatus::PendingInitialized);
    }

    #[test]
    fn test_pending_queued() {
        let v = validator(1, NEVER, NEVER, NEVER, false, 32);
        assert_eq!(v.status(100), ValidatorStatus::PendingQueued);
        let v = validator(1, 10, NEVER, NEVER, false, 32);
        assert_eq!(v.status(9), ValidatorStatus::PendingQueued);
        assert_eq!(v.status(10), ValidatorStatus::ActiveOngoing);
    }

    #[test]
    fn test_active_variants() {
        let ongoing = validator(0, 0, NEVER, NEVER, false, 32);
        assert_eq!(ongoing.status(5), ValidatorStatus::ActiveOngoing);

        let exiting = validator(0, 0, 20, 276, false, 32);
        assert_eq!(exiting.status(19), ValidatorStatus::ActiveExiting);

        let slashed = validator(0, 0, 20, 8192, true, 31);
        assert_eq!(slashed.status(19), ValidatorStatus::ActiveSlashed);
    }

    #[test]
    fn test_slashed_with_unscheduled_exit_is_active_slashed() {
        let v = validator(0, 0, NEVER, NEVER, true, 32);
        assert_eq!(v.status(3), ValidatorStatus::ActiveSlashed);
    }

    #[test]
    fn test_exited_variants() {
        let unslashed = validator(0, 0, 20, 276, false, 32);
        assert_eq!(unslashed.status(20), ValidatorStatus::ExitedUnslashed);
        assert_eq!(unslashed.status(275), ValidatorStatus::ExitedUnslashed);

        let slashed = validator(0, 0, 20, 8192, true, 31);
        assert_eq!(slashed.status(20), ValidatorStatus::ExitedSlashed);
    }

    #[test]
    fn test_withdrawal_variants() {
        let possible = validator(0, 0, 20, 276, false, 32);
        assert_eq!(possible.status(276), ValidatorStatus::WithdrawalPossible);

        let done = validator(0, 0, 20, 276, false, 0);
        assert_eq!(done.status(276), ValidatorStatus::WithdrawalDone);

        // slashing does not matter once withdrawable
        let slashed_done = validator(0, 0, 20, 276, true, 0);
        assert_eq!(slashed_done.status(300), ValidatorStatus::WithdrawalDone);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in ValidatorStatus::ALL {
            assert_eq!(status.as_str().parse::<ValidatorStatus>(), Ok(status));
            let json = serde_json::to_string(&status).expect("serialize");
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("active".parse::<ValidatorStatus>().is_err());
    }

    #[test]
    fn test_expand_filter_aggregates() {
        assert_eq!(
            ValidatorStatus::expand_filter("active").unwrap(),
            vec![
                ValidatorStatus::ActiveOngoing,
                ValidatorStatus::ActiveExiting,
                ValidatorStatus::ActiveSlashed,
            ]
        );
        assert_eq!(ValidatorStatus::expand_filter("pending").unwrap().len(), 2);
        assert_eq!(ValidatorStatus::expand_filter("exited").unwrap().len(), 2);
        assert_eq!(ValidatorStatus::expand_filter("withdrawal").unwrap().len(), 2);
        assert_eq!(
            ValidatorStatus::expand_filter("exited_slashed").unwrap(),
            vec![ValidatorStatus::ExitedSlashed]
        );
        assert_eq!(
            ValidatorStatus::expand_filter("slashed"),
            Err(ParseStatusError("slashed".to_string()))
        );
    }
}
