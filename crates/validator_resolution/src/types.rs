//! Query inputs and response records

use beacon_types::{
    quoted_u64, BlsPublicKey, Epoch, Gwei, Validator, ValidatorId, ValidatorIndex,
    ValidatorStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::Result;

/// Validator with its registry index, balance and lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResponse {
    #[serde(with = "quoted_u64")]
    pub index: ValidatorIndex,
    #[serde(with = "quoted_u64")]
    pub balance: Gwei,
    pub status: ValidatorStatus,
    pub validator: Validator,
}

impl ValidatorResponse {
    /// Assemble a response, classifying the validator at `epoch`.
    pub fn build(index: ValidatorIndex, validator: &Validator, balance: Gwei, epoch: Epoch) -> Self {
        Self {
            index,
            balance,
            status: ValidatorStatus::classify(validator, epoch),
            validator: validator.clone(),
        }
    }

    pub fn pubkey(&self) -> &BlsPublicKey {
        &self.validator.pubkey
    }
}

/// Balance of one validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    #[serde(with = "quoted_u64")]
    pub index: ValidatorIndex,
    #[serde(with = "quoted_u64")]
    pub balance: Gwei,
}

/// Filter for validator listings. `None` means "no restriction"; an empty
/// collection matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorFilter {
    pub indices: Option<Vec<ValidatorId>>,
    pub statuses: Option<HashSet<ValidatorStatus>>,
}

impl ValidatorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indices(mut self, ids: impl IntoIterator<Item = ValidatorId>) -> Self {
        self.indices = Some(ids.into_iter().collect());
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ValidatorStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Build a filter from textual ids and status tokens, as received from a
    /// client. Status tokens may be aggregates (`active`, `pending`, ...).
    pub fn parse<I, S>(ids: Option<I>, statuses: Option<S>) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let indices = ids.map(parse_validator_ids).transpose()?;

        let statuses = statuses
            .map(|tokens| -> Result<HashSet<ValidatorStatus>> {
                let mut set = HashSet::new();
                for token in tokens {
                    set.extend(ValidatorStatus::expand_filter(token.as_ref())?);
                }
                Ok(set)
            })
            .transpose()?;

        Ok(Self { indices, statuses })
    }

    pub(crate) fn admits(&self, status: ValidatorStatus) -> bool {
        self.statuses
            .as_ref()
            .map(|statuses| statuses.contains(&status))
            .unwrap_or(true)
    }
}

/// Parse textual validator ids; the first malformed one fails the batch.
pub fn parse_validator_ids<I>(ids: I) -> Result<Vec<ValidatorId>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    ids.into_iter()
        .map(|id| id.as_ref().parse::<ValidatorId>().map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidatorQueryError;
    use beacon_types::FAR_FUTURE_EPOCH;

    #[test]
    fn test_build_classifies_at_epoch() {
        let validator = Validator {
            activation_eligibility_epoch: 0,
            activation_epoch: 5,
            ..Validator::new(BlsPublicKey([3u8; 48]), 32)
        };
        let queued = ValidatorResponse::build(4, &validator, 31, 4);
        assert_eq!(queued.status, ValidatorStatus::PendingQueued);
        assert_eq!(queued.index, 4);
        assert_eq!(queued.balance, 31);
        assert_eq!(queued.pubkey(), &BlsPublicKey([3u8; 48]));

        let active = ValidatorResponse::build(4, &validator, 31, 5);
        assert_eq!(active.status, ValidatorStatus::ActiveOngoing);
    }

    #[test]
    fn test_response_json_shape() {
        let validator = Validator::new(BlsPublicKey([1u8; 48]), u64::MAX);
        let response = ValidatorResponse::build(9, &validator, u64::MAX, 0);
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["index"], "9");
        assert_eq!(json["balance"], u64::MAX.to_string());
        assert_eq!(json["status"], "pending_initialized");
        assert_eq!(
            json["validator"]["activation_epoch"],
            FAR_FUTURE_EPOCH.to_string()
        );

        let entry = BalanceEntry {
            index: 1,
            balance: (1u64 << 53) + 1,
        };
        assert_eq!(
            serde_json::to_string(&entry).expect("serialize"),
            r#"{"index":"1","balance":"9007199254740993"}"#
        );
    }

    #[test]
    fn test_filter_parse_expands_aggregates() {
        let filter =
            ValidatorFilter::parse(Some(["1", "2"]), Some(["active", "exited_slashed"])).unwrap();
        assert_eq!(
            filter.indices,
            Some(vec![ValidatorId::Index(1), ValidatorId::Index(2)])
        );
        let statuses = filter.statuses.expect("statuses");
        assert_eq!(statuses.len(), 4);
        assert!(statuses.contains(&ValidatorStatus::ActiveSlashed));
        assert!(statuses.contains(&ValidatorStatus::ExitedSlashed));
    }

    #[test]
    fn test_filter_parse_rejects_bad_tokens() {
        let err = ValidatorFilter::parse(Some(["1", "bob"]), None::<Vec<&str>>).unwrap_err();
        assert!(matches!(err, ValidatorQueryError::InvalidValidatorId { .. }));

        let err = ValidatorFilter::parse(None::<Vec<&str>>, Some(["sleeping"])).unwrap_err();
        assert!(matches!(err, ValidatorQueryError::InvalidStatus { .. }));
    }

    #[test]
    fn test_filter_admits() {
        let open = ValidatorFilter::new();
        assert!(open.admits(ValidatorStatus::WithdrawalDone));

        let closed = ValidatorFilter::new().with_statuses(Vec::<ValidatorStatus>::new());
        assert!(!closed.admits(ValidatorStatus::ActiveOngoing));

        let active = ValidatorFilter::new().with_statuses([ValidatorStatus::ActiveOngoing]);
        assert!(active.admits(ValidatorStatus::ActiveOngoing));
        assert!(!active.admits(ValidatorStatus::ActiveExiting));
    }
}
