//! Validator and balance queries against a resolved state snapshot

use beacon_storage::{ChainStateProvider, StateStore};
use beacon_types::{BeaconState, Epoch, StateId, ValidatorId, ValidatorIndex};
use std::sync::Arc;
use tracing::debug;

use crate::errors::*;
use crate::resolver::{resolve_index, resolve_indices, StateIdResolver};
use crate::types::{BalanceEntry, ValidatorFilter, ValidatorResponse};

/// Validator query service
///
/// Each query fetches one snapshot and answers entirely from it, so a
/// response never mixes registry data from two states.
#[derive(Clone)]
pub struct QueryService {
    resolver: StateIdResolver,
}

impl QueryService {
    pub fn new(chain: Arc<dyn ChainStateProvider>, store: Arc<dyn StateStore>) -> Self {
        Self {
            resolver: StateIdResolver::new(chain, store),
        }
    }

    pub fn resolver(&self) -> &StateIdResolver {
        &self.resolver
    }

    /// List validators matching `filter`, in index-filter order when indices
    /// are given and ascending registry order otherwise.
    pub async fn list_validators(
        &self,
        state_id: &str,
        filter: &ValidatorFilter,
    ) -> Result<Vec<ValidatorResponse>> {
        let state_id = state_id.parse::<StateId>()?;
        self.list_validators_at(&state_id, filter).await
    }

    pub async fn list_validators_at(
        &self,
        state_id: &StateId,
        filter: &ValidatorFilter,
    ) -> Result<Vec<ValidatorResponse>> {
        let state = self.fetch(state_id).await?;
        let epoch = state.current_epoch();

        let candidates = candidate_indices(&state, filter.indices.as_deref());
        let responses = candidates
            .into_iter()
            .filter_map(|index| response_at(&state, index, epoch))
            .filter(|response| filter.admits(response.status))
            .collect::<Vec<_>>();

        debug!(
            state_id = %state_id,
            matched = responses.len(),
            "Listed validators"
        );
        Ok(responses)
    }

    /// Fetch a single validator by index or public key.
    pub async fn get_validator(
        &self,
        state_id: &str,
        validator_id: &str,
    ) -> Result<ValidatorResponse> {
        let state_id = state_id.parse::<StateId>()?;
        let validator_id = validator_id.parse::<ValidatorId>()?;
        self.get_validator_at(&state_id, &validator_id).await
    }

    pub async fn get_validator_at(
        &self,
        state_id: &StateId,
        validator_id: &ValidatorId,
    ) -> Result<ValidatorResponse> {
        let state = self.fetch(state_id).await?;
        resolve_index(&state, validator_id)
            .and_then(|index| response_at(&state, index, state.current_epoch()))
            .ok_or_else(|| ValidatorQueryError::ValidatorNotFound {
                validator_id: *validator_id,
            })
    }

    /// List balances, for every validator when `ids` is `None`.
    pub async fn list_balances<S: AsRef<str>>(
        &self,
        state_id: &str,
        ids: Option<&[S]>,
    ) -> Result<Vec<BalanceEntry>> {
        let state_id = state_id.parse::<StateId>()?;
        let ids = ids.map(crate::types::parse_validator_ids).transpose()?;
        self.list_balances_at(&state_id, ids.as_deref()).await
    }

    pub async fn list_balances_at(
        &self,
        state_id: &StateId,
        ids: Option<&[ValidatorId]>,
    ) -> Result<Vec<BalanceEntry>> {
        let state = self.fetch(state_id).await?;
        let balances = candidate_indices(&state, ids)
            .into_iter()
            .filter_map(|index| {
                state
                    .balance(index)
                    .map(|balance| BalanceEntry { index, balance })
            })
            .collect();
        Ok(balances)
    }

    async fn fetch(&self, state_id: &StateId) -> Result<Arc<BeaconState>> {
        self.resolver
            .resolve(state_id)
            .await?
            .ok_or_else(|| ValidatorQueryError::StateNotFound {
                state_id: *state_id,
            })
    }
}

fn candidate_indices(state: &BeaconState, ids: Option<&[ValidatorId]>) -> Vec<ValidatorIndex> {
    match ids {
        Some(ids) => resolve_indices(state, ids),
        None => (0..state.validator_count()).collect(),
    }
}

fn response_at(
    state: &BeaconState,
    index: ValidatorIndex,
    epoch: Epoch,
) -> Option<ValidatorResponse> {
    let validator = state.validator(index)?;
    let balance = state.balance(index)?;
    Some(ValidatorResponse::build(index, validator, balance, epoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_storage::{Checkpoint, MemoryStorage, StateWriter};
    use beacon_types::{BlsPublicKey, Validator, ValidatorStatus, FAR_FUTURE_EPOCH, SLOTS_PER_EPOCH};

    const HEAD_EPOCH: u64 = 10;

    fn pubkey(seed: u8) -> BlsPublicKey {
        BlsPublicKey([seed; 48])
    }

    /// Ten validators at epoch 10: even indices active, index 1 pending,
    /// index 3 exited, odd indices otherwise active with an exit scheduled.
    fn create_state() -> BeaconState {
        let validators = (0..10u8)
            .map(|i| {
                let base = Validator {
                    activation_eligibility_epoch: 0,
                    activation_epoch: 0,
                    ..Validator::new(pubkey(i), 32_000_000_000)
                };
                match i {
                    1 => Validator {
                        activation_epoch: FAR_FUTURE_EPOCH,
                        ..base
                    },
                    3 => Validator {
                        exit_epoch: 5,
                        withdrawable_epoch: 20,
                        ..base
                    },
                    _ if i % 2 == 0 => base,
                    _ => Validator {
                        exit_epoch: 15,
                        withdrawable_epoch: 30,
                        ..base
                    },
                }
            })
            .collect::<Vec<_>>();
        let balances = (0..10u64).map(|i| 31_000_000_000 + i).collect();
        BeaconState::new(HEAD_EPOCH * SLOTS_PER_EPOCH, validators, balances).expect("valid state")
    }

    fn create_service() -> QueryService {
        let storage = Arc::new(MemoryStorage::with_single_state(create_state()).expect("storage"));
        QueryService::new(storage.clone(), storage)
    }

    fn indices(responses: &[ValidatorResponse]) -> Vec<u64> {
        responses.iter().map(|r| r.index).collect()
    }

    #[tokio::test]
    async fn test_list_all_validators_in_order() {
        let service = create_service();
        let all = service
            .list_validators("head", &ValidatorFilter::new())
            .await
            .unwrap();
        assert_eq!(indices(&all), (0..10).collect::<Vec<_>>());
        assert_eq!(all[4].balance, 31_000_000_004);
        assert_eq!(all[4].pubkey(), &pubkey(4));
    }

    #[tokio::test]
    async fn test_statuses_at_state_epoch() {
        let service = create_service();
        let all = service
            .list_validators("head", &ValidatorFilter::new())
            .await
            .unwrap();
        assert_eq!(all[0].status, ValidatorStatus::ActiveOngoing);
        assert_eq!(all[1].status, ValidatorStatus::PendingQueued);
        assert_eq!(all[3].status, ValidatorStatus::ExitedUnslashed);
        assert_eq!(all[5].status, ValidatorStatus::ActiveExiting);
    }

    #[tokio::test]
    async fn test_mixed_id_batch() {
        let service = create_service();
        let filter = ValidatorFilter::new().with_indices([
            ValidatorId::Index(1),
            ValidatorId::Index(24),
            ValidatorId::PublicKey(pubkey(3)),
            ValidatorId::PublicKey(pubkey(25)),
        ]);
        let listed = service.list_validators("head", &filter).await.unwrap();
        assert_eq!(indices(&listed), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_out_of_range_indices_yield_empty() {
        let service = create_service();
        let filter =
            ValidatorFilter::new().with_indices([ValidatorId::Index(10), ValidatorId::Index(99)]);
        assert!(service
            .list_validators("head", &filter)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_status_filter_with_aggregate() {
        let service = create_service();
        let filter = ValidatorFilter::parse(None::<Vec<&str>>, Some(["active"])).unwrap();
        let active = service.list_validators("head", &filter).await.unwrap();
        assert_eq!(indices(&active), vec![0, 2, 4, 5, 6, 7, 8, 9]);

        let filter = ValidatorFilter::parse(None::<Vec<&str>>, Some(["exited", "pending"])).unwrap();
        let inactive = service.list_validators("head", &filter).await.unwrap();
        assert_eq!(indices(&inactive), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_joint_index_and_status_filter() {
        let service = create_service();
        let filter = ValidatorFilter::parse(Some(["5", "3", "0", "1", "5"]), Some(["active"]))
            .unwrap();
        let listed = service.list_validators("head", &filter).await.unwrap();
        assert_eq!(indices(&listed), vec![5, 0]);
    }

    #[tokio::test]
    async fn test_empty_filters_match_nothing() {
        let service = create_service();
        let no_ids = ValidatorFilter::new().with_indices(Vec::<ValidatorId>::new());
        assert!(service
            .list_validators("head", &no_ids)
            .await
            .unwrap()
            .is_empty());

        let no_statuses = ValidatorFilter::new().with_statuses(Vec::<ValidatorStatus>::new());
        assert!(service
            .list_validators("head", &no_statuses)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_validator_by_index_and_pubkey() {
        let service = create_service();
        let by_index = service.get_validator("head", "7").await.unwrap();
        assert_eq!(by_index.index, 7);

        let key = pubkey(7).to_hex();
        let by_pubkey = service.get_validator("head", &key).await.unwrap();
        assert_eq!(by_pubkey, by_index);
    }

    #[tokio::test]
    async fn test_get_validator_not_found() {
        let service = create_service();
        let err = service.get_validator("head", "10").await.unwrap_err();
        assert!(matches!(
            err,
            ValidatorQueryError::ValidatorNotFound {
                validator_id: ValidatorId::Index(10)
            }
        ));

        let unknown = pubkey(42).to_hex();
        let err = service.get_validator("head", &unknown).await.unwrap_err();
        assert!(err.is_not_found());

        let err = service.get_validator("head", "0xzz").await.unwrap_err();
        assert!(matches!(err, ValidatorQueryError::InvalidValidatorId { .. }));
    }

    #[tokio::test]
    async fn test_list_balances() {
        let service = create_service();
        let all = service.list_balances::<&str>("head", None).await.unwrap();
        assert_eq!(all.len(), 10);
        assert!(all
            .iter()
            .enumerate()
            .all(|(i, entry)| entry.index == i as u64 && entry.balance == 31_000_000_000 + i as u64));

        let key = pubkey(2).to_hex();
        let picked = service
            .list_balances("head", Some(&["9", key.as_str(), "9", "12"][..]))
            .await
            .unwrap();
        assert_eq!(
            picked,
            vec![
                BalanceEntry {
                    index: 9,
                    balance: 31_000_000_009
                },
                BalanceEntry {
                    index: 2,
                    balance: 31_000_000_002
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_balances_for_mixed_id_batch() {
        let service = create_service();
        let ids = [
            ValidatorId::Index(1),
            ValidatorId::Index(24),
            ValidatorId::PublicKey(pubkey(3)),
            ValidatorId::PublicKey(pubkey(25)),
        ];
        let balances = service
            .list_balances_at(&StateId::Head, Some(&ids[..]))
            .await
            .unwrap();
        assert_eq!(
            balances,
            vec![
                BalanceEntry {
                    index: 1,
                    balance: 31_000_000_001
                },
                BalanceEntry {
                    index: 3,
                    balance: 31_000_000_003
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unresolvable_state_for_every_operation() {
        let service = create_service();
        let missing = StateId::Slot(12_345);

        let err = service
            .list_validators_at(&missing, &ValidatorFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValidatorQueryError::StateNotFound { state_id } if state_id == missing
        ));

        let err = service
            .get_validator_at(&missing, &ValidatorId::Index(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorQueryError::StateNotFound { .. }));

        let err = service.list_balances_at(&missing, None).await.unwrap_err();
        assert!(matches!(err, ValidatorQueryError::StateNotFound { .. }));

        let err = service
            .list_balances::<&str>("not-a-state", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorQueryError::InvalidStateId { .. }));
    }

    #[tokio::test]
    async fn test_queries_are_idempotent() {
        let service = create_service();
        let filter = ValidatorFilter::parse(Some(["3", "1", "8"]), None::<Vec<&str>>).unwrap();
        let first = service.list_validators("head", &filter).await.unwrap();
        let second = service.list_validators("head", &filter).await.unwrap();
        assert_eq!(first, second);

        let first = service.get_validator("finalized", "4").await.unwrap();
        let second = service.get_validator("finalized", "4").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_slot_and_root_ids_reach_the_same_snapshot() {
        let storage = MemoryStorage::new();
        let state = create_state();
        let slot = state.slot();
        let root = storage.insert_state(state).expect("insert");
        storage.set_checkpoint(Checkpoint::Head, root).expect("head");
        let storage = Arc::new(storage);
        let service = QueryService::new(storage.clone(), storage);

        let by_slot = service
            .list_balances::<&str>(&slot.to_string(), None)
            .await
            .unwrap();
        let by_root = service
            .list_balances::<&str>(&root.to_hex(), None)
            .await
            .unwrap();
        assert_eq!(by_slot, by_root);
    }
}
