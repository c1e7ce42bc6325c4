//! State and validator identifier resolution

use beacon_storage::{ChainStateProvider, StateStore};
use beacon_types::{BeaconState, StateId, ValidatorId, ValidatorIndex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::*;

/// State ID resolver
///
/// Maps a [`StateId`] to a snapshot using the chain provider for named
/// checkpoints and slots, and the state store for roots. A well-formed id with
/// no snapshot resolves to `None`; storage faults are returned as errors.
#[derive(Clone)]
pub struct StateIdResolver {
    chain: Arc<dyn ChainStateProvider>,
    store: Arc<dyn StateStore>,
}

impl StateIdResolver {
    pub fn new(chain: Arc<dyn ChainStateProvider>, store: Arc<dyn StateStore>) -> Self {
        Self { chain, store }
    }

    /// Parse and resolve a textual state id.
    pub async fn resolve_str(&self, state_id: &str) -> Result<Option<Arc<BeaconState>>> {
        let state_id = state_id.parse::<StateId>()?;
        self.resolve(&state_id).await
    }

    /// Resolve a parsed state id.
    pub async fn resolve(&self, state_id: &StateId) -> Result<Option<Arc<BeaconState>>> {
        let fetched = match state_id {
            StateId::Head => self.chain.head_state().await.map(Some),
            StateId::Genesis => self.chain.state_at_slot(0).await,
            StateId::Justified => self.chain.justified_state().await.map(Some),
            StateId::Finalized => self.chain.finalized_state().await.map(Some),
            StateId::Slot(slot) => self.chain.state_at_slot(*slot).await,
            StateId::Root(root) => self.store.state_by_root(root).await,
        };

        match fetched {
            Ok(Some(state)) => {
                debug!(
                    state_id = %state_id,
                    slot = state.slot(),
                    validators = state.validator_count(),
                    "Resolved state"
                );
                Ok(Some(state))
            }
            Ok(None) => {
                debug!(state_id = %state_id, "No state for id");
                Ok(None)
            }
            Err(err) => {
                warn!(state_id = %state_id, error = %err, "State fetch failed");
                Err(err.into())
            }
        }
    }
}

/// Resolve one validator id against `state`'s registry.
pub fn resolve_index(state: &BeaconState, id: &ValidatorId) -> Option<ValidatorIndex> {
    match id {
        ValidatorId::Index(index) if *index < state.validator_count() => Some(*index),
        ValidatorId::Index(_) => None,
        ValidatorId::PublicKey(pubkey) => state.validator_index(pubkey),
    }
}

/// Resolve a batch of ids: unresolved ids are dropped, duplicates keep their
/// first position, and the input order is otherwise preserved.
pub fn resolve_indices(state: &BeaconState, ids: &[ValidatorId]) -> Vec<ValidatorIndex> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter_map(|id| resolve_index(state, id))
        .filter(|index| seen.insert(*index))
        .collect()
}
