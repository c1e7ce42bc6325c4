//! JSON state bundles used to seed a backend.
//!
//! A bundle carries a list of snapshots and the roots the head, justified and
//! finalized checkpoints point at. Snapshots are imported in order, so the
//! last one listed for a slot becomes canonical for that slot.

use anyhow::{Context, Result};
use beacon_types::{BeaconState, Root, Slot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::{Checkpoint, StateWriter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBundle {
    pub states: Vec<BeaconState>,
    pub head: Root,
    pub justified: Root,
    pub finalized: Root,
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub states: usize,
    pub head: Root,
    pub head_slot: Option<Slot>,
}

impl StateBundle {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("failed to read state bundle {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse state bundle {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("failed to write state bundle {}", path.display()))
    }

    fn checkpoints(&self) -> [(Checkpoint, Root); 3] {
        [
            (Checkpoint::Head, self.head),
            (Checkpoint::Justified, self.justified),
            (Checkpoint::Finalized, self.finalized),
        ]
    }
}

/// Write every snapshot of `bundle` into `writer`, then set its checkpoints.
///
/// Checkpoints must reference a snapshot contained in the bundle or already
/// present in the backend.
pub fn import_bundle<W: StateWriter + ?Sized>(
    writer: &W,
    bundle: StateBundle,
) -> Result<BundleSummary> {
    let checkpoints = bundle.checkpoints();
    let head = bundle.head;
    let mut head_slot = None;
    let count = bundle.states.len();

    for state in bundle.states {
        if state.state_root() == head {
            head_slot = Some(state.slot());
        }
        writer
            .insert_state(state)
            .context("failed to store bundled state")?;
    }

    for (checkpoint, root) in checkpoints {
        writer
            .set_checkpoint(checkpoint, root)
            .with_context(|| format!("failed to set {checkpoint} checkpoint"))?;
    }

    info!(states = count, head = %head, "Imported state bundle");

    Ok(BundleSummary {
        states: count,
        head,
        head_slot,
    })
}
