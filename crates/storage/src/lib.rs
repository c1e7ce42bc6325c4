use async_trait::async_trait;
use beacon_types::{BeaconState, Root, Slot, StateError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub mod bundle;

pub use bundle::{import_bundle, BundleSummary, StateBundle};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} checkpoint is not set")]
    MissingCheckpoint(Checkpoint),
    #[error("State {0} is not stored")]
    UnknownRoot(Root),
    #[error("Corrupted record: {0}")]
    Corrupted(String),
    #[error("Invalid state: {0}")]
    InvalidState(#[from] StateError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Named chain checkpoints tracked alongside the states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Head,
    Justified,
    Finalized,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 3] = [Checkpoint::Head, Checkpoint::Justified, Checkpoint::Finalized];

    fn key(&self) -> &'static [u8] {
        match self {
            Checkpoint::Head => b"head_root",
            Checkpoint::Justified => b"justified_root",
            Checkpoint::Finalized => b"finalized_root",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Checkpoint::Head => "head",
            Checkpoint::Justified => "justified",
            Checkpoint::Finalized => "finalized",
        };
        f.write_str(value)
    }
}

/// Source of canonical-chain snapshots.
///
/// Fetching may block on I/O or on regeneration of a historical state; an
/// `Err` is an internal fault and must not be read as "not found".
#[async_trait]
pub trait ChainStateProvider: Send + Sync {
    async fn head_state(&self) -> Result<Arc<BeaconState>>;

    async fn state_at_slot(&self, slot: Slot) -> Result<Option<Arc<BeaconState>>>;

    async fn justified_state(&self) -> Result<Arc<BeaconState>>;

    async fn finalized_state(&self) -> Result<Arc<BeaconState>>;
}

/// Lookup of any stored snapshot by its root, canonical or not.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn state_by_root(&self, root: &Root) -> Result<Option<Arc<BeaconState>>>;
}

/// Write side used to seed a backend with snapshots.
pub trait StateWriter {
    /// Store `state` and make it the canonical snapshot for its slot.
    fn insert_state(&self, state: BeaconState) -> Result<Root>;

    /// Point `checkpoint` at an already stored root.
    fn set_checkpoint(&self, checkpoint: Checkpoint, root: Root) -> Result<()>;
}

/// Sled-backed implementation
pub struct SledStorage {
    db: Db,
    states: Tree,
    slot_index: Tree,
    metadata: Tree,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let states = db.open_tree("states")?;
        let slot_index = db.open_tree("slot_index")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            states,
            slot_index,
            metadata,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored snapshots.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn read_state(&self, root: &Root) -> Result<Option<Arc<BeaconState>>> {
        self.states
            .get(root.as_bytes())?
            .map(|v| serde_json::from_slice::<BeaconState>(&v))
            .transpose()
            .map(|state| state.map(Arc::new))
            .map_err(Into::into)
    }

    fn checkpoint_root(&self, checkpoint: Checkpoint) -> Result<Root> {
        let bytes = self
            .metadata
            .get(checkpoint.key())?
            .ok_or(StorageError::MissingCheckpoint(checkpoint))?;
        decode_root(&bytes)
    }

    fn checkpoint_state(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState>> {
        let root = self.checkpoint_root(checkpoint)?;
        self.read_state(&root)?.ok_or_else(|| {
            StorageError::Corrupted(format!("{checkpoint} points at missing state {root}"))
        })
    }

    /// Collect every stored snapshot and checkpoint into a bundle.
    ///
    /// Snapshots are ordered by slot, and the canonical snapshot of each slot
    /// comes after its forks so that re-importing restores the slot index.
    pub fn export_bundle(&self) -> Result<StateBundle> {
        let mut canonical = HashSet::with_capacity(self.slot_index.len());
        for entry in self.slot_index.iter() {
            let (_, root) = entry?;
            canonical.insert(decode_root(&root)?);
        }

        let mut states = Vec::with_capacity(self.states.len());
        for entry in self.states.iter() {
            let (_, data) = entry?;
            states.push(serde_json::from_slice::<BeaconState>(&data)?);
        }
        states.sort_by_key(|state| (state.slot(), canonical.contains(&state.state_root())));

        Ok(StateBundle {
            states,
            head: self.checkpoint_root(Checkpoint::Head)?,
            justified: self.checkpoint_root(Checkpoint::Justified)?,
            finalized: self.checkpoint_root(Checkpoint::Finalized)?,
        })
    }
}

impl StateWriter for SledStorage {
    fn insert_state(&self, state: BeaconState) -> Result<Root> {
        let root = state.state_root();
        let data = serde_json::to_vec(&state)?;
        self.states.insert(root.as_bytes(), data)?;
        self.slot_index
            .insert(state.slot().to_be_bytes(), &root.as_bytes()[..])?;
        Ok(root)
    }

    fn set_checkpoint(&self, checkpoint: Checkpoint, root: Root) -> Result<()> {
        if !self.states.contains_key(root.as_bytes())? {
            return Err(StorageError::UnknownRoot(root));
        }
        self.metadata.insert(checkpoint.key(), &root.as_bytes()[..])?;
        Ok(())
    }
}

#[async_trait]
impl ChainStateProvider for SledStorage {
    async fn head_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Head)
    }

    async fn state_at_slot(&self, slot: Slot) -> Result<Option<Arc<BeaconState>>> {
        match self.slot_index.get(slot.to_be_bytes())? {
            Some(root) => self.read_state(&decode_root(&root)?),
            None => Ok(None),
        }
    }

    async fn justified_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Justified)
    }

    async fn finalized_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Finalized)
    }
}

#[async_trait]
impl StateStore for SledStorage {
    async fn state_by_root(&self, root: &Root) -> Result<Option<Arc<BeaconState>>> {
        self.read_state(root)
    }
}

fn decode_root(bytes: &[u8]) -> Result<Root> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupted(format!("root record has {} bytes", bytes.len())))?;
    Ok(Root(array))
}

/// In-memory testing backend
#[derive(Clone, Default)]
pub struct MemoryStorage {
    states: Arc<RwLock<HashMap<Root, Arc<BeaconState>>>>,
    slot_index: Arc<RwLock<BTreeMap<Slot, Root>>>,
    checkpoints: Arc<RwLock<HashMap<Checkpoint, Root>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` and point every checkpoint at it.
    pub fn with_single_state(state: BeaconState) -> Result<Self> {
        let storage = Self::new();
        let root = storage.insert_state(state)?;
        for checkpoint in Checkpoint::ALL {
            storage.set_checkpoint(checkpoint, root)?;
        }
        Ok(storage)
    }

    fn checkpoint_state(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState>> {
        let root = *self
            .checkpoints
            .read()
            .get(&checkpoint)
            .ok_or(StorageError::MissingCheckpoint(checkpoint))?;
        self.states.read().get(&root).cloned().ok_or_else(|| {
            StorageError::Corrupted(format!("{checkpoint} points at missing state {root}"))
        })
    }
}

impl StateWriter for MemoryStorage {
    fn insert_state(&self, state: BeaconState) -> Result<Root> {
        let root = state.state_root();
        let slot = state.slot();
        // the state must be readable before its slot entry is published
        self.states.write().insert(root, Arc::new(state));
        self.slot_index.write().insert(slot, root);
        Ok(root)
    }

    fn set_checkpoint(&self, checkpoint: Checkpoint, root: Root) -> Result<()> {
        if !self.states.read().contains_key(&root) {
            return Err(StorageError::UnknownRoot(root));
        }
        self.checkpoints.write().insert(checkpoint, root);
        Ok(())
    }
}

#[async_trait]
impl ChainStateProvider for MemoryStorage {
    async fn head_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Head)
    }

    async fn state_at_slot(&self, slot: Slot) -> Result<Option<Arc<BeaconState>>> {
        let root = match self.slot_index.read().get(&slot) {
            Some(root) => *root,
            None => return Ok(None),
        };
        Ok(self.states.read().get(&root).cloned())
    }

    async fn justified_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Justified)
    }

    async fn finalized_state(&self) -> Result<Arc<BeaconState>> {
        self.checkpoint_state(Checkpoint::Finalized)
    }
}

#[async_trait]
impl StateStore for MemoryStorage {
    async fn state_by_root(&self, root: &Root) -> Result<Option<Arc<BeaconState>>> {
        Ok(self.states.read().get(root).cloned())
    }
}
