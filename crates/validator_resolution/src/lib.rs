//! Validator query service
//!
//! Answers validator and balance queries against beacon state snapshots:
//! - State ids (`head`, `genesis`, `justified`, `finalized`, slot, root)
//! - Validator ids (registry index or BLS public key)
//! - Lifecycle status classification and status filters

pub mod errors;
pub mod query;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use query::*;
pub use resolver::*;
pub use types::*;
