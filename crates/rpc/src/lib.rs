//! HTTP API for beacon validator queries
//!
//! Exposes the validator, single-validator and balance endpoints under
//! `/eth/v1/beacon/states/{state_id}/...`, plus health, version and metrics.

pub mod server;
mod validators;

pub use server::{build_router, start_server, AppState, DataResponse};
