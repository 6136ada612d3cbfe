//! Rift Query — diff registry, graph persistence and the interaction worker

pub mod error;
pub mod hunks;
pub mod service;
pub mod store;
pub mod worker;

pub use error::{QueryError, StoreError};
pub use hunks::{FileHunks, Hunk, parse_unified_diff};
pub use service::{
    DiffId, DiffRecord, DiffRequest, DiffService, FileSummary, Side, SnapshotInput, SymbolDetail, diff_id,
};
pub use store::{FileGraphStore, GraphStore, MemoryGraphStore};
pub use worker::{DerivationOutcome, DerivationState, DerivationWorker};
