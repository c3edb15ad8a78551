//! bibsync library crate.
//!
//! Record-level three-way merge and git synchronization for BibTeX files.
//! The `bibsync` binary is a thin CLI over [`sync::SyncEngine`]; everything
//! is exposed here so integration tests and other tools can drive the engine
//! directly.
//!
//! - [`record`]: records, identity keys and ordered collections.
//! - [`codec`]: `.bib` bytes ↔ [`record::RecordCollection`].
//! - [`merge`]: the record differ, conflict model and resolvers.
//! - [`revision`]: cached reads of file contents at a commit.
//! - [`sync`]: the fetch → merge → commit → push state machine.

pub mod codec;
pub mod config;
pub mod error;
pub mod merge;
pub mod record;
pub mod revision;
pub mod sync;
pub mod telemetry;

pub use error::SyncError;
pub use merge::{ConflictResolver, MergeResult};
pub use sync::{CancelToken, SyncEngine, SyncPhase};
