//! Git abstraction layer for bibsync.
//!
//! This crate defines the [`GitRepo`] trait, the single interface through
//! which the sync engine interacts with git. Nothing outside this crate
//! imports gix directly; callers depend on `bibsync-git` and program against
//! the trait, which also makes the engine testable against fakes.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`GitRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`TreeEdit`], [`PushOutcome`], etc.).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// gix-backed implementation modules
mod gix_repo;
mod index_impl;
mod objects_impl;
mod refs_impl;
mod transport_impl;

pub use gix_repo::GixRepo;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use bibsync_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use repo::GitRepo;
pub use types::{
    CommitInfo, EntryMode, FetchOutcome, GitOid, OidParseError, PushOutcome, RefName,
    RefNameError, TreeEdit, TreeEntry,
};
