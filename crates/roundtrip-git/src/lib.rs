//! Git object layer for round-trip code generation.
//!
//! This crate defines the [`GitRepo`] trait, the single interface through
//! which the round-trip engine touches a repository: blobs, trees, commits,
//! refs (with compare-and-swap), conflict stages in the index, and remote
//! sync of generation snapshots. Nothing outside this crate imports gix.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`GitRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`IndexEntry`], etc.).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// gix-backed implementation modules
mod gix_repo;
mod index_impl;
mod objects_impl;
mod refs_impl;
mod remote_impl;

pub use gix_repo::GixRepo;

pub use error::GitError;
pub use repo::GitRepo;
pub use types::{
    CommitInfo, EntryMode, GitOid, IndexEntry, OidParseError, RefEdit, RefName,
    RefNameError, TreeEntry, git_tree_order,
};
