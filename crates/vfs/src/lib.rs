#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `vfs` models the future on-disk layout of one binary package as an
//! in-memory tree of path nodes. Install rules populate the tree from
//! search directories, transformation rules mutate it, and once frozen it
//! is flattened into the intermediate manifest.
//!
//! # Design
//!
//! - [`Fs`] owns every node in an arena; [`NodeId`] is an integer handle.
//!   Parents hold their children in a basename-keyed map and children store
//!   their parent's id, so there are no ownership cycles and a detached
//!   subtree is simply unreachable from the root.
//! - Node kinds (directory, file, symlink) are a tagged enum rather than a
//!   class hierarchy, which keeps invariants such as "symlinks carry no
//!   mode" enforceable by construction.
//! - Traversal ([`Fs::all_paths`], [`WalkCursor`]) is depth-first with
//!   children visited in basename order, parents before children. The
//!   cursor re-checks each candidate when it is yielded, so entries
//!   unlinked mid-walk are never returned stale.
//! - File content lives outside the tree: nodes reference a backing path on
//!   the real filesystem, either the original source file or a staged copy
//!   under the per-invocation scratch directory ([`BuildContext`]).
//!
//! # Invariants
//!
//! - A directory's children are uniquely named; inserting over an existing
//!   name unlinks the previous occupant first.
//! - Files always keep user-read (`0400`) and directories user-read+exec
//!   (`0500`); [`Fs::set_mode`] rejects modes below the minimum.
//! - Mutation requires the tree to be read-write; [`Fs::freeze`] makes it
//!   permanently read-only prior to manifest generation.
//! - The root directory can never be unlinked and is never detached.
//! - Symlink targets are stored verbatim; they are only traversed during
//!   lookup, with a conservative guard that rejects resolving the same
//!   symlink twice within one lookup.
//!
//! # Errors
//!
//! Structural violations (writing to a frozen tree, invalid basenames,
//! unlinking the root, dropping below the minimum mode) are reported as
//! [`VfsError`] and are fatal for the build; they indicate a bug in a rule
//! definition rather than a transient condition.

mod context;
mod error;
mod fs;
mod metadata;
mod scan;
mod walk;

pub use context::BuildContext;
pub use error::VfsError;
pub use fs::{Fs, InsertFileOptions, NodeId, PathKind};
pub use walk::WalkCursor;

#[cfg(test)]
mod tests;
