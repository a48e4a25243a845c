#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The per-package transformation pipeline. After installation each
//! package's staging tree goes through three phases, in order:
//!
//! 1. built-in permission normalization ([`ModeNormalizationTable`]),
//! 2. the packager's transformations ([`TransformationRule`]) in
//!    manifest order,
//! 3. shebang canonicalization ([`normalize_shebang_lines`]).
//!
//! # Design
//!
//! - [`ModeNormalizationTable`] is an ordered rule table in the style of
//!   `dh_fixperms`: the first rule to reach a path decides its mode and
//!   later rules skip it. Table rules matching nothing are fine.
//! - [`TransformationRule`] covers the manifest's transformation shapes
//!   (remove, move, create-symlink, create-directories, path-metadata).
//!   A packager rule that matches nothing is a hard error; a dead rule
//!   in the manifest is presumed to be a mistake. There is no rollback:
//!   a failing rule leaves earlier rules applied, and the build aborts.
//! - Match sets are materialized before any mutation, so a rule never
//!   observes its own edits mid-walk.
//! - Shebang rewriting preserves the file's mtime; interpreter
//!   canonicalization does not count as a content change.
//!
//! # Errors
//!
//! All phases report [`TransformError`], which carries the offending
//! rule's definition source so diagnostics point at the manifest line
//! rather than at the engine.

mod error;
mod normalize;
mod rules;
mod shebang;

pub use error::TransformError;
pub use normalize::ModeNormalizationTable;
pub use rules::{Capability, SymlinkReplacementRule, TransformationRule};
pub use shebang::{extract_shebang_interpreter, normalize_shebang_lines, DetectedInterpreter};

#[cfg(test)]
mod tests;
