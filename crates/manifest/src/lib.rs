#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The intermediate manifest: a JSON-serializable list of [`TarMember`]
//! records that fully describes a package's `data.tar` contents. It is
//! the contract between the staging engine (which owns the tree) and
//! the archive assembler (which never looks at the tree).
//!
//! # Design
//!
//! - [`generate_intermediate_manifest`] flattens a finished staging
//!   tree. Every member's mtime is clamped to the reproducibility
//!   cutoff, and symlinks are emitted after all other members with
//!   their targets rewritten per Debian Policy 10.5
//!   ([`debian_policy_normalize_symlink_target`]).
//! - Regular files always reference their backing path; directories and
//!   symlinks may be virtual entries with no content behind them.
//! - [`parse_intermediate_manifest`] validates the ordering invariant
//!   (no member before its directory) so a hand-edited manifest cannot
//!   produce a `data.tar` stock `dpkg` chokes on.
//!
//! # Errors
//!
//! All operations report [`ManifestError`].

mod error;
mod generate;
mod member;
mod symlink;

pub use error::ManifestError;
pub use generate::generate_intermediate_manifest;
pub use member::{
    parse_intermediate_manifest, write_intermediate_manifest, IntermediateManifest, PathType,
    TarMember,
};
pub use symlink::debian_policy_normalize_symlink_target;
