#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! debpack stages the contents of Debian binary packages: it resolves
//! which source files go into which package, applies the declared
//! filesystem transformations, and emits per-package intermediate
//! manifests ready for `data.tar` assembly.
//!
//! # Design
//!
//! The work happens in the member crates; this crate is the glue:
//!
//! - `vfs` — the in-memory staging tree plus the on-disk scratch area.
//! - `matchers` — pattern objects evaluated against a staging tree.
//! - `pkgs` / `meta` — package, condition, substitution, mode and
//!   ownership types consumed from the manifest layer.
//! - `install` — the shared claim ledger and the install/discard rules.
//! - `transform` — the per-package transformation pipeline.
//! - `manifest` — the intermediate-manifest records and generator.
//!
//! [`BuildDriver`] wires them together for one build invocation:
//! search-dir resolution, the install pass over every rule with one
//! shared [`install::SourcePathMatcher`], the missing-path check, then
//! per package the mode normalization table, the packager's
//! transformations, shebang canonicalization, freeze, and manifest
//! emission.
//!
//! # Errors
//!
//! [`BuildError`] wraps the member crates' errors; the first failure
//! aborts the whole run.

mod driver;
mod error;

pub use driver::{BuildDriver, PackageOutput, PackagePipeline};
pub use error::BuildError;
