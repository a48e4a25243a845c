#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `pkgs` carries the types the debpack engine consumes from the manifest
//! layer: resolved binary packages, the condition vocabulary used to gate
//! install and transformation rules, and `{{VAR}}` substitution.
//!
//! The YAML manifest itself (and its schema machinery) is out of scope;
//! callers construct these values directly.
//!
//! # Design
//!
//! - [`BinaryPackage`] is a small immutable record: name, architecture and
//!   whether the package is being acted on in this build (packages skipped
//!   by build profiles stay in the set but are inert).
//! - [`ManifestCondition`] is a tagged enum evaluated against a
//!   [`ConditionContext`]; groups compose with all-of/any-of semantics and
//!   negation is structural.
//! - [`Substitution`] expands `{{VAR}}` tokens with fail-on-unknown
//!   semantics and optionally escapes glob metacharacters in substituted
//!   values so a variable cannot smuggle a wildcard into a pattern.

mod condition;
mod package;
mod substitution;

pub use condition::{ConditionContext, ManifestCondition};
pub use package::BinaryPackage;
pub use substitution::{Substitution, SubstitutionError};
