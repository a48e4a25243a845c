#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `meta` models the file metadata vocabulary shared by the debpack
//! workspace: filesystem modes (octal or symbolic `chmod`-style specs) and
//! static ownership definitions for tar members.
//!
//! # Design
//!
//! - [`FileSystemMode`] is either a fixed octal value or a parsed list of
//!   symbolic clauses (`u+rw,go=rX,a-s`). Symbolic clauses are resolved
//!   against a path's current mode via [`FileSystemMode::compute_mode`],
//!   which needs to know whether the path is a directory for the
//!   conditional `X` permission.
//! - [`StaticOwner`] and [`StaticGroup`] name the owner and group a path is
//!   recorded with. Packages must use static system identities; dynamic
//!   uid/gid ranges are rejected at construction.
//!
//! # Errors
//!
//! Parsing and mode computation report [`ModeError`]; ownership validation
//! reports [`OwnershipError`]. Both are fatal for the build: a manifest
//! naming an invalid mode or a dynamic user is a packaging mistake.

mod mode;
mod ownership;

pub use mode::{FileSystemMode, ModeError, SymbolicMode};
pub use ownership::{OwnershipDefinition, OwnershipError, StaticGroup, StaticOwner};
