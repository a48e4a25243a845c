#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Pattern rules that enumerate paths in a staged [`vfs::Fs`] tree.
//!
//! A [`MatchRule`] is parsed from a path-or-glob string
//! ([`MatchRule::from_path_or_glob`]) and classified into the cheapest
//! shape that can satisfy it: an exact path is a single lookup, `dir/*`
//! iterates one directory, `**/<glob>` scans basenames over a subtree,
//! and only patterns with wildcards in interior segments fall back to the
//! segment-by-segment generic walk.
//!
//! # Design
//!
//! - Basename globs are compiled once via `globset` and reused across
//!   every search directory the rule is applied to.
//! - `**` is only accepted as a leading `**/<basename-glob>`; arbitrary
//!   double-star positions are rejected at parse time with the pattern and
//!   its definition source in the error.
//! - Brace expansion (`{a,b}`, `{a..b}`) is detected and rejected with a
//!   hint showing how to match a literal brace through a substitution.
//! - Two built-in rules exist for permission normalization:
//!   [`MatchRule::usr_share_doc_content`] (doc files minus per-package
//!   `examples/` subtrees) and [`MatchRule::shebang_scripts`] (regular
//!   files whose first line is an absolute `#!` for `/bin`, `/sbin`,
//!   `/usr/bin` or `/usr/sbin`).
//!
//! # Errors
//!
//! Parse failures ([`MatchError`]) carry the offending pattern and the
//! manifest location that defined it; they abort the build.

mod builtin;
mod error;
mod parse;
mod rule;

pub use error::MatchError;
pub use parse::normalize_pattern_path;
pub use rule::{MatchRule, MatchRuleKind};

#[cfg(test)]
mod tests;
