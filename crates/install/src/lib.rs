#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The installation engine: resolves declarative install and discard
//! rules against ordered search directories and populates one staging
//! tree per binary package.
//!
//! # Design
//!
//! - [`SourcePathMatcher`] is the claim ledger shared across the whole
//!   install pass. Every source path (keyed by its real filesystem path)
//!   is either unclaimed, claimed by a set of packages, or discarded;
//!   glob rules silently skip reserved candidates while exact rules treat
//!   a collision as a hard error.
//! - Automatic discard rules ([`AutoDiscardRule`]) hide conventional
//!   build cruft (libtool `.la` files, `__pycache__`, VCS droppings,
//!   editor backups) unless an exact-path install rule rescues the path.
//!   Verdicts are cached per directory: checking one deep path caches the
//!   verdict for every ancestor visited on the way up.
//! - [`SearchDir`]s apply to a subset of the packages; their global order
//!   comes from a topological sort of each package's requested order
//!   ([`resolve_search_dir_order`]), with the source root appended last
//!   for every package. Install rules stop at the first search dir that
//!   satisfies all their packages; discard rules always visit every dir.
//! - [`InstallRule`] covers the manifest's install shapes (install,
//!   install-as, multi-dest, docs, examples, man pages, discard) plus the
//!   built-in packager-provided-files rule. Destination templates may
//!   reference `{basename}`, `{dirname}`, `{package_name}` and
//!   `{doc_main_package_name}`.
//!
//! # Errors
//!
//! Rule resolution failures are [`InstallError`]s carrying the pattern,
//! its definition source and claim counts, so the diagnostic can
//! distinguish "nothing matched" from "everything that would have matched
//! was already claimed or discarded".

mod discard;
mod error;
mod manpage;
mod matcher;
mod rules;
mod search;

pub use discard::{builtin_discard_rules, AutoDiscardRule};
pub use error::InstallError;
pub use matcher::{PathMatch, SourcePathMatcher};
pub use rules::{
    BinaryPackageInstallContext, InstallRule, InstallRuleContext, PackagerProvidedFile,
};
pub use search::{resolve_search_dir_order, SearchDir};
