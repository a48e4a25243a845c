use install::InstallError;
use manifest::ManifestError;
use transform::TransformError;
use vfs::VfsError;

/// Top-level build failure. One package's fatal error aborts the whole
/// run; package outputs are not independent until archival.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Source paths were neither installed nor discarded.
    #[error(
        "the following paths were present in the search directories, but not installed into \
         any package (nor explicitly discarded): {}. Add install rules for them, or silence \
         this with an explicit `discard: \"*\"` as the final install rule",
        paths.join(", ")
    )]
    UninstalledPaths {
        /// The unaccounted-for paths, in search-dir order.
        paths: Vec<String>,
    },

    /// An install or discard rule failed to resolve.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A transformation failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Manifest generation failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Scanning a search directory or mutating a staging tree failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),
}
