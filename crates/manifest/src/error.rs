use vfs::VfsError;

/// Errors from generating or parsing the intermediate manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A regular file had no backing content to archive.
    #[error(
        "the file {path} has no content on the filesystem; only directories and symlinks can \
         be virtual tar members"
    )]
    VirtualFile {
        /// The in-package path.
        path: String,
    },

    /// A parsed manifest carried no members at all.
    #[error("empty manifest (note that the root directory should always be present)")]
    EmptyManifest,

    /// The first member of a parsed manifest was not the root.
    #[error("the first member must always be the root directory \"./\"")]
    MissingRoot,

    /// A member appeared before the directory containing it.
    #[error(
        "the path \"{member_path}\" came before the directory it is in (or the path is not a \
         directory). Either way leads to a broken deb"
    )]
    OutOfOrderMember {
        /// The offending member path.
        member_path: String,
    },

    /// Reading a path attribute from the staging tree failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// The manifest JSON could not be read or written.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
