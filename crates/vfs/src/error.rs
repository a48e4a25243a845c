use std::io;

/// Error raised by virtual filesystem operations.
///
/// All variants are contract violations or I/O failures that abort the
/// build; none are retryable.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// Mutation was attempted after the tree was frozen.
    #[error("attempt to write to \"{path}\" failed: the virtual file system is read-only")]
    ReadOnly {
        /// Path of the node being mutated.
        path: String,
    },

    /// A directory operation was applied to a non-directory.
    #[error("\"{path}\" is not a directory")]
    NotADirectory {
        /// Offending path.
        path: String,
    },

    /// A file operation was applied to a non-file.
    #[error("\"{path}\" is not a file")]
    NotAFile {
        /// Offending path.
        path: String,
    },

    /// `readlink` was applied to a non-symlink.
    #[error("\"{path}\" is not a symlink")]
    NotASymlink {
        /// Offending path.
        path: String,
    },

    /// A child name contained `/` or was `.`/`..`.
    #[error("invalid file name \"{name}\" (it must be a plain basename)")]
    InvalidBasename {
        /// The rejected name.
        name: String,
    },

    /// `mkdir` target already exists.
    #[error("path \"{path}\" already exists")]
    AlreadyExists {
        /// Conflicting path.
        path: String,
    },

    /// A non-recursive unlink hit a non-empty directory.
    #[error("refusing to unlink \"{path}\": the directory is not empty and recursive was not requested")]
    DirectoryNotEmpty {
        /// Offending directory.
        path: String,
    },

    /// The root directory cannot be unlinked.
    #[error("the root directory cannot be removed")]
    RootUnlink,

    /// A mode below the required minimum bits was requested.
    #[error(
        "attempt to set mode of \"{path}\" to {mode:04o} rejected; minimum requirement is \
         {minimum:04o} (user-read and, for directories, user-exec). No shipped path may drop \
         these bits as they break the build or the installed system"
    )]
    MinimumMode {
        /// Offending path.
        path: String,
        /// Requested mode.
        mode: u32,
        /// Required minimum bits.
        minimum: u32,
    },

    /// Symlinks have a fixed `0777` mode that cannot be changed.
    #[error("cannot set a mode on symlink \"{path}\"")]
    SymlinkMode {
        /// Offending path.
        path: String,
    },

    /// An operation was attempted through a detached node.
    #[error("cannot use \"{path}\": the path is detached from the tree")]
    Detached {
        /// Last known path of the detached node.
        path: String,
    },

    /// A `..` segment walked above the root directory.
    #[error("the path \"{path}\" escapes the root directory")]
    EscapesRoot {
        /// The path being resolved.
        path: String,
    },

    /// The same symlink was traversed twice while resolving one lookup.
    ///
    /// This is a deliberately conservative guard: some aliased resolutions
    /// that would terminate are also rejected. Packaging layouts do not
    /// rely on such chains in practice.
    #[error(
        "the path \"{path}\" traversed the symlink \"{symlink}\" multiple times; traversing \
         the same symlink twice during one lookup is treated as a loop even if the path would \
         eventually resolve"
    )]
    SymlinkLoop {
        /// The path being resolved.
        path: String,
        /// The symlink that was traversed twice.
        symlink: String,
    },

    /// `mkdirs` needed a directory where a non-directory exists.
    #[error(
        "mkdirs of \"{path}\" failed: \"{conflict}\" exists and is not a directory"
    )]
    MkdirsConflict {
        /// The requested directory path.
        path: String,
        /// The conflicting existing path.
        conflict: String,
    },

    /// The node has no backing path on the real filesystem.
    #[error("\"{path}\" is purely virtual and has no backing filesystem path")]
    NoBackingPath {
        /// Offending path.
        path: String,
    },

    /// The backing path failed revalidation after a scoped content
    /// replacement (wrong type or extra hard links).
    #[error(
        "the backing file \"{fs_path}\" for \"{path}\" is no longer a regular file with a \
         single link; refusing to continue with possibly tampered content"
    )]
    TamperedBackingFile {
        /// Virtual path of the node.
        path: String,
        /// Backing path that failed validation.
        fs_path: String,
    },

    /// An underlying filesystem operation failed.
    #[error("I/O error on \"{path}\": {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
