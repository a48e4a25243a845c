use matchers::MatchError;
use vfs::VfsError;

/// Errors from applying transformation rules.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A transformation's match rule matched nothing; dead rules are
    /// presumed mistakes and never silently tolerated.
    #[error(
        "the match rule \"{pattern}\" in transformation \"{definition_source}\" did not match \
         any paths. Either the definition is redundant (and can be omitted) or the match rule \
         is incorrect"
    )]
    NoMatch {
        /// Short description of the match rule.
        pattern: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A remove rule matched the root directory itself.
    #[error("cannot remove the root directory (triggered by {definition_source})")]
    CannotRemoveRoot {
        /// The offending rule.
        definition_source: String,
    },

    /// A path that had to be a directory (or missing) was something else.
    #[error(
        "the path {path} was expected to be a directory (or non-existing) due to \
         {definition_source}. However that path existed and is a {path_type}. You may need a \
         `remove: {path}` prior to {definition_source} to make this transformation succeed"
    )]
    NotADirectory {
        /// The occupied path.
        path: String,
        /// What the occupant actually is.
        path_type: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A rename-shaped move matched more than one source.
    #[error(
        "could not rename {pattern} to {dest} (from: {definition_source}). Multiple paths \
         matched the pattern and the destination was not a directory. Either correct the \
         pattern to match only one source OR define the destination to be a directory (e.g. \
         add a trailing slash: \"{dest}/\")"
    )]
    RenameMatchedMultiple {
        /// The over-broad pattern.
        pattern: String,
        /// The rename destination.
        dest: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A rename's source and destination are the same path.
    #[error(
        "error in {definition_source}, the source {pattern} matched {dest} making the rename \
         redundant!?"
    )]
    RenameIsRedundant {
        /// The pattern.
        pattern: String,
        /// The destination it matched.
        dest: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A directory would be moved into itself.
    #[error(
        "error in {definition_source}, the source {pattern} matched {dest} (among other), but \
         it is not possible to copy a directory into itself"
    )]
    MoveIntoSelf {
        /// The pattern.
        pattern: String,
        /// The destination directory.
        dest: String,
        /// The offending rule.
        definition_source: String,
    },

    /// Two matched sources share a basename and a single destination dir.
    #[error(
        "could not move {pattern} to {dest} (from: {definition_source}). Multiple matched \
         paths share the basename \"{basename}\" (\"{first}\" vs. \"{second}\"). Please \
         correct the pattern, so it only matches one path with that basename"
    )]
    MoveBasenameCollision {
        /// The pattern.
        pattern: String,
        /// The destination directory.
        dest: String,
        /// The contested basename.
        basename: String,
        /// First path with the basename.
        first: String,
        /// Second path with the basename.
        second: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A move would silently replace an existing directory.
    #[error(
        "could not move {pattern} to {dest} (from: {definition_source}). The pattern matched \
         {source_path} which would replace the existing directory {existing}. If this \
         replacement is intentional, then please remove \"{existing}\" first (e.g. via `- \
         remove: \"{existing}\"`)"
    )]
    MoveReplacesDirectory {
        /// The pattern.
        pattern: String,
        /// The destination directory.
        dest: String,
        /// The matched source path.
        source_path: String,
        /// The directory that would be replaced.
        existing: String,
        /// The offending rule.
        definition_source: String,
    },

    /// The replacement policy forbade replacing the symlink destination.
    #[error(
        "refusing to replace {path} with a symlink; {reason} and the active replacement-rule \
         was {replacement_rule}. You can set the replacement-rule to \"discard-existing\", if \
         you are not interested in the contents of {path}. This error was triggered by \
         {definition_source}"
    )]
    RefusedSymlinkReplacement {
        /// The occupied destination.
        path: String,
        /// Why the occupant cannot be replaced under the active policy.
        reason: String,
        /// The active policy's manifest spelling.
        replacement_rule: String,
        /// The offending rule.
        definition_source: String,
    },

    /// The underlying pattern failed to parse.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// A mode spec failed to parse.
    #[error(transparent)]
    Mode(#[from] meta::ModeError),

    /// A tree mutation failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),
}
