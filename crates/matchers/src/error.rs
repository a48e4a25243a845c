/// Error raised while parsing a path-or-glob pattern.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The pattern contains a brace expansion, which is unsupported.
    #[error(
        "the pattern \"{pattern}\" (defined in {definition_source}) looks like it contains a \
         brace expansion (such as \"{{a,b}}\" or \"{{a..b}}\"); brace expansions are not \
         supported. To match a literal brace, insert it via a substitution as in \
         \"{replacement_hint}\""
    )]
    BraceExpansion {
        /// The rejected pattern.
        pattern: String,
        /// Where the pattern was defined.
        definition_source: String,
        /// The pattern with its first opening brace replaced by a
        /// substitution token.
        replacement_hint: String,
    },

    /// `**` appeared anywhere other than a leading `**/<basename-glob>`.
    #[error(
        "cannot process pattern \"{pattern}\" from {definition_source}: the double-star glob \
         (\"**\") is not supported in general, only \"**/<basename-glob>\""
    )]
    DoubleStar {
        /// The rejected pattern.
        pattern: String,
        /// Where the pattern was defined.
        definition_source: String,
    },

    /// The pattern walked above the staging root via `..` segments.
    #[error("the pattern \"{pattern}\" from {definition_source} escapes the staging root")]
    EscapesRoot {
        /// The rejected pattern.
        pattern: String,
        /// Where the pattern was defined.
        definition_source: String,
    },

    /// A glob fragment did not compile.
    #[error("invalid glob \"{pattern}\" from {definition_source}: {source}")]
    InvalidGlob {
        /// The rejected pattern.
        pattern: String,
        /// Where the pattern was defined.
        definition_source: String,
        /// The underlying glob error.
        #[source]
        source: globset::Error,
    },

    /// A substitution token in the pattern could not be resolved.
    #[error(transparent)]
    Substitution(#[from] pkgs::SubstitutionError),
}
