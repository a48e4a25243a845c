use std::path::PathBuf;

/// Error raised while resolving install and discard rules.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// An exact rule matched a path that another rule already installed.
    #[error(
        "\"{path}\" has been reserved by and installed into {packages}. The definition that \
         triggered this issue is {definition_source}"
    )]
    AlreadyInstalled {
        /// Real filesystem path of the contested source.
        path: PathBuf,
        /// Comma-joined names of the claiming packages.
        packages: String,
        /// The rule that lost the race.
        definition_source: String,
    },

    /// An exact rule matched a path that was already excluded.
    #[error(
        "\"{path}\" has been excluded. If you want this path installed, move it above the \
         exclusion rule that excluded it. The definition that triggered this issue is \
         {definition_source}"
    )]
    AlreadyExcluded {
        /// Real filesystem path of the contested source.
        path: PathBuf,
        /// The rule that lost the race.
        definition_source: String,
    },

    /// Two exact rules claimed the same path for the same package.
    #[error(
        "the path \"{path}\" (via exact match) has already been installed into {package}; the \
         second installation was triggered by {definition_source}"
    )]
    ExactPathMatchedTwice {
        /// Real filesystem path claimed twice.
        path: PathBuf,
        /// The package both rules target.
        package: String,
        /// The later rule.
        definition_source: String,
    },

    /// A rule that does not tolerate emptiness matched nothing.
    ///
    /// The claim counts distinguish a genuinely unmatched pattern from
    /// one whose candidates were eaten by earlier rules.
    #[error("{}", no_match_message(.pattern, .search_dirs, .definition_source, .match_description, *.already_installed, *.already_excluded))]
    NoMatch {
        /// The raw pattern of the failing rule.
        pattern: String,
        /// Comma-joined search dir paths that were consulted.
        search_dirs: String,
        /// The failing rule.
        definition_source: String,
        /// Exact description of the match rule semantics.
        match_description: String,
        /// Candidates skipped because another rule installed them.
        already_installed: usize,
        /// Candidates skipped because they were excluded.
        already_excluded: usize,
    },

    /// A single-match rule matched more than one path for a package.
    #[error(
        "the pattern \"{pattern}\" matched multiple entries for the packages: {packages}, but \
         it should match exactly one item; please tighten the pattern defined in \
         {definition_source}"
    )]
    MultipleMatches {
        /// The over-broad pattern.
        pattern: String,
        /// Packages that received more than one match.
        packages: String,
        /// The offending rule.
        definition_source: String,
    },

    /// A whole-tree pattern matched the search dir root itself.
    #[error("the pattern {pattern} matched the root dir")]
    MatchedRootDir {
        /// The offending pattern.
        pattern: String,
    },

    /// A destination path ended with `/`.
    #[error(
        "provided destination for \"{source_path}\" ended with \"/\" (\"{dest}\"), which it \
         must not"
    )]
    DestinationEndsWithSlash {
        /// The matched source path.
        source_path: String,
        /// The offending destination.
        dest: String,
    },

    /// A non-directory source would overwrite an existing directory.
    #[error(
        "cannot install {source_path} ({fs_path}) as {dest}: that path already exists and is \
         a directory. This error was triggered via {definition_source}"
    )]
    DestinationIsDirectory {
        /// Virtual path of the matched source.
        source_path: String,
        /// Real filesystem path of the matched source.
        fs_path: PathBuf,
        /// The occupied destination.
        dest: String,
        /// The offending rule.
        definition_source: String,
    },

    /// No man-page section could be determined for an install-man rule.
    #[error(
        "could not determine the section for {path} automatically; the man page was detected \
         via {definition_source}. Consider using an explicit section; it applies to all man \
         pages of that rule, so the rule may need to be split in two"
    )]
    ManpageSection {
        /// Real filesystem path of the man page.
        path: PathBuf,
        /// The offending rule.
        definition_source: String,
    },

    /// A discard rule's search-dir restriction named unknown directories.
    #[error(
        "the discard rule defined at {definition_source} mentions the following search \
         directories that were not known: {paths}. Either a search dir is missing elsewhere or \
         it should be removed from the discard rule"
    )]
    UnknownLimitTo {
        /// The offending rule.
        definition_source: String,
        /// Colon-joined unknown directory paths.
        paths: String,
    },

    /// The per-package search-dir orders cannot be linearized.
    #[error(
        "there is a circular dependency (somewhere) between the search dirs: {dirs}. The \
         search directories across all packages have to be ordered (and the source root should \
         generally be last)"
    )]
    CircularSearchDirOrder {
        /// Comma-joined unresolvable directory paths.
        dirs: String,
    },

    /// A pattern failed to parse.
    #[error(transparent)]
    Match(#[from] matchers::MatchError),

    /// A staging tree operation failed.
    #[error(transparent)]
    Vfs(#[from] vfs::VfsError),
}

fn no_match_message(
    pattern: &str,
    search_dirs: &str,
    definition_source: &str,
    match_description: &str,
    already_installed: usize,
    already_excluded: usize,
) -> String {
    let tail =
        format!("Source for this issue is {definition_source}. Match rule: {match_description}");
    if already_installed > 0 && already_excluded > 0 {
        let total = already_installed + already_excluded;
        format!(
            "there were no matches for {pattern} in {search_dirs} after ignoring {total} \
             path(s) already matched previously either by install or exclude rules. If you \
             wanted to install some of these paths into multiple packages, tweak the definition \
             that installed them to install into multiple packages; if exclusion rules are in \
             the way, move this install rule before the exclusion rule or list the paths \
             explicitly. {tail}"
        )
    } else if already_excluded > 0 {
        format!(
            "there were no matches for {pattern} in {search_dirs} after ignoring \
             {already_excluded} path(s) that have been excluded. If you wanted to install some \
             of these paths, move the install rule before the exclusion rule or, for built-in \
             excludes, list the paths explicitly (without using patterns). {tail}"
        )
    } else if already_installed > 0 {
        format!(
            "there were no matches for {pattern} in {search_dirs} after ignoring \
             {already_installed} path(s) already matched previously. If you wanted to install \
             some of these paths into multiple packages, tweak the definition that installed \
             them to install into multiple packages (usually change \"into: foo\" to \
             \"into: [foo, bar]\"). {tail}"
        )
    } else {
        format!(
            "there were no matches for {pattern} in {search_dirs} (definition: \
             {definition_source}). Match rule: {match_description}"
        )
    }
}
