use std::fmt;
use std::sync::LazyLock;

use globset::GlobMatcher;
use regex::bytes::Regex;
use vfs::{Fs, NodeId, PathKind, WalkCursor};

use crate::builtin;

/// Shebang lines pointing at `/bin`, `/sbin`, `/usr/bin` or `/usr/sbin`.
static BIN_SHEBANG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!\s*/(?:usr/)?s?bin").expect("static regex compiles"));

const SHEBANG_SNIFF_LEN: usize = 32;

/// Classification of a [`MatchRule`], mainly for diagnostics and for the
/// exact-vs-glob distinction the reservation ledger cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchRuleKind {
    /// A single literal path.
    ExactMatch,
    /// A glob over basenames, optionally scoped and/or recursive.
    BasenameGlob,
    /// All direct children of one directory.
    DirectChildrenOfDir,
    /// Everything beneath one directory.
    AnythingBeneathDir,
    /// Wildcards in interior path segments.
    GenericGlob,
    /// The whole tree.
    MatchAnything,
    /// A built-in rule with no textual pattern.
    BuiltIn,
}

#[derive(Clone, Debug)]
pub(crate) struct BasenameGlob {
    pub(crate) basename_glob: String,
    /// Scope directory (`./usr/bin` form); `None` scopes to the root.
    pub(crate) directory: Option<String>,
    pub(crate) kind: Option<PathKind>,
    pub(crate) recursive: bool,
    pub(crate) matcher: GlobMatcher,
}

#[derive(Clone, Debug)]
pub(crate) enum GlobSegment {
    Literal(String),
    Wildcard(GlobMatcher),
}

#[derive(Clone, Debug)]
pub(crate) struct GenericGlob {
    /// Pattern without the `./` prefix.
    pub(crate) pattern: String,
    pub(crate) kind: Option<PathKind>,
    pub(crate) segments: Vec<GlobSegment>,
}

#[derive(Clone, Debug)]
pub(crate) enum RuleImpl {
    Anything,
    Exact {
        path: String,
    },
    DirectChildren {
        directory: String,
        kind: Option<PathKind>,
    },
    AnythingBeneath {
        directory: String,
        kind: Option<PathKind>,
    },
    BasenameGlob(BasenameGlob),
    GenericGlob(GenericGlob),
    UsrShareDocContent,
    ShebangScripts,
}

/// A parsed pattern that enumerates matching nodes beneath a tree root.
///
/// Construct through [`MatchRule::from_path_or_glob`],
/// [`MatchRule::recursive_beneath_directory`] or the built-in
/// constructors; the parsed shape is interrogated via [`MatchRule::kind`]
/// and [`MatchRule::exact_path`] rather than pattern matching.
#[derive(Clone, Debug)]
pub struct MatchRule {
    pub(crate) rule: RuleImpl,
}

impl MatchRule {
    /// The universal match-everything sentinel (`*`, `**/*`, `.`, `/`).
    #[must_use]
    pub const fn match_anything() -> Self {
        Self {
            rule: RuleImpl::Anything,
        }
    }

    /// Built-in rule for permission normalization of documentation files.
    #[must_use]
    pub const fn usr_share_doc_content() -> Self {
        Self {
            rule: RuleImpl::UsrShareDocContent,
        }
    }

    /// Built-in rule matching files with an absolute `bin` shebang line.
    #[must_use]
    pub const fn shebang_scripts() -> Self {
        Self {
            rule: RuleImpl::ShebangScripts,
        }
    }

    /// Returns the rule classification.
    #[must_use]
    pub const fn kind(&self) -> MatchRuleKind {
        match &self.rule {
            RuleImpl::Anything => MatchRuleKind::MatchAnything,
            RuleImpl::Exact { .. } => MatchRuleKind::ExactMatch,
            RuleImpl::DirectChildren { .. } => MatchRuleKind::DirectChildrenOfDir,
            RuleImpl::AnythingBeneath { .. } => MatchRuleKind::AnythingBeneathDir,
            RuleImpl::BasenameGlob(_) => MatchRuleKind::BasenameGlob,
            RuleImpl::GenericGlob(_) => MatchRuleKind::GenericGlob,
            RuleImpl::UsrShareDocContent | RuleImpl::ShebangScripts => MatchRuleKind::BuiltIn,
        }
    }

    /// Whether the rule is a single-path exact match, and if so its path.
    #[must_use]
    pub fn exact_path(&self) -> Option<&str> {
        match &self.rule {
            RuleImpl::Exact { path } => Some(path),
            _ => None,
        }
    }

    /// The path-kind filter the rule carries, if any.
    #[must_use]
    pub const fn path_kind(&self) -> Option<PathKind> {
        match &self.rule {
            RuleImpl::DirectChildren { kind, .. } | RuleImpl::AnythingBeneath { kind, .. } => *kind,
            RuleImpl::BasenameGlob(g) => g.kind,
            RuleImpl::GenericGlob(g) => g.kind,
            RuleImpl::UsrShareDocContent | RuleImpl::ShebangScripts => Some(PathKind::File),
            RuleImpl::Exact { .. } | RuleImpl::Anything => None,
        }
    }

    /// Enumerates the nodes matched beneath the root of `fs`.
    ///
    /// Candidates for which `ignore` returns true are skipped before any
    /// kind filtering, mirroring how the reservation ledger prunes
    /// already-claimed paths.
    pub fn finditer(&self, fs: &Fs, ignore: Option<&dyn Fn(NodeId) -> bool>) -> Vec<NodeId> {
        let skip = |id: NodeId| ignore.is_some_and(|f| f(id));
        match &self.rule {
            RuleImpl::Anything => fs.all_paths().into_iter().filter(|&id| !skip(id)).collect(),
            RuleImpl::Exact { path } => fs
                .lookup(fs.root(), path)
                .ok()
                .flatten()
                .filter(|&id| !skip(id))
                .into_iter()
                .collect(),
            RuleImpl::DirectChildren { directory, kind } => {
                let Some(dir) = lookup_dir(fs, directory) else {
                    return Vec::new();
                };
                fs.children(dir)
                    .into_iter()
                    .filter(|&id| !skip(id) && kind_matches(fs, id, *kind))
                    .collect()
            }
            RuleImpl::AnythingBeneath { directory, kind } => {
                let Some(dir) = lookup_dir(fs, directory) else {
                    return Vec::new();
                };
                let mut out = Vec::new();
                let mut cursor = WalkCursor::new(dir);
                while let Some(id) = cursor.next(fs) {
                    if id == dir {
                        continue;
                    }
                    if !skip(id) && kind_matches(fs, id, *kind) {
                        out.push(id);
                    }
                }
                out
            }
            RuleImpl::BasenameGlob(glob) => {
                let search_root = match &glob.directory {
                    Some(directory) => match lookup_dir(fs, directory) {
                        Some(dir) => dir,
                        None => return Vec::new(),
                    },
                    None => fs.root(),
                };
                let candidates: Vec<NodeId> = if glob.recursive {
                    let mut cursor = WalkCursor::new(search_root);
                    let mut out = Vec::new();
                    while let Some(id) = cursor.next(fs) {
                        if id != search_root {
                            out.push(id);
                        }
                    }
                    out
                } else {
                    fs.children(search_root)
                };
                candidates
                    .into_iter()
                    .filter(|&id| {
                        !skip(id)
                            && glob.matcher.is_match(fs.name(id))
                            && kind_matches(fs, id, glob.kind)
                    })
                    .collect()
            }
            RuleImpl::GenericGlob(glob) => {
                let mut layer = vec![fs.root()];
                for segment in &glob.segments {
                    let mut next = Vec::new();
                    for &node in &layer {
                        match segment {
                            GlobSegment::Literal(name) => {
                                if let Some(child) = fs.get(node, name) {
                                    next.push(child);
                                }
                            }
                            GlobSegment::Wildcard(matcher) => {
                                next.extend(
                                    fs.children(node)
                                        .into_iter()
                                        .filter(|&id| matcher.is_match(fs.name(id))),
                                );
                            }
                        }
                    }
                    if next.is_empty() {
                        return Vec::new();
                    }
                    layer = next;
                }
                layer
                    .into_iter()
                    .filter(|&id| !skip(id) && kind_matches(fs, id, glob.kind))
                    .collect()
            }
            RuleImpl::UsrShareDocContent => builtin::doc_content_matches(fs, &skip),
            RuleImpl::ShebangScripts => {
                let mut out = Vec::new();
                for id in fs.all_paths() {
                    if !fs.is_file(id) || skip(id) {
                        continue;
                    }
                    let Ok(Some(prefix)) = fs.read_backing_prefix(id, SHEBANG_SNIFF_LEN) else {
                        continue;
                    };
                    if BIN_SHEBANG_RE.is_match(&prefix) {
                        out.push(id);
                    }
                }
                out
            }
        }
    }

    /// One-line pattern form used in rule diagnostics.
    #[must_use]
    pub fn describe_match_short(&self) -> String {
        let kind_suffix = |kind: Option<PathKind>| match kind {
            Some(PathKind::File) => " <only for files>",
            Some(PathKind::Directory) => " <only for directories>",
            Some(PathKind::Symlink) => " <only for symlinks>",
            None => "",
        };
        match &self.rule {
            RuleImpl::Anything => "**/*".to_owned(),
            RuleImpl::Exact { path } => path.clone(),
            RuleImpl::DirectChildren { directory, kind } => {
                format!("{directory}/*{}", kind_suffix(*kind))
            }
            RuleImpl::AnythingBeneath { directory, kind } => {
                format!("{directory}/**/*{}", kind_suffix(*kind))
            }
            RuleImpl::BasenameGlob(glob) => {
                let base = match &glob.directory {
                    Some(directory) if glob.recursive => {
                        format!("{directory}/**/{}", glob.basename_glob)
                    }
                    Some(directory) => format!("{directory}/{}", glob.basename_glob),
                    None => glob.basename_glob.clone(),
                };
                format!("{base}{}", kind_suffix(glob.kind))
            }
            RuleImpl::GenericGlob(glob) => format!("{}{}", glob.pattern, kind_suffix(glob.kind)),
            RuleImpl::UsrShareDocContent => {
                "All files beneath ./usr/share/doc/ except .../<pkg>/examples".to_owned()
            }
            RuleImpl::ShebangScripts => {
                "All scripts with an absolute #!-line for /(s)bin or /usr/(s)bin".to_owned()
            }
        }
    }

    /// Longer pattern form clarifying the match semantics.
    #[must_use]
    pub fn describe_match_exact(&self) -> String {
        match &self.rule {
            RuleImpl::Anything => "**/* (match anything)".to_owned(),
            RuleImpl::Exact { path } => format!("{path} (the exact path / no globbing)"),
            RuleImpl::DirectChildren { .. } => format!(
                "{} (anything directly in the directory)",
                self.describe_match_short()
            ),
            RuleImpl::AnythingBeneath { directory, .. } => {
                format!("{directory}/**/* (anything below the directory)")
            }
            RuleImpl::BasenameGlob(glob) if glob.directory.is_some() && !glob.recursive => {
                format!(
                    "{} (glob / directly in the directory)",
                    self.describe_match_short()
                )
            }
            RuleImpl::BasenameGlob(_) => {
                format!("{} (basename match)", self.describe_match_short())
            }
            RuleImpl::GenericGlob(_) => format!("{} (glob)", self.describe_match_short()),
            RuleImpl::UsrShareDocContent | RuleImpl::ShebangScripts => self.describe_match_short(),
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe_match_short())
    }
}

fn lookup_dir(fs: &Fs, directory: &str) -> Option<NodeId> {
    fs.lookup(fs.root(), directory)
        .ok()
        .flatten()
        .filter(|&id| fs.is_dir(id))
}

fn kind_matches(fs: &Fs, id: NodeId, kind: Option<PathKind>) -> bool {
    kind.is_none_or(|k| fs.kind(id) == k)
}
