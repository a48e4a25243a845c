use std::sync::LazyLock;

use globset::{Glob, GlobMatcher};
use pkgs::Substitution;
use regex::Regex;
use vfs::PathKind;

use crate::error::MatchError;
use crate::rule::{BasenameGlob, GenericGlob, GlobSegment, MatchRule, RuleImpl};

/// Detects `{a,b}` / `{a..b}` brace expansions. Not perfect, but it
/// catches the obvious unsupported usage.
static BRACE_EXPANSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)[{]([^},.]*(?:,|[.][.])[^},.]*[}])").expect("static regex"));

fn has_magic(fragment: &str) -> bool {
    fragment.contains(['*', '?', '['])
}

/// Normalizes a pattern path: strips surrounding slashes, drops `.` and
/// empty segments, and resolves `..` without escaping the root.
///
/// Returns the path without a `./` prefix; the root itself is `.`.
pub fn normalize_pattern_path(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Some(".".to_owned());
    }
    Some(segments.join("/"))
}

fn compile_glob_fragment(
    fragment: &str,
    pattern: &str,
    definition_source: &str,
) -> Result<GlobMatcher, MatchError> {
    Glob::new(fragment)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| MatchError::InvalidGlob {
            pattern: pattern.to_owned(),
            definition_source: definition_source.to_owned(),
            source,
        })
}

impl MatchRule {
    /// Builds a rule matching everything beneath `directory`.
    ///
    /// `.` and `/` degrade to the match-everything sentinel. The
    /// directory must be a literal path, never a glob.
    pub fn recursive_beneath_directory(
        directory: &str,
        definition_source: &str,
        path_kind: Option<PathKind>,
        substitution: &Substitution,
    ) -> Result<Self, MatchError> {
        if directory == "." || directory == "/" {
            return Ok(Self::match_anything());
        }
        let normalized = normalize_pattern_path(directory).ok_or_else(|| {
            MatchError::EscapesRoot {
                pattern: directory.to_owned(),
                definition_source: definition_source.to_owned(),
            }
        })?;
        let directory =
            substitution.substitute(&format!("./{normalized}"), definition_source)?;
        Ok(Self {
            rule: RuleImpl::AnythingBeneath {
                directory,
                kind: path_kind,
            },
        })
    }

    /// Builds a rule matching `basename_glob` anywhere beneath
    /// `directory` (the `<dir>/**/<glob>` shape).
    ///
    /// The pattern parser rejects non-leading `**`, so the built-in
    /// rules that need this shape construct it directly. The directory
    /// must be a literal path, never a glob.
    pub fn basename_glob_beneath_directory(
        directory: &str,
        basename_glob: &str,
        definition_source: &str,
        path_kind: Option<PathKind>,
        substitution: &Substitution,
    ) -> Result<Self, MatchError> {
        let normalized = normalize_pattern_path(directory).ok_or_else(|| {
            MatchError::EscapesRoot {
                pattern: directory.to_owned(),
                definition_source: definition_source.to_owned(),
            }
        })?;
        let directory =
            substitution.substitute(&format!("./{normalized}"), definition_source)?;
        let basename_glob =
            substitution.substitute_into_pattern(basename_glob, definition_source)?;
        let matcher = compile_glob_fragment(&basename_glob, &basename_glob, definition_source)?;
        Ok(Self {
            rule: RuleImpl::BasenameGlob(BasenameGlob {
                basename_glob,
                directory: Some(directory),
                kind: path_kind,
                recursive: true,
                matcher,
            }),
        })
    }

    /// Parses a path-or-glob pattern into the cheapest rule shape that
    /// implements it.
    ///
    /// Substitution tokens are expanded before matching; values
    /// substituted into glob positions have their glob metacharacters
    /// escaped so a `{{VAR}}` can never widen a pattern.
    pub fn from_path_or_glob(
        path_or_glob: &str,
        definition_source: &str,
        path_kind: Option<PathKind>,
        substitution: &Substitution,
    ) -> Result<Self, MatchError> {
        if matches!(path_or_glob, "*" | "**/*" | "." | "/") {
            return Ok(Self::match_anything());
        }

        if let Some(captures) = BRACE_EXPANSION_RE.captures(path_or_glob) {
            let replacement_hint = format!("{}{{{{OPEN_CURLY_BRACE}}}}{}", &captures[1], &captures[2]);
            return Err(MatchError::BraceExpansion {
                pattern: path_or_glob.to_owned(),
                definition_source: definition_source.to_owned(),
                replacement_hint,
            });
        }

        let normalized = normalize_pattern_path(path_or_glob).ok_or_else(|| {
            MatchError::EscapesRoot {
                pattern: path_or_glob.to_owned(),
                definition_source: definition_source.to_owned(),
            }
        })?;
        let with_prefix = format!("./{normalized}");

        if !has_magic(&with_prefix) {
            let path = substitution.substitute(&with_prefix, definition_source)?;
            return Ok(Self {
                rule: RuleImpl::Exact { path },
            });
        }

        let (directory, basename) = match with_prefix.rsplit_once('/') {
            Some((dir, base)) => (dir.to_owned(), base.to_owned()),
            None => unreachable!("prefixed patterns always contain a slash"),
        };

        if (directory.contains("**") && directory != "./**") || basename.contains("**") {
            return Err(MatchError::DoubleStar {
                pattern: path_or_glob.to_owned(),
                definition_source: definition_source.to_owned(),
            });
        }

        if basename == "*" && !has_magic(&directory) {
            let directory = substitution.substitute(&directory, definition_source)?;
            return Ok(Self {
                rule: RuleImpl::DirectChildren {
                    directory,
                    kind: path_kind,
                },
            });
        }

        if directory == "./**" || !has_magic(&directory) {
            let basename_glob =
                substitution.substitute_into_pattern(&basename, definition_source)?;
            let matcher = compile_glob_fragment(&basename_glob, path_or_glob, definition_source)?;
            let scope = if directory == "." || directory == "./**" {
                None
            } else {
                Some(substitution.substitute(&directory, definition_source)?)
            };
            let recursive = scope.is_none();
            return Ok(Self {
                rule: RuleImpl::BasenameGlob(BasenameGlob {
                    basename_glob,
                    directory: scope,
                    kind: path_kind,
                    recursive,
                    matcher,
                }),
            });
        }

        let pattern = substitution.substitute_into_pattern(&normalized, definition_source)?;
        let mut segments = Vec::new();
        for fragment in pattern.split('/') {
            if has_magic(fragment) {
                segments.push(GlobSegment::Wildcard(compile_glob_fragment(
                    fragment,
                    path_or_glob,
                    definition_source,
                )?));
            } else {
                segments.push(GlobSegment::Literal(fragment.to_owned()));
            }
        }
        Ok(Self {
            rule: RuleImpl::GenericGlob(GenericGlob {
                pattern,
                kind: path_kind,
                segments,
            }),
        })
    }
}
