use std::fmt;

use matchers::MatchRule;
use meta::{FileSystemMode, StaticGroup, StaticOwner};
use pkgs::{ConditionContext, ManifestCondition};
use vfs::{Fs, NodeId, WalkCursor};

use crate::error::TransformError;

/// What to do when the destination of a `create-symlink` rule exists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymlinkReplacementRule {
    /// Any occupant is an error.
    ErrorIfExists,
    /// Non-directories are replaced; directories are errors.
    ErrorIfDirectory,
    /// Like [`Self::ErrorIfDirectory`], but empty directories are
    /// replaced too.
    AbortOnNonEmptyDirectory,
    /// Any occupant is removed, recursively.
    DiscardExisting,
}

impl fmt::Display for SymlinkReplacementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ErrorIfExists => "error-if-exists",
            Self::ErrorIfDirectory => "error-if-directory",
            Self::AbortOnNonEmptyDirectory => "abort-on-non-empty-directory",
            Self::DiscardExisting => "discard-existing",
        })
    }
}

/// Capabilities requested for a file, stored in the path metadata table
/// for the archiver to act on.
#[derive(Clone, Debug)]
pub struct Capability {
    /// The `setcap`-style capability string (`cap_net_raw+ep`).
    pub capabilities: String,
    /// Mode to apply together with the capabilities.
    pub capability_mode: FileSystemMode,
    /// The rule that requested them.
    pub definition_source: String,
}

/// One packager-declared transformation, applied to a package's staging
/// tree in manifest order after installation.
#[derive(Debug)]
pub enum TransformationRule {
    /// Removes matched paths (recursively), optionally keeping emptied
    /// parent directories.
    Remove {
        /// Patterns to remove.
        match_rules: Vec<MatchRule>,
        /// Skip the rmdir-parents pass after each removal.
        keep_empty_parent_dirs: bool,
        /// The manifest rule.
        definition_source: String,
    },
    /// Moves matches to a new destination: into a directory when
    /// `dest_is_dir`, otherwise a single-source rename.
    Move {
        /// Source pattern.
        match_rule: MatchRule,
        /// Destination in `./path` form, without trailing slash.
        dest_path: String,
        /// Whether the destination names a directory to move into.
        dest_is_dir: bool,
        /// The manifest rule.
        definition_source: String,
        /// Optional activation condition.
        condition: Option<ManifestCondition>,
    },
    /// Creates a symlink, replacing any occupant per the policy.
    CreateSymlink {
        /// The link target, already policy-normalized by the caller.
        link_target: String,
        /// Where the link is created, in `./path` form.
        link_dest: String,
        /// Occupant policy.
        replacement_rule: SymlinkReplacementRule,
        /// The manifest rule.
        definition_source: String,
        /// Optional activation condition.
        condition: Option<ManifestCondition>,
    },
    /// Ensures directories exist, with optional ownership and mode.
    CreateDirectories {
        /// Directories in `./path` form.
        directories: Vec<String>,
        /// Owner for the directories.
        owner: Option<StaticOwner>,
        /// Group for the directories.
        group: Option<StaticGroup>,
        /// Mode for the directories.
        mode: Option<FileSystemMode>,
        /// The manifest rule.
        definition_source: String,
        /// Optional activation condition.
        condition: Option<ManifestCondition>,
    },
    /// Assigns ownership, mode and/or capabilities to matched paths.
    PathMetadata {
        /// Patterns to adjust.
        match_rules: Vec<MatchRule>,
        /// Owner to assign.
        owner: Option<StaticOwner>,
        /// Group to assign.
        group: Option<StaticGroup>,
        /// Mode to assign.
        mode: Option<FileSystemMode>,
        /// Capabilities to record (files only); requires
        /// `capability_mode`.
        capabilities: Option<String>,
        /// Mode applied together with the capabilities.
        capability_mode: Option<FileSystemMode>,
        /// Apply to everything beneath matched directories too.
        recursive: bool,
        /// The manifest rule.
        definition_source: String,
        /// Optional activation condition.
        condition: Option<ManifestCondition>,
    },
}

fn condition_active(
    condition: Option<&ManifestCondition>,
    condition_context: &ConditionContext,
) -> bool {
    condition.is_none_or(|c| c.evaluate(condition_context))
}

fn no_match(match_rule: &MatchRule, definition_source: &str) -> TransformError {
    TransformError::NoMatch {
        pattern: match_rule.describe_match_short(),
        definition_source: definition_source.to_owned(),
    }
}

/// Resolves `path` to an existing directory, creating missing trailing
/// segments. An existing non-directory occupant along the way is a
/// detailed error rather than a bare conflict.
fn ensure_is_directory(
    fs: &mut Fs,
    path: &str,
    definition_source: &str,
) -> Result<NodeId, TransformError> {
    let (mut current, missing) = fs.attempt_lookup(fs.root(), path)?;
    if !fs.is_dir(current) {
        let path_type = if fs.is_file(current) {
            "file"
        } else {
            "symlink/\"special file system object\""
        };
        return Err(TransformError::NotADirectory {
            path: fs.path(current),
            path_type: path_type.to_owned(),
            definition_source: definition_source.to_owned(),
        });
    }
    for segment in missing {
        if segment == "." {
            continue;
        }
        current = fs.mkdir(current, &segment)?;
    }
    Ok(current)
}

/// Everything beneath `start` in deterministic order, `start` excluded.
fn collect_descendants(fs: &Fs, start: NodeId) -> Vec<NodeId> {
    let mut cursor = WalkCursor::new(start);
    let mut out = Vec::new();
    while let Some(id) = cursor.next(fs) {
        if id != start {
            out.push(id);
        }
    }
    out
}

fn apply_owner_and_mode(
    fs: &mut Fs,
    id: NodeId,
    owner: Option<&StaticOwner>,
    group: Option<&StaticGroup>,
    mode: Option<&FileSystemMode>,
    capabilities: Option<&str>,
    capability_mode: Option<&FileSystemMode>,
    definition_source: &str,
) -> Result<(), TransformError> {
    if owner.is_some() || group.is_some() {
        fs.chown(id, owner, group)?;
    }
    if let Some(mode) = mode {
        let desired = mode.compute_mode(fs.mode(id), fs.is_dir(id));
        fs.set_mode(id, desired)?;
    }
    if fs.is_file(id) {
        if let (Some(capabilities), Some(capability_mode)) = (capabilities, capability_mode) {
            if let Some(previous) = fs.path_metadata::<Capability>(id) {
                tracing::warn!(
                    path = %fs.path(id),
                    previous = %previous.definition_source,
                    "replacing the capabilities set on this path due to {definition_source}"
                );
            }
            fs.set_path_metadata(
                id,
                Capability {
                    capabilities: capabilities.to_owned(),
                    capability_mode: capability_mode.clone(),
                    definition_source: definition_source.to_owned(),
                },
            )?;
        }
    }
    Ok(())
}

impl TransformationRule {
    /// Applies the rule to `fs`. A rule whose condition is false is a
    /// no-op; a rule that matches nothing is a hard error.
    pub fn apply(
        &self,
        fs: &mut Fs,
        condition_context: &ConditionContext,
    ) -> Result<(), TransformError> {
        match self {
            Self::Remove {
                match_rules,
                keep_empty_parent_dirs,
                definition_source,
            } => Self::apply_remove(fs, match_rules, *keep_empty_parent_dirs, definition_source),
            Self::Move {
                match_rule,
                dest_path,
                dest_is_dir,
                definition_source,
                condition,
            } => {
                if !condition_active(condition.as_ref(), condition_context) {
                    return Ok(());
                }
                Self::apply_move(fs, match_rule, dest_path, *dest_is_dir, definition_source)
            }
            Self::CreateSymlink {
                link_target,
                link_dest,
                replacement_rule,
                definition_source,
                condition,
            } => {
                if !condition_active(condition.as_ref(), condition_context) {
                    return Ok(());
                }
                Self::apply_create_symlink(
                    fs,
                    link_target,
                    link_dest,
                    *replacement_rule,
                    definition_source,
                )
            }
            Self::CreateDirectories {
                directories,
                owner,
                group,
                mode,
                definition_source,
                condition,
            } => {
                if !condition_active(condition.as_ref(), condition_context) {
                    return Ok(());
                }
                for directory in directories {
                    let dir = ensure_is_directory(fs, directory, definition_source)?;
                    if let Some(mode) = mode {
                        let desired = mode.compute_mode(fs.mode(dir), true);
                        fs.set_mode(dir, desired)?;
                    }
                    if owner.is_some() || group.is_some() {
                        fs.chown(dir, owner.as_ref(), group.as_ref())?;
                    }
                }
                Ok(())
            }
            Self::PathMetadata {
                match_rules,
                owner,
                group,
                mode,
                capabilities,
                capability_mode,
                recursive,
                definition_source,
                condition,
            } => {
                if !condition_active(condition.as_ref(), condition_context) {
                    return Ok(());
                }
                Self::apply_path_metadata(
                    fs,
                    match_rules,
                    owner.as_ref(),
                    group.as_ref(),
                    mode.as_ref(),
                    capabilities.as_deref(),
                    capability_mode.as_ref(),
                    *recursive,
                    definition_source,
                )
            }
        }
    }

    fn apply_remove(
        fs: &mut Fs,
        match_rules: &[MatchRule],
        keep_empty_parent_dirs: bool,
        definition_source: &str,
    ) -> Result<(), TransformError> {
        for match_rule in match_rules {
            // Matches are fully resolved up front; unlinking while a glob
            // expansion is still walking the tree would skip siblings.
            let matches = match_rule.finditer(fs, None);
            let mut matched_any = false;
            for m in matches {
                matched_any = true;
                let Some(parent) = fs.parent(m) else {
                    return Err(TransformError::CannotRemoveRoot {
                        definition_source: definition_source.to_owned(),
                    });
                };
                fs.unlink(m, true)?;
                if !keep_empty_parent_dirs {
                    fs.prune_if_empty_dir(parent)?;
                }
            }
            if !matched_any {
                return Err(no_match(match_rule, definition_source));
            }
        }
        Ok(())
    }

    fn apply_move(
        fs: &mut Fs,
        match_rule: &MatchRule,
        dest_path: &str,
        dest_is_dir: bool,
        definition_source: &str,
    ) -> Result<(), TransformError> {
        // Eager resolve; moving matches into place must not feed the
        // pattern its own output (e.g. `**/*.la` moved into a matching
        // subtree).
        let matches = match_rule.finditer(fs, None);
        if matches.is_empty() {
            return Err(no_match(match_rule, definition_source));
        }

        let target_dir = if dest_is_dir {
            ensure_is_directory(fs, dest_path, definition_source)?
        } else {
            let (dir_part, basename) = dest_path
                .rsplit_once('/')
                .map_or((".", dest_path), |(d, b)| (d, b));
            let target_parent_dir = ensure_is_directory(fs, dir_part, definition_source)?;
            let occupant = fs.get(target_parent_dir, basename);

            match occupant {
                Some(occupant) if fs.is_dir(occupant) => occupant,
                _ => {
                    // Rename semantics.
                    if matches.len() > 1 {
                        return Err(TransformError::RenameMatchedMultiple {
                            pattern: match_rule.describe_match_short(),
                            dest: dest_path.to_owned(),
                            definition_source: definition_source.to_owned(),
                        });
                    }
                    let source = matches[0];
                    if fs.path(source) == dest_path {
                        return Err(TransformError::RenameIsRedundant {
                            pattern: match_rule.describe_match_short(),
                            dest: dest_path.to_owned(),
                            definition_source: definition_source.to_owned(),
                        });
                    }
                    fs.set_parent(source, target_parent_dir)?;
                    fs.set_name(source, basename)?;
                    return Ok(());
                }
            }
        };

        let target_dir_path = fs.path(target_dir);
        let mut basenames: std::collections::BTreeMap<String, NodeId> =
            std::collections::BTreeMap::new();
        for m in matches {
            if fs.path(m) == target_dir_path {
                return Err(TransformError::MoveIntoSelf {
                    pattern: match_rule.describe_match_short(),
                    dest: dest_path.to_owned(),
                    definition_source: definition_source.to_owned(),
                });
            }
            let name = fs.name(m).to_owned();
            if let Some(&other) = basenames.get(&name) {
                return Err(TransformError::MoveBasenameCollision {
                    pattern: match_rule.describe_match_short(),
                    dest: dest_path.to_owned(),
                    basename: name,
                    first: fs.path(other),
                    second: fs.path(m),
                    definition_source: definition_source.to_owned(),
                });
            }
            if let Some(existing) = fs.get(target_dir, &name) {
                if fs.is_dir(existing) {
                    return Err(TransformError::MoveReplacesDirectory {
                        pattern: match_rule.describe_match_short(),
                        dest: dest_path.to_owned(),
                        source_path: fs.path(m),
                        existing: fs.path(existing),
                        definition_source: definition_source.to_owned(),
                    });
                }
            }
            basenames.insert(name, m);
            fs.set_parent(m, target_dir)?;
        }
        Ok(())
    }

    fn apply_create_symlink(
        fs: &mut Fs,
        link_target: &str,
        link_dest: &str,
        replacement_rule: SymlinkReplacementRule,
        definition_source: &str,
    ) -> Result<(), TransformError> {
        let (dir_part, link_name) = link_dest
            .rsplit_once('/')
            .map_or((".", link_dest), |(d, b)| (d, b));
        let dir = ensure_is_directory(fs, dir_part, definition_source)?;
        if let Some(existing) = fs.get(dir, link_name) {
            let (unlink, reason) = match replacement_rule {
                SymlinkReplacementRule::AbortOnNonEmptyDirectory => (
                    !fs.is_dir(existing) || !fs.has_children(existing),
                    "the path is a non-empty directory",
                ),
                SymlinkReplacementRule::DiscardExisting => (true, ""),
                SymlinkReplacementRule::ErrorIfDirectory => {
                    (!fs.is_dir(existing), "the path is a directory")
                }
                SymlinkReplacementRule::ErrorIfExists => (false, "the path exists"),
            };
            if unlink {
                fs.unlink(existing, true)?;
            } else {
                return Err(TransformError::RefusedSymlinkReplacement {
                    path: fs.path(existing),
                    reason: reason.to_owned(),
                    replacement_rule: replacement_rule.to_string(),
                    definition_source: definition_source.to_owned(),
                });
            }
        }
        fs.add_symlink(dir, link_name, link_target)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_path_metadata(
        fs: &mut Fs,
        match_rules: &[MatchRule],
        owner: Option<&StaticOwner>,
        group: Option<&StaticGroup>,
        mode: Option<&FileSystemMode>,
        capabilities: Option<&str>,
        capability_mode: Option<&FileSystemMode>,
        recursive: bool,
        definition_source: &str,
    ) -> Result<(), TransformError> {
        debug_assert_eq!(
            capabilities.is_some(),
            capability_mode.is_some(),
            "capabilities and capability_mode go together"
        );
        let needs_file_match = owner.is_some() || group.is_some() || mode.is_some();
        let mut recurse_dirs: Vec<NodeId> = Vec::new();

        for match_rule in match_rules {
            let mut match_ok = false;
            let mut saw_symlink = false;
            let mut saw_directory = false;

            for m in match_rule.finditer(fs, None) {
                if fs.is_symlink(m) {
                    saw_symlink = true;
                    continue;
                }
                if fs.is_file(m) || !needs_file_match {
                    match_ok = true;
                }
                if fs.is_dir(m) {
                    saw_directory = true;
                    if !match_ok && needs_file_match && recursive {
                        match_ok = collect_descendants(fs, m)
                            .iter()
                            .any(|&p| fs.is_file(p));
                    }
                    if recursive {
                        recurse_dirs.push(m);
                    }
                }
                apply_owner_and_mode(
                    fs,
                    m,
                    owner,
                    group,
                    mode,
                    capabilities,
                    capability_mode,
                    definition_source,
                )?;
            }

            if !match_ok {
                if needs_file_match && (saw_directory || saw_symlink) {
                    tracing::warn!(
                        pattern = %match_rule.describe_match_short(),
                        definition_source,
                        "the match rule did not match any files, but given the attributes it \
                         can only apply to files"
                    );
                } else if saw_symlink {
                    tracing::warn!(
                        pattern = %match_rule.describe_match_short(),
                        definition_source,
                        "the match rule matched symlinks, but path-metadata cannot apply to \
                         symlinks"
                    );
                }
                return Err(no_match(match_rule, definition_source));
            }
        }

        for dir in recurse_dirs {
            for descendant in collect_descendants(fs, dir) {
                if fs.is_symlink(descendant) {
                    continue;
                }
                apply_owner_and_mode(
                    fs,
                    descendant,
                    owner,
                    group,
                    mode,
                    capabilities,
                    capability_mode,
                    definition_source,
                )?;
            }
        }
        Ok(())
    }
}
