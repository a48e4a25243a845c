use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use matchers::MatchRule;
use pkgs::{BinaryPackage, ConditionContext, ManifestCondition, Substitution};
use vfs::{Fs, InsertFileOptions, NodeId, VfsError};

use crate::error::InstallError;
use crate::manpage::{manpage_dest_path, ManpageLanguage};
use crate::matcher::{PathMatch, SourcePathMatcher};
use crate::search::SearchDir;

/// Per-package state an install pass writes into.
#[derive(Debug)]
pub struct BinaryPackageInstallContext {
    /// The package being staged.
    pub package: BinaryPackage,
    /// The package's staging tree.
    pub fs_root: Fs,
    /// Package whose name is substituted for `{doc_main_package_name}`.
    pub doc_main_package: String,
}

/// All per-package contexts of one install pass, keyed by package name.
#[derive(Debug, Default)]
pub struct InstallRuleContext {
    contexts: BTreeMap<String, BinaryPackageInstallContext>,
}

impl InstallRuleContext {
    /// Registers a staging tree for `package`.
    ///
    /// The doc main package defaults to the package itself; `-doc`
    /// packages usually name their main package here so their files land
    /// under `usr/share/doc/<main>/`.
    pub fn add_package(&mut self, package: BinaryPackage, doc_main_package: Option<&str>) {
        let doc_main_package = doc_main_package
            .unwrap_or_else(|| package.name())
            .to_owned();
        self.contexts.insert(
            package.name().to_owned(),
            BinaryPackageInstallContext {
                package,
                fs_root: Fs::new(),
                doc_main_package,
            },
        );
    }

    /// The context for `package`, which must have been registered.
    #[must_use]
    pub fn package(&self, package: &str) -> &BinaryPackageInstallContext {
        &self.contexts[package]
    }

    fn package_mut(&mut self, package: &str) -> &mut BinaryPackageInstallContext {
        self.contexts
            .get_mut(package)
            .expect("install rules only target registered packages")
    }

    /// Consumes the context, yielding `(package, staging tree)` pairs.
    #[must_use]
    pub fn into_trees(self) -> Vec<(BinaryPackage, Fs)> {
        self.contexts
            .into_values()
            .map(|ctx| (ctx.package, ctx.fs_root))
            .collect()
    }
}

/// One file shipped through the `debian/` directory with a fixed
/// destination and mode (bash completions, pam files, logrotate configs
/// and the like).
#[derive(Clone, Debug)]
pub struct PackagerProvidedFile {
    /// Real filesystem path of the file.
    pub source: PathBuf,
    /// Destination directory inside the package.
    pub dest_dir: String,
    /// Destination basename.
    pub name: String,
    /// Mode for the installed copy.
    pub mode: u32,
}

/// A source pattern, keeping the raw text for diagnostics.
#[derive(Debug)]
struct PatternSource {
    raw: String,
    rule: MatchRule,
    /// Trailing `/` in the raw pattern restricts the rule to directories.
    dir_only: bool,
}

impl PatternSource {
    fn parse(
        raw: &str,
        definition_source: &str,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        let rule = MatchRule::from_path_or_glob(raw, definition_source, None, substitution)?;
        Ok(Self {
            raw: raw.to_owned(),
            rule,
            dir_only: raw.ends_with('/'),
        })
    }
}

#[derive(Debug)]
enum DestPaths {
    /// `(template, is_format)` pairs. Format templates may reference
    /// `{basename}`, `{dirname}`, `{package_name}` and
    /// `{doc_main_package_name}`; non-format destinations are used
    /// verbatim.
    Literal(Vec<(String, bool)>),
    /// Destination derived from the man page itself.
    Manpage {
        section: Option<u32>,
        language: ManpageLanguage,
    },
}

#[derive(Debug)]
enum RuleKind {
    Install {
        sources: Vec<PatternSource>,
        dest: DestPaths,
        into: BTreeSet<BinaryPackage>,
        require_single_match: bool,
        files_only: bool,
    },
    Discard {
        patterns: Vec<PatternSource>,
        /// Restricts the discard to these search dirs (by real path).
        limit_to: Vec<PathBuf>,
    },
    PackagerProvidedFiles {
        into: BinaryPackage,
        files: Vec<PackagerProvidedFile>,
    },
}

/// A declarative installation intent resolved against the search dirs.
///
/// Rules are applied strictly in manifest order against a shared
/// [`SourcePathMatcher`]; earlier rules win contested paths.
#[derive(Debug)]
pub struct InstallRule {
    kind: RuleKind,
    condition: Option<ManifestCondition>,
    definition_source: String,
}

fn files_only_filter(fs: &Fs, id: NodeId) -> bool {
    !fs.is_file(id)
}

impl InstallRule {
    fn new(kind: RuleKind, condition: Option<ManifestCondition>, definition_source: &str) -> Self {
        Self {
            kind,
            condition,
            definition_source: definition_source.to_owned(),
        }
    }

    fn and_build_docs(condition: Option<ManifestCondition>) -> Option<ManifestCondition> {
        let docs = ManifestCondition::BuildDocs;
        Some(match condition {
            Some(condition) => ManifestCondition::all_of(vec![docs, condition]),
            None => docs,
        })
    }

    /// `install`: each match keeps its source path unless `dest_dir`
    /// redirects it.
    pub fn install_dest(
        sources: &[&str],
        dest_dir: Option<&str>,
        into: BTreeSet<BinaryPackage>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        let dest = match dest_dir {
            Some(dir) => format!("{}/{{basename}}", dir.trim_end_matches('/')),
            None => "{dirname}/{basename}".to_owned(),
        };
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(sources, definition_source, substitution)?,
                dest: DestPaths::Literal(vec![(dest, true)]),
                into,
                require_single_match: false,
                files_only: false,
            },
            condition,
            definition_source,
        ))
    }

    /// `install-as`: exactly one match per package, installed at a fixed
    /// path.
    pub fn install_as(
        source: &str,
        dest_path: &str,
        into: BTreeSet<BinaryPackage>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(&[source], definition_source, substitution)?,
                dest: DestPaths::Literal(vec![(dest_path.to_owned(), false)]),
                into,
                require_single_match: true,
                files_only: false,
            },
            condition,
            definition_source,
        ))
    }

    /// `install-multi-as`: one match copied to two or more fixed paths.
    pub fn install_multi_as(
        source: &str,
        dest_paths: &[&str],
        into: BTreeSet<BinaryPackage>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        debug_assert!(dest_paths.len() >= 2, "use install_as for a single dest");
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(&[source], definition_source, substitution)?,
                dest: DestPaths::Literal(
                    dest_paths.iter().map(|d| ((*d).to_owned(), false)).collect(),
                ),
                into,
                require_single_match: true,
                files_only: false,
            },
            condition,
            definition_source,
        ))
    }

    /// `install-docs`: like `install`, defaulting into the package doc
    /// dir and gated on doc builds being enabled.
    pub fn install_doc(
        sources: &[&str],
        dest_dir: Option<&str>,
        into: BTreeSet<BinaryPackage>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        let dest = match dest_dir {
            Some(dir) => format!("{}/{{basename}}", dir.trim_end_matches('/')),
            None => "usr/share/doc/{doc_main_package_name}/{basename}".to_owned(),
        };
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(sources, definition_source, substitution)?,
                dest: DestPaths::Literal(vec![(dest, true)]),
                into,
                require_single_match: false,
                files_only: false,
            },
            Self::and_build_docs(condition),
            definition_source,
        ))
    }

    /// `install-examples`: into the package's doc `examples/` dir.
    pub fn install_examples(
        sources: &[&str],
        into: BTreeSet<BinaryPackage>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(sources, definition_source, substitution)?,
                dest: DestPaths::Literal(vec![(
                    "usr/share/doc/{doc_main_package_name}/examples/{basename}".to_owned(),
                    true,
                )]),
                into,
                require_single_match: false,
                files_only: false,
            },
            Self::and_build_docs(condition),
            definition_source,
        ))
    }

    /// `install-man`: destination derived from the page's section and
    /// language. Only regular files are eligible.
    pub fn install_man(
        sources: &[&str],
        into: BTreeSet<BinaryPackage>,
        section: Option<u32>,
        language: Option<&str>,
        definition_source: &str,
        condition: Option<ManifestCondition>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        Ok(Self::new(
            RuleKind::Install {
                sources: parse_sources(sources, definition_source, substitution)?,
                dest: DestPaths::Manpage {
                    section,
                    language: ManpageLanguage::from_option(language),
                },
                into,
                require_single_match: false,
                files_only: true,
            },
            Self::and_build_docs(condition),
            definition_source,
        ))
    }

    /// `discard`: reserves matches so no later rule installs them.
    /// `limit_to` restricts the discard to the named search dirs.
    pub fn discard_paths(
        patterns: &[&str],
        definition_source: &str,
        condition: Option<ManifestCondition>,
        limit_to: Vec<PathBuf>,
        substitution: &Substitution,
    ) -> Result<Self, InstallError> {
        Ok(Self::new(
            RuleKind::Discard {
                patterns: parse_sources(patterns, definition_source, substitution)?,
                limit_to,
            },
            condition,
            definition_source,
        ))
    }

    /// Built-in rule installing packager-provided files from `debian/`
    /// at their registered destinations.
    #[must_use]
    pub fn packager_provided_files(into: BinaryPackage, files: Vec<PackagerProvidedFile>) -> Self {
        Self::new(
            RuleKind::PackagerProvidedFiles { into, files },
            None,
            "<built-in; provided by the packaging>",
        )
    }

    /// The rule's origin, for diagnostics.
    #[must_use]
    pub fn definition_source(&self) -> &str {
        &self.definition_source
    }

    /// Resolves and applies this rule.
    pub fn perform_install(
        &self,
        path_matcher: &mut SourcePathMatcher,
        search_dirs: &[SearchDir],
        install_context: &mut InstallRuleContext,
        condition_context: &ConditionContext,
    ) -> Result<(), InstallError> {
        match &self.kind {
            RuleKind::Install {
                sources,
                dest,
                into,
                require_single_match,
                files_only,
            } => {
                let dirs: Vec<&SearchDir> = search_dirs.iter().collect();
                for source in sources {
                    let matches = self.match_pattern(
                        path_matcher,
                        source,
                        condition_context,
                        &dirs,
                        into,
                        *files_only,
                    )?;
                    if *require_single_match {
                        self.check_single_match(source, &matches)?;
                    }
                    self.install_matches(
                        path_matcher,
                        &matches,
                        dest,
                        search_dirs,
                        install_context,
                        into,
                        condition_context,
                    )?;
                }
                Ok(())
            }
            RuleKind::Discard { patterns, limit_to } => {
                let dirs = self.select_search_dirs(search_dirs, limit_to)?;
                let into = BTreeSet::new();
                for pattern in patterns {
                    self.match_pattern(
                        path_matcher,
                        pattern,
                        condition_context,
                        &dirs,
                        &into,
                        false,
                    )?;
                }
                Ok(())
            }
            RuleKind::PackagerProvidedFiles { into, files } => {
                let ctx = install_context.package_mut(into.name());
                for ppf in files {
                    let root = ctx.fs_root.root();
                    let dir = ctx.fs_root.mkdirs(root, &ppf.dest_dir)?;
                    ctx.fs_root.insert_file_from_backing_path(
                        dir,
                        &ppf.name,
                        &ppf.source,
                        InsertFileOptions {
                            follow_symlinks: true,
                            use_fs_path_mode: false,
                            mode: ppf.mode,
                            may_steal: false,
                        },
                    )?;
                }
                Ok(())
            }
        }
    }

    fn select_search_dirs<'a>(
        &self,
        search_dirs: &'a [SearchDir],
        limit_to: &[PathBuf],
    ) -> Result<Vec<&'a SearchDir>, InstallError> {
        if limit_to.is_empty() {
            return Ok(search_dirs.iter().collect());
        }
        let selected: Vec<&SearchDir> = search_dirs
            .iter()
            .filter(|s| limit_to.iter().any(|p| p == s.fs_path()))
            .collect();
        if selected.len() != limit_to.len() {
            let unknown = limit_to
                .iter()
                .filter(|p| !search_dirs.iter().any(|s| s.fs_path() == p.as_path()))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(":");
            return Err(InstallError::UnknownLimitTo {
                definition_source: self.definition_source.clone(),
                paths: unknown,
            });
        }
        Ok(selected)
    }

    fn match_pattern(
        &self,
        path_matcher: &mut SourcePathMatcher,
        source: &PatternSource,
        condition_context: &ConditionContext,
        search_dirs: &[&SearchDir],
        into: &BTreeSet<BinaryPackage>,
        files_only: bool,
    ) -> Result<Vec<PathMatch>, InstallError> {
        let filter: Option<&dyn Fn(&Fs, NodeId) -> bool> =
            files_only.then_some(&files_only_filter as &dyn Fn(&Fs, NodeId) -> bool);
        let (matched, (already_installed, already_excluded)) = path_matcher
            .find_and_reserve_all_matches(
                &source.rule,
                search_dirs,
                source.dir_only,
                filter,
                into,
                &self.definition_source,
            )?;

        let allow_empty_match = if self.condition_disabled(condition_context) {
            true
        } else if into.is_empty() {
            // A discard can only be empty-tolerated when none of its
            // search dirs exist on disk (the build never staged them).
            !search_dirs.iter().any(|s| s.exists())
        } else {
            into.iter().all(|p| !p.should_be_acted_on())
        };

        if matched.is_empty() && !allow_empty_match {
            let search_dir_text = search_dirs
                .iter()
                .map(|s| s.fs_path().display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(InstallError::NoMatch {
                pattern: source.raw.clone(),
                search_dirs: search_dir_text,
                definition_source: self.definition_source.clone(),
                match_description: source.rule.describe_match_exact(),
                already_installed,
                already_excluded,
            });
        }
        Ok(matched)
    }

    fn condition_disabled(&self, condition_context: &ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_some_and(|c| !c.evaluate(condition_context))
    }

    fn check_single_match(
        &self,
        source: &PatternSource,
        matches: &[PathMatch],
    ) -> Result<(), InstallError> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for m in matches {
            for pkg in &m.into {
                *seen.entry(pkg.name()).or_default() += 1;
            }
        }
        let problem_pkgs: Vec<&str> = seen
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|(&name, _)| name)
            .collect();
        if problem_pkgs.is_empty() {
            return Ok(());
        }
        Err(InstallError::MultipleMatches {
            pattern: source.raw.clone(),
            packages: problem_pkgs.join(", "),
            definition_source: self.definition_source.clone(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn install_matches(
        &self,
        path_matcher: &mut SourcePathMatcher,
        matches: &[PathMatch],
        dest: &DestPaths,
        search_dirs: &[SearchDir],
        install_context: &mut InstallRuleContext,
        into: &BTreeSet<BinaryPackage>,
        condition_context: &ConditionContext,
    ) -> Result<(), InstallError> {
        if self.condition_disabled(condition_context)
            || !into.iter().any(BinaryPackage::should_be_acted_on)
        {
            // The matches stay reserved so later rules cannot pick them
            // up, but nothing is installed.
            return Ok(());
        }

        for m in matches {
            let src_fs = search_dirs[m.search_dir].fs();
            let dests = self.resolve_dest_paths(src_fs, m, dest, install_context)?;
            let mut install_recursively_into: Vec<(String, NodeId)> = Vec::new();
            for (dest_path, pkg_name) in dests {
                let (dir_part, basename) = match dest_path.rsplit_once('/') {
                    Some((dir, base)) => (dir.to_owned(), base.to_owned()),
                    None => (".".to_owned(), dest_path.clone()),
                };
                let ctx = install_context.package_mut(&pkg_name);
                let root = ctx.fs_root.root();
                let dir_id = ctx.fs_root.mkdirs(root, &dir_part)?;
                let existing = ctx.fs_root.get(dir_id, &basename);

                if src_fs.is_dir(m.node) {
                    let current_dir = match existing {
                        Some(existing) if ctx.fs_root.is_dir(existing) => existing,
                        Some(existing) => {
                            ctx.fs_root.unlink(existing, false)?;
                            clone_dir_entry(src_fs, m.node, &mut ctx.fs_root, dir_id, &basename)?
                        }
                        None => {
                            clone_dir_entry(src_fs, m.node, &mut ctx.fs_root, dir_id, &basename)?
                        }
                    };
                    install_recursively_into.push((pkg_name, current_dir));
                } else {
                    if let Some(existing) = existing {
                        if ctx.fs_root.is_dir(existing) {
                            return Err(InstallError::DestinationIsDirectory {
                                source_path: src_fs.path(m.node),
                                fs_path: src_fs
                                    .backing_path(m.node)
                                    .map_or_else(|| src_fs.path(m.node).into(), Into::into),
                                dest: dest_path,
                                definition_source: self.definition_source.clone(),
                            });
                        }
                    }
                    copy_leaf(src_fs, m.node, &mut ctx.fs_root, dir_id, &basename)?;
                }
            }
            if !install_recursively_into.is_empty() {
                self.install_dir_recursively(
                    path_matcher,
                    src_fs,
                    m,
                    &install_recursively_into,
                    install_context,
                )?;
            }
        }
        Ok(())
    }

    /// Clones a matched directory's contents into each destination,
    /// consulting the ledger per entry so discards apply inside the
    /// subtree, and reserving every copied entry.
    fn install_dir_recursively(
        &self,
        path_matcher: &mut SourcePathMatcher,
        src_fs: &Fs,
        m: &PathMatch,
        parents: &[(String, NodeId)],
        install_context: &mut InstallRuleContext,
    ) -> Result<(), InstallError> {
        let mut stack: Vec<(Vec<(String, NodeId)>, NodeId)> = src_fs
            .children(m.node)
            .into_iter()
            .filter(|&entry| !path_matcher.is_reserved(src_fs, entry))
            .map(|entry| (parents.to_vec(), entry))
            .collect();

        while let Some((current_dirs, entry)) = stack.pop() {
            path_matcher.reserve(src_fs, entry, &m.into, &self.definition_source, false);
            let name = src_fs.name(entry).to_owned();
            if src_fs.is_dir(entry) {
                let mut new_dirs = Vec::with_capacity(current_dirs.len());
                for (pkg_name, parent) in &current_dirs {
                    let ctx = install_context.package_mut(pkg_name);
                    let new_dir = clone_dir_entry(src_fs, entry, &mut ctx.fs_root, *parent, &name)?;
                    new_dirs.push((pkg_name.clone(), new_dir));
                }
                stack.extend(
                    src_fs
                        .children(entry)
                        .into_iter()
                        .filter(|&child| !path_matcher.is_reserved(src_fs, child))
                        .map(|child| (new_dirs.clone(), child)),
                );
            } else {
                for (pkg_name, parent) in &current_dirs {
                    let ctx = install_context.package_mut(pkg_name);
                    copy_leaf(src_fs, entry, &mut ctx.fs_root, *parent, &name)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_dest_paths(
        &self,
        src_fs: &Fs,
        m: &PathMatch,
        dest: &DestPaths,
        install_context: &InstallRuleContext,
    ) -> Result<Vec<(String, String)>, InstallError> {
        let mut out = Vec::new();
        match dest {
            DestPaths::Manpage { section, language } => {
                let dest_path =
                    manpage_dest_path(src_fs, m.node, *section, language, &self.definition_source)?;
                self.check_dest_path(src_fs, m.node, &dest_path)?;
                for pkg in &m.into {
                    out.push((dest_path.clone(), pkg.name().to_owned()));
                }
            }
            DestPaths::Literal(templates) => {
                for (template, is_format) in templates {
                    if *is_format {
                        let dirname = src_fs
                            .parent(m.node)
                            .map_or_else(|| ".".to_owned(), |p| src_fs.path(p));
                        for pkg in &m.into {
                            let ctx = install_context.package(pkg.name());
                            let dest_path = template
                                .replace("{basename}", src_fs.name(m.node))
                                .replace("{dirname}", &dirname)
                                .replace("{package_name}", pkg.name())
                                .replace("{doc_main_package_name}", &ctx.doc_main_package);
                            self.check_dest_path(src_fs, m.node, &dest_path)?;
                            out.push((dest_path, pkg.name().to_owned()));
                        }
                    } else {
                        self.check_dest_path(src_fs, m.node, template)?;
                        for pkg in &m.into {
                            out.push((template.clone(), pkg.name().to_owned()));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn check_dest_path(&self, src_fs: &Fs, node: NodeId, dest: &str) -> Result<(), InstallError> {
        if dest.ends_with('/') {
            return Err(InstallError::DestinationEndsWithSlash {
                source_path: src_fs.path(node),
                dest: dest.to_owned(),
            });
        }
        Ok(())
    }
}

fn parse_sources(
    sources: &[&str],
    definition_source: &str,
    substitution: &Substitution,
) -> Result<Vec<PatternSource>, InstallError> {
    sources
        .iter()
        .map(|raw| PatternSource::parse(raw, definition_source, substitution))
        .collect()
}

/// Copies a file or symlink node between trees.
///
/// Files stay backed by the same real filesystem path and keep their
/// on-disk mode; symlink targets are carried over verbatim.
fn copy_leaf(
    src_fs: &Fs,
    src: NodeId,
    dst_fs: &mut Fs,
    parent: NodeId,
    name: &str,
) -> Result<NodeId, InstallError> {
    if src_fs.is_symlink(src) {
        let target = src_fs.readlink(src)?.to_owned();
        Ok(dst_fs.add_symlink(parent, name, &target)?)
    } else {
        let source = src_fs
            .backing_path(src)
            .ok_or_else(|| VfsError::NoBackingPath {
                path: src_fs.path(src),
            })?
            .to_path_buf();
        Ok(dst_fs.insert_file_from_backing_path(
            parent,
            name,
            &source,
            InsertFileOptions {
                follow_symlinks: false,
                use_fs_path_mode: true,
                ..InsertFileOptions::default()
            },
        )?)
    }
}

/// Creates a directory in the destination mirroring the source node's
/// mode.
fn clone_dir_entry(
    src_fs: &Fs,
    src: NodeId,
    dst_fs: &mut Fs,
    parent: NodeId,
    name: &str,
) -> Result<NodeId, InstallError> {
    let dir = dst_fs.mkdir(parent, name)?;
    dst_fs.set_mode(dir, src_fs.mode(src))?;
    Ok(dir)
}
