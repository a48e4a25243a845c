use std::collections::BTreeSet;
use std::path::PathBuf;

use install::{
    builtin_discard_rules, resolve_search_dir_order, InstallRule, InstallRuleContext,
    PackagerProvidedFile, SearchDir, SourcePathMatcher,
};
use manifest::{generate_intermediate_manifest, IntermediateManifest};
use pkgs::{BinaryPackage, ConditionContext, Substitution};
use transform::{normalize_shebang_lines, ModeNormalizationTable, TransformationRule};
use vfs::{BuildContext, Fs};

use crate::error::BuildError;

/// `data.tar` members newer than this are clamped for reproducibility.
/// Real builds derive it from `SOURCE_DATE_EPOCH`.
const DEFAULT_CLAMP_MTIME: u64 = 2_000_000_000;

/// Everything the manifest layer declares for one binary package.
#[derive(Debug, Default)]
pub struct PackagePipeline {
    /// Explicit search dirs in precedence order; empty means the
    /// driver-wide defaults.
    pub search_dirs: Vec<PathBuf>,
    /// Package whose doc dir this package's docs land in (`-doc`
    /// packages usually point at their main package).
    pub doc_main_package: Option<String>,
    /// Convention-named `debian/` files to install without an explicit
    /// rule (`debian/foo.service` and friends).
    pub packager_provided_files: Vec<PackagerProvidedFile>,
    /// Transformations, in manifest order.
    pub transformations: Vec<TransformationRule>,
}

/// A finished package: its frozen staging tree and the member list the
/// archive assembler consumes.
#[derive(Debug)]
pub struct PackageOutput {
    /// The package.
    pub package: BinaryPackage,
    /// The frozen staging tree.
    pub fs_root: Fs,
    /// The intermediate manifest derived from it.
    pub intermediate_manifest: IntermediateManifest,
}

/// Drives one build invocation: search-dir resolution, the shared
/// install pass, per-package transformation, freeze and manifest
/// emission.
#[derive(Debug)]
pub struct BuildDriver {
    source_root: PathBuf,
    condition_context: ConditionContext,
    substitution: Substitution,
    default_search_dirs: Vec<PathBuf>,
    packages: Vec<(BinaryPackage, PackagePipeline)>,
    install_rules: Vec<InstallRule>,
    perl_module_dirs: Vec<String>,
    clamp_mtime_to: u64,
}

impl BuildDriver {
    /// Creates a driver rooted at the unpacked source tree.
    #[must_use]
    pub fn new(source_root: impl Into<PathBuf>, condition_context: ConditionContext) -> Self {
        Self {
            source_root: source_root.into(),
            condition_context,
            substitution: Substitution::new(),
            default_search_dirs: Vec::new(),
            packages: Vec::new(),
            install_rules: Vec::new(),
            perl_module_dirs: Vec::new(),
            clamp_mtime_to: DEFAULT_CLAMP_MTIME,
        }
    }

    /// Sets the search dirs used by packages without explicit ones
    /// (conventionally `debian/tmp`).
    #[must_use]
    pub fn with_default_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.default_search_dirs = dirs;
        self
    }

    /// Sets the manifest-level substitution variables. `PACKAGE` is
    /// overridden per package during the transformation phase.
    #[must_use]
    pub fn with_substitution(mut self, substitution: Substitution) -> Self {
        self.substitution = substitution;
        self
    }

    /// Sets the perl module roots for permission normalization.
    #[must_use]
    pub fn with_perl_module_dirs(mut self, dirs: Vec<String>) -> Self {
        self.perl_module_dirs = dirs;
        self
    }

    /// Sets the reproducibility mtime cutoff (`SOURCE_DATE_EPOCH`).
    #[must_use]
    pub const fn with_clamp_mtime_to(mut self, clamp: u64) -> Self {
        self.clamp_mtime_to = clamp;
        self
    }

    /// Registers a binary package and its per-package declarations.
    pub fn add_package(&mut self, package: BinaryPackage, pipeline: PackagePipeline) {
        self.packages.push((package, pipeline));
    }

    /// Appends an install rule. Rules run in the order they were added.
    pub fn add_install_rule(&mut self, rule: InstallRule) {
        self.install_rules.push(rule);
    }

    /// Runs the whole build: install pass, missing-path check, then the
    /// per-package transformation pipeline and manifest emission.
    ///
    /// # Errors
    ///
    /// Fails fast on the first unresolvable rule, on source paths that
    /// were never installed nor discarded, and on any structural
    /// violation in the transformation phase.
    pub fn run(self, context: &BuildContext) -> Result<Vec<PackageOutput>, BuildError> {
        let all_packages: BTreeSet<BinaryPackage> =
            self.packages.iter().map(|(pkg, _)| pkg.clone()).collect();
        let requested: Vec<(BinaryPackage, Vec<PathBuf>)> = self
            .packages
            .iter()
            .filter(|(_, pipeline)| !pipeline.search_dirs.is_empty())
            .map(|(pkg, pipeline)| (pkg.clone(), pipeline.search_dirs.clone()))
            .collect();
        let order = resolve_search_dir_order(
            &requested,
            &all_packages,
            &self.default_search_dirs,
            &self.source_root,
        )?;
        let mut search_dirs = Vec::with_capacity(order.len());
        for (path, applies_to) in order {
            search_dirs.push(SearchDir::scan(&path, applies_to)?);
        }

        let mut matcher = SourcePathMatcher::new(builtin_discard_rules());
        let mut rule_context = InstallRuleContext::default();
        for (package, pipeline) in &self.packages {
            rule_context.add_package(package.clone(), pipeline.doc_main_package.as_deref());
        }

        // Packager-provided files are claimed before any manifest rule
        // gets a chance to match them.
        for (package, pipeline) in &self.packages {
            if pipeline.packager_provided_files.is_empty() {
                continue;
            }
            let rule = InstallRule::packager_provided_files(
                package.clone(),
                pipeline.packager_provided_files.clone(),
            );
            rule.perform_install(
                &mut matcher,
                &search_dirs,
                &mut rule_context,
                &self.condition_context,
            )?;
        }
        for rule in &self.install_rules {
            rule.perform_install(
                &mut matcher,
                &search_dirs,
                &mut rule_context,
                &self.condition_context,
            )?;
        }

        for (rule_name, paths) in matcher.auto_discard_usage() {
            tracing::info!(
                rule = %rule_name,
                count = paths.len(),
                "automatic discard rule excluded source paths"
            );
            for path in paths {
                tracing::debug!(rule = %rule_name, path = %path.display(), "discarded");
            }
        }

        // The source root is always appended as a fallback search dir; paths
        // living there (debian/, upstream sources) are not expected to be
        // installed, so only the real staging dirs are checked for leftovers.
        let mut uninstalled = Vec::new();
        for search_dir in &search_dirs {
            if search_dir.fs_path() == self.source_root {
                continue;
            }
            let fs = search_dir.fs();
            for id in matcher.detect_missing(fs) {
                uninstalled.push(fs.path(id));
            }
        }
        if !uninstalled.is_empty() {
            return Err(BuildError::UninstalledPaths {
                paths: uninstalled,
            });
        }

        let mut outputs = Vec::new();
        for (package, mut fs_root) in rule_context.into_trees() {
            if !package.should_be_acted_on() {
                tracing::debug!(package = %package.name(), "skipping inactive package");
                continue;
            }
            let pipeline = self
                .packages
                .iter()
                .find(|(pkg, _)| pkg == &package)
                .map(|(_, pipeline)| pipeline)
                .expect("trees only exist for registered packages");

            let substitution = self
                .substitution
                .clone()
                .with_variable("PACKAGE", package.name());
            let table = ModeNormalizationTable::builtin(&substitution, &self.perl_module_dirs)?;
            table.apply(&mut fs_root)?;
            for rule in &pipeline.transformations {
                rule.apply(&mut fs_root, &self.condition_context)?;
            }
            normalize_shebang_lines(&mut fs_root, context)?;

            fs_root.freeze();
            let intermediate_manifest =
                generate_intermediate_manifest(&mut fs_root, self.clamp_mtime_to)?;
            outputs.push(PackageOutput {
                package,
                fs_root,
                intermediate_manifest,
            });
        }
        Ok(outputs)
    }
}
