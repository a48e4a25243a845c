//! Debian's `dh_fixperms`-style permission normalization, expressed as an
//! ordered match-rule table.

use matchers::MatchRule;
use meta::FileSystemMode;
use pkgs::Substitution;
use rustc_hash::FxHashSet;
use vfs::{Fs, PathKind};

use crate::error::TransformError;

const BUILTIN: &str = "<built-in normalization of permissions>";

/// Basename extensions that are never executable.
const NON_EXEC_BASENAME_GLOBS: &[&str] = &[
    "*.so.*", "*.so", "*.la", "*.a", "*.js", "*.css", "*.scss", "*.sass", "*.jpeg", "*.jpg",
    "*.png", "*.gif", "*.cmxs", "*.node",
];

/// Directories whose entire file content is documentation or data.
const NON_EXEC_TREES: &[&str] = &[
    "usr/share/man",
    "usr/include",
    "usr/share/applications",
    "usr/share/lintian/overrides",
];

/// Directories whose direct file children are executables.
const EXEC_BIN_DIRS: &[&str] = &[
    "usr/bin",
    "usr/bin/mh",
    "bin",
    "usr/sbin",
    "sbin",
    "usr/games",
    "usr/libexec",
    "etc/init.d",
];

/// An ordered permission-normalization table. The first rule matching a
/// path wins; later rules never revisit it.
#[derive(Debug)]
pub struct ModeNormalizationTable {
    rules: Vec<(MatchRule, FileSystemMode)>,
}

impl ModeNormalizationTable {
    /// Builds the standard Debian normalization table.
    ///
    /// `substitution` must define `PACKAGE`; `perl_module_dirs` lists the
    /// perl vendor/arch library roots whose `*.pm` files must not be
    /// executable.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] if a pattern or mode spec fails to
    /// parse, which would indicate a broken table rather than bad input.
    pub fn builtin(
        substitution: &Substitution,
        perl_module_dirs: &[String],
    ) -> Result<Self, TransformError> {
        let mode_0644 = FileSystemMode::Octal(0o644);
        let mode_0755 = FileSystemMode::Octal(0o755);
        let file = Some(PathKind::File);
        let mut rules: Vec<(MatchRule, FileSystemMode)> = Vec::new();

        for glob in NON_EXEC_BASENAME_GLOBS {
            rules.push((
                MatchRule::from_path_or_glob(glob, BUILTIN, file, substitution)?,
                mode_0644.clone(),
            ));
        }
        for tree in NON_EXEC_TREES {
            rules.push((
                MatchRule::recursive_beneath_directory(tree, BUILTIN, file, substitution)?,
                mode_0644.clone(),
            ));
        }
        for bin_dir in EXEC_BIN_DIRS {
            let pattern = format!("{bin_dir}/*");
            rules.push((
                MatchRule::from_path_or_glob(&pattern, BUILTIN, file, substitution)?,
                mode_0755.clone(),
            ));
        }
        rules.push((
            MatchRule::from_path_or_glob("etc/sudoers.d/*", BUILTIN, file, substitution)?,
            FileSystemMode::Octal(0o440),
        ));
        rules.push((
            MatchRule::from_path_or_glob(
                "usr/share/bug/{{PACKAGE}}",
                BUILTIN,
                Some(PathKind::Directory),
                substitution,
            )?,
            mode_0755.clone(),
        ));
        rules.push((
            MatchRule::recursive_beneath_directory(
                "usr/share/bug/{{PACKAGE}}",
                BUILTIN,
                file,
                substitution,
            )?,
            mode_0644.clone(),
        ));
        rules.push((
            MatchRule::from_path_or_glob(
                "usr/share/bug/{{PACKAGE}}/script",
                BUILTIN,
                file,
                substitution,
            )?,
            mode_0755.clone(),
        ));
        rules.push((MatchRule::usr_share_doc_content(), mode_0644));

        let strip_exec = FileSystemMode::symbolic("a-x")?;
        for perl_dir in perl_module_dirs {
            rules.push((
                MatchRule::basename_glob_beneath_directory(
                    perl_dir,
                    "*.pm",
                    BUILTIN,
                    file,
                    substitution,
                )?,
                strip_exec.clone(),
            ));
        }
        rules.push((
            MatchRule::basename_glob_beneath_directory(
                "usr/lib",
                "*.ali",
                BUILTIN,
                file,
                substitution,
            )?,
            FileSystemMode::symbolic("a-w")?,
        ));
        rules.push((MatchRule::shebang_scripts(), mode_0755));
        rules.push((
            MatchRule::match_anything(),
            FileSystemMode::symbolic("go=rX,u+rw,a-s")?,
        ));

        Ok(Self { rules })
    }

    /// Applies the table to `fs`. Symlinks carry a fixed mode and are
    /// skipped; rules matching nothing are not an error here, unlike
    /// packager transformations.
    pub fn apply(&self, fs: &mut Fs) -> Result<(), TransformError> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for (rule, mode) in &self.rules {
            let ignore = |id| seen.contains(&fs.path(id));
            let matches = rule.finditer(fs, Some(&ignore));
            for m in matches {
                if fs.is_symlink(m) {
                    continue;
                }
                let path = fs.path(m);
                if !seen.insert(path) {
                    continue;
                }
                let desired = mode.compute_mode(fs.mode(m), fs.is_dir(m));
                fs.set_mode(m, desired)?;
            }
        }
        Ok(())
    }
}
