use std::sync::LazyLock;

use regex::Regex;
use vfs::{Fs, NodeId};

/// Version-control droppings that never belong in a binary package.
const VCS_PATHS: &[&str] = &[
    ".arch-inventory",
    ".arch-ids",
    ".be",
    ".bzrbackup",
    ".bzrignore",
    ".bzrtags",
    ".cvsignore",
    ".hg",
    ".hgignore",
    ".hgtags",
    ".hgsigs",
    ".git",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
    ".gitreview",
    ".mailmap",
    ".mtn-ignore",
    ".svn",
    "{arch}",
    "CVS",
    "RCS",
    "_MTN",
    "_darcs",
];

/// Files whose joint presence marks a directory as doxygen output.
const DOXYGEN_DIR_TEST_FILES: &[&str] = &["doxygen.css", "doxygen.svg", "index.html"];

static BACKUP_FILES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r".*~",
        r"|.*[.](?:bak|orig|rej)",
        r"|[.]#.*",
        r"|[.].*[.]sw.",
        r"|[.]shelf",
        r"|,,.*",
        r"|DEADJOE",
        r")$",
    ))
    .expect("static regex compiles")
});

/// A named predicate that automatically hides build cruft from glob
/// install rules.
///
/// An exact-path install rule overrides the verdict; the driver reports
/// which rules fired so a build log explains every hidden path.
pub struct AutoDiscardRule {
    name: String,
    verdict: Box<dyn Fn(&Fs, NodeId) -> bool + Send + Sync>,
}

impl AutoDiscardRule {
    /// Creates a rule with a display name and a discard predicate.
    pub fn new(
        name: impl Into<String>,
        verdict: impl Fn(&Fs, NodeId) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            verdict: Box::new(verdict),
        }
    }

    /// The rule's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn should_discard(&self, fs: &Fs, id: NodeId) -> bool {
        (self.verdict)(fs, id)
    }
}

impl std::fmt::Debug for AutoDiscardRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoDiscardRule")
            .field("name", &self.name)
            .finish()
    }
}

/// The stock automatic discard rules applied to every install pass.
#[must_use]
pub fn builtin_discard_rules() -> Vec<AutoDiscardRule> {
    vec![
        AutoDiscardRule::new("la-files", |fs, id| {
            fs.is_file(id) && fs.name(id).ends_with(".la") && fs.path(id).starts_with("./usr/lib")
        }),
        AutoDiscardRule::new("python-cache-files", |fs, id| {
            if fs.name(id) == "__pycache__" && fs.is_dir(id) {
                return true;
            }
            let name = fs.name(id);
            (name.ends_with(".pyc") || name.ends_with(".pyo")) && fs.is_file(id)
        }),
        AutoDiscardRule::new("backup-files", |fs, id| {
            BACKUP_FILES_RE.is_match(fs.name(id))
        }),
        AutoDiscardRule::new("version-control-paths", |fs, id| {
            VCS_PATHS.contains(&fs.name(id))
        }),
        AutoDiscardRule::new("gnu-info-dir-file", |fs, id| {
            fs.path(id) == "./usr/share/info/dir"
        }),
        AutoDiscardRule::new("debian-dir", |fs, id| fs.path(id) == "./DEBIAN"),
        AutoDiscardRule::new("doxygen-cruft-files", |fs, id| {
            let name = fs.name(id);
            if !fs.is_file(id) || !(name.ends_with(".md5") || name.ends_with(".map")) {
                return false;
            }
            let mut dir = fs.parent(id);
            while let Some(d) = dir {
                let is_doxygen_dir = DOXYGEN_DIR_TEST_FILES
                    .iter()
                    .all(|probe| fs.get(d, probe).is_some_and(|p| fs.is_file(p)));
                if is_doxygen_dir {
                    return true;
                }
                dir = fs.parent(d);
            }
            false
        }),
    ]
}
