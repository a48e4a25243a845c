use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use pkgs::BinaryPackage;
use rustc_hash::FxHashMap;
use vfs::Fs;

use crate::error::InstallError;

/// One search directory: a scanned source tree plus the set of packages
/// whose install rules may draw from it.
#[derive(Debug)]
pub struct SearchDir {
    fs: Fs,
    fs_path: PathBuf,
    applies_to: BTreeSet<BinaryPackage>,
    exists: bool,
}

impl SearchDir {
    /// Scans `dir` from disk.
    ///
    /// A missing directory yields an empty tree; discard rules tolerate
    /// that (the dir belongs to a package that is not being built), while
    /// install rules report it as "no matches".
    pub fn scan(dir: &Path, applies_to: BTreeSet<BinaryPackage>) -> Result<Self, vfs::VfsError> {
        let exists = dir.is_dir();
        let fs = if exists {
            Fs::from_fs_directory(dir)?
        } else {
            Fs::new()
        };
        Ok(Self {
            fs,
            fs_path: dir.to_path_buf(),
            applies_to,
            exists,
        })
    }

    /// Wraps an already-built tree, mainly for tests.
    #[must_use]
    pub fn from_tree(fs: Fs, fs_path: PathBuf, applies_to: BTreeSet<BinaryPackage>) -> Self {
        Self {
            fs,
            fs_path,
            applies_to,
            exists: true,
        }
    }

    /// The scanned tree.
    #[must_use]
    pub fn fs(&self) -> &Fs {
        &self.fs
    }

    /// The on-disk location of the tree.
    #[must_use]
    pub fn fs_path(&self) -> &Path {
        &self.fs_path
    }

    /// The packages this search dir applies to.
    #[must_use]
    pub fn applies_to(&self) -> &BTreeSet<BinaryPackage> {
        &self.applies_to
    }

    /// Whether the directory existed on disk when scanned.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }
}

#[derive(Debug)]
struct OrderState {
    path: PathBuf,
    applies_to: BTreeSet<BinaryPackage>,
    after: BTreeSet<PathBuf>,
}

/// Linearizes the per-package search-dir orders into one global order.
///
/// Each package lists its dirs in precedence order (falling back to
/// `default_search_dirs`); a dir must come after every dir listed before
/// it for any package. The relation is resolved by releasing dirs whose
/// predecessors have all been released; if no progress can be made the
/// orders are circular and the build fails. The source root is appended
/// last, applicable to all packages.
///
/// Returns `(path, applicable packages)` pairs; scanning is the caller's
/// concern.
pub fn resolve_search_dir_order(
    requested: &[(BinaryPackage, Vec<PathBuf>)],
    all_packages: &BTreeSet<BinaryPackage>,
    default_search_dirs: &[PathBuf],
    source_root: &Path,
) -> Result<Vec<(PathBuf, BTreeSet<BinaryPackage>)>, InstallError> {
    let mut table: Vec<OrderState> = Vec::new();
    let mut index: FxHashMap<PathBuf, usize> = FxHashMap::default();
    let requested_by: FxHashMap<&BinaryPackage, &Vec<PathBuf>> =
        requested.iter().map(|(pkg, dirs)| (pkg, dirs)).collect();
    let default_dirs: Vec<PathBuf> = default_search_dirs.to_vec();

    for pkg in all_packages {
        let paths = requested_by.get(pkg).map_or(&default_dirs, |dirs| *dirs);
        let mut previous: Option<PathBuf> = None;
        for path in paths {
            let state_index = *index.entry(path.clone()).or_insert_with(|| {
                table.push(OrderState {
                    path: path.clone(),
                    applies_to: BTreeSet::new(),
                    after: BTreeSet::new(),
                });
                table.len() - 1
            });
            table[state_index].applies_to.insert(pkg.clone());
            if let Some(previous) = previous {
                table[state_index].after.insert(previous);
            }
            previous = Some(path.clone());
        }
    }

    let mut ordered: Vec<(PathBuf, BTreeSet<BinaryPackage>)> = Vec::with_capacity(table.len() + 1);
    let mut released: BTreeSet<PathBuf> = BTreeSet::new();
    let mut remaining: Vec<usize> = Vec::new();
    for (i, state) in table.iter().enumerate() {
        if state.after.is_subset(&released) {
            ordered.push((state.path.clone(), state.applies_to.clone()));
            released.insert(state.path.clone());
        } else {
            remaining.push(i);
        }
    }
    while !remaining.is_empty() {
        let before = released.len();
        remaining.retain(|&i| {
            let state = &table[i];
            if state.after.is_subset(&released) {
                ordered.push((state.path.clone(), state.applies_to.clone()));
                released.insert(state.path.clone());
                false
            } else {
                true
            }
        });
        if released.len() == before {
            let dirs = remaining
                .iter()
                .map(|&i| table[i].path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(InstallError::CircularSearchDirOrder { dirs });
        }
    }

    ordered.push((source_root.to_path_buf(), all_packages.clone()));
    Ok(ordered)
}
