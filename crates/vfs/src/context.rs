use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;

/// Per-invocation build state: the scratch directory for generated and
/// staged file content.
///
/// The scratch area lives in a temporary directory with a pid-derived
/// subdirectory, so concurrent builds on the same machine never collide.
/// Content is cleaned up when the context is dropped.
#[derive(Debug)]
pub struct BuildContext {
    scratch_dir: PathBuf,
    counter: AtomicU64,
    _tempdir: TempDir,
}

impl BuildContext {
    /// Creates a fresh scratch area.
    pub fn new() -> io::Result<Self> {
        let tempdir = tempfile::Builder::new().prefix("debpack-").tempdir()?;
        let scratch_dir = tempdir.path().join(format!("pid{}", std::process::id()));
        std::fs::create_dir(&scratch_dir)?;
        Ok(Self {
            scratch_dir,
            counter: AtomicU64::new(0),
            _tempdir: tempdir,
        })
    }

    /// Returns the scratch directory path.
    ///
    /// The path itself is not a stable API; only content staged through
    /// this context may assume it exists.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Reserves a fresh, unique backing path for `basename`.
    ///
    /// The basename is kept as a suffix so stray scratch files remain
    /// attributable during debugging.
    pub(crate) fn fresh_backing_path(&self, basename: &str) -> PathBuf {
        let serial = self.counter.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir.join(format!("{serial:06}__{basename}"))
    }

    /// Writes `content` to a fresh scratch file and returns its path.
    pub(crate) fn stage_content(&self, basename: &str, content: &[u8]) -> io::Result<PathBuf> {
        let path = self.fresh_backing_path(basename);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Copies the file at `source` into a fresh scratch file.
    pub(crate) fn stage_copy(&self, basename: &str, source: &Path) -> io::Result<PathBuf> {
        let path = self.fresh_backing_path(basename);
        std::fs::copy(source, &path)?;
        Ok(path)
    }
}
