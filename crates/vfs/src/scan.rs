use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::VfsError;
use crate::fs::{Fs, InsertFileOptions, NodeId};

impl Fs {
    /// Builds a tree mirroring the on-disk directory at `root`.
    ///
    /// Files keep their on-disk modes and are backed by their real paths
    /// (never stealable); symlink targets are carried over verbatim.
    /// Entries are visited in byte order for reproducible node ids.
    pub fn from_fs_directory(root: &Path) -> Result<Self, VfsError> {
        let mut fs_tree = Self::new();
        let root_id = fs_tree.root();
        fs_tree.set_backing_path(root_id, root.to_path_buf());
        fs_tree.scan_into(root_id, root)?;
        Ok(fs_tree)
    }

    fn scan_into(&mut self, parent: NodeId, dir: &Path) -> Result<(), VfsError> {
        let display = dir.display().to_string();
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|e| VfsError::io(display.clone(), e))?
            .collect::<Result<_, _>>()
            .map_err(|e| VfsError::io(display, e))?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return Err(VfsError::InvalidBasename {
                    name: name.to_string_lossy().into_owned(),
                });
            };
            let path = entry.path();
            let st = fs::symlink_metadata(&path)
                .map_err(|e| VfsError::io(path.display().to_string(), e))?;
            let file_type = st.file_type();
            if file_type.is_symlink() {
                let target = fs::read_link(&path)
                    .map_err(|e| VfsError::io(path.display().to_string(), e))?;
                let Some(target) = target.to_str() else {
                    return Err(VfsError::InvalidBasename {
                        name: target.to_string_lossy().into_owned(),
                    });
                };
                let link = self.add_symlink(parent, name, target)?;
                self.set_backing_path(link, path);
            } else if file_type.is_dir() {
                let child = self.mkdir(parent, name)?;
                self.set_mode(child, st.permissions().mode() & 0o7777)?;
                self.set_backing_path(child, path.clone());
                self.scan_into(child, &path)?;
            } else {
                self.insert_file_from_backing_path(
                    parent,
                    name,
                    &path,
                    InsertFileOptions {
                        follow_symlinks: false,
                        use_fs_path_mode: true,
                        ..InsertFileOptions::default()
                    },
                )?;
            }
        }
        Ok(())
    }
}
