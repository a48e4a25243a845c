use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use filetime::FileTime;

use crate::context::BuildContext;
use crate::error::VfsError;
use crate::metadata::MetadataTable;

/// Integer handle for a node in a [`Fs`] arena.
///
/// Handles are only meaningful for the tree that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) const ROOT: Self = Self(0);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of filesystem entry a node represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

#[derive(Debug)]
enum NodeData {
    Directory { children: BTreeMap<String, NodeId> },
    File,
    Symlink { target: String },
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    data: NodeData,
    mode: u32,
    mtime: Option<f64>,
    owner: meta::OwnershipDefinition,
    group: meta::OwnershipDefinition,
    /// Backing path on the real filesystem, when the entry mirrors one.
    fs_path: Option<PathBuf>,
    /// Whether the backing file is private to this build and may be
    /// mutated in place or stolen during archiving.
    replaceable_inline: bool,
    last_known_path: Option<String>,
    metadata: MetadataTable,
}

/// Options for [`Fs::insert_file_from_backing_path`].
#[derive(Clone, Copy, Debug)]
pub struct InsertFileOptions {
    /// Resolve `source` through symlinks before validating it.
    pub follow_symlinks: bool,
    /// Take the node's mode from the backing file instead of [`Self::mode`].
    pub use_fs_path_mode: bool,
    /// Explicit mode when `use_fs_path_mode` is false.
    pub mode: u32,
    /// Whether the backing file may be destructively consumed at archive
    /// time (only valid for files staged exclusively for this build).
    pub may_steal: bool,
}

impl Default for InsertFileOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            use_fs_path_mode: false,
            mode: 0o644,
            may_steal: false,
        }
    }
}

const DIR_MIN_MODE: u32 = 0o500;
const FILE_MIN_MODE: u32 = 0o400;
const SYMLINK_MODE: u32 = 0o777;

/// An arena-backed virtual filesystem tree.
///
/// All node operations go through the tree and take [`NodeId`] handles;
/// see the crate-level docs for the ownership model.
#[derive(Debug)]
pub struct Fs {
    nodes: Vec<Node>,
    read_write: bool,
    current_plugin: String,
}

impl Default for Fs {
    fn default() -> Self {
        Self::new()
    }
}

impl Fs {
    /// Creates an empty read-write tree containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let root = Node {
            name: ".".to_owned(),
            parent: None,
            data: NodeData::Directory {
                children: BTreeMap::new(),
            },
            mode: 0o755,
            mtime: None,
            owner: meta::OwnershipDefinition::root(),
            group: meta::OwnershipDefinition::root(),
            fs_path: None,
            replaceable_inline: false,
            last_known_path: None,
            metadata: MetadataTable::default(),
        };
        Self {
            nodes: vec![root],
            read_write: true,
            current_plugin: "debpack".to_owned(),
        }
    }

    /// Returns the root directory handle.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        self.nodes.push(node);
        id
    }

    /// Whether the tree still accepts mutations.
    #[must_use]
    pub const fn is_read_write(&self) -> bool {
        self.read_write
    }

    /// Permanently marks the tree read-only.
    ///
    /// Called once, right before the tree is flattened into the
    /// intermediate manifest. There is no way to thaw a frozen tree.
    pub fn freeze(&mut self) {
        self.read_write = false;
    }

    fn rw_check(&self, id: NodeId) -> Result<(), VfsError> {
        if self.read_write {
            return Ok(());
        }
        Err(VfsError::ReadOnly {
            path: self.path(id),
        })
    }

    /// Returns the plugin name used for metadata ownership.
    #[must_use]
    pub fn current_plugin(&self) -> &str {
        &self.current_plugin
    }

    /// Runs `f` with the metadata plugin context switched to `plugin`.
    pub fn with_plugin_context<R>(&mut self, plugin: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.current_plugin, plugin.to_owned());
        let result = f(self);
        self.current_plugin = previous;
        result
    }

    // ------------------------------------------------------------------
    // Basic node accessors
    // ------------------------------------------------------------------

    /// Returns the basename of `id`.
    #[must_use]
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    /// Returns the kind of `id`.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> PathKind {
        match self.node(id).data {
            NodeData::Directory { .. } => PathKind::Directory,
            NodeData::File => PathKind::File,
            NodeData::Symlink { .. } => PathKind::Symlink,
        }
    }

    /// Whether `id` is a directory.
    #[must_use]
    pub fn is_dir(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Directory { .. })
    }

    /// Whether `id` is a regular file.
    #[must_use]
    pub fn is_file(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::File)
    }

    /// Whether `id` is a symlink.
    #[must_use]
    pub fn is_symlink(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Symlink { .. })
    }

    /// Returns the symlink target of `id` verbatim.
    pub fn readlink(&self, id: NodeId) -> Result<&str, VfsError> {
        match &self.node(id).data {
            NodeData::Symlink { target } => Ok(target),
            _ => Err(VfsError::NotASymlink {
                path: self.path(id),
            }),
        }
    }

    /// Returns the parent directory, or `None` for the root and for
    /// detached nodes.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Whether `id` (or one of its ancestors) has been unlinked.
    #[must_use]
    pub fn is_detached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == NodeId::ROOT {
                return false;
            }
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => return true,
            }
        }
    }

    /// Returns the normalized path of `id` (`.` for the root, `./a/b`
    /// below it). Detached nodes report their last known path.
    #[must_use]
    pub fn path(&self, id: NodeId) -> String {
        if id == NodeId::ROOT {
            return ".".to_owned();
        }
        if self.is_detached(id) {
            let node = self.node(id);
            return node
                .last_known_path
                .clone()
                .unwrap_or_else(|| format!("<detached>/{}", node.name));
        }
        let mut segments = Vec::new();
        let mut current = id;
        while current != NodeId::ROOT {
            let node = self.node(current);
            segments.push(node.name.as_str());
            current = node.parent.expect("attached node has a parent");
        }
        let mut path = String::from(".");
        for segment in segments.iter().rev() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Returns the path as recorded in a tar archive (`./dir/` with a
    /// trailing slash for directories).
    #[must_use]
    pub fn tar_path(&self, id: NodeId) -> String {
        let mut path = self.path(id);
        if self.is_dir(id) {
            path.push('/');
        }
        path
    }

    /// Returns the ids of the children of `id` in basename order.
    ///
    /// Non-directories have no children.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).data {
            NodeData::Directory { children } => children.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the child of `id` named `name`, if any.
    #[must_use]
    pub fn get(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match &self.node(id).data {
            NodeData::Directory { children } => children.get(name).copied(),
            _ => None,
        }
    }

    /// Whether `id` has any children.
    #[must_use]
    pub fn has_children(&self, id: NodeId) -> bool {
        match &self.node(id).data {
            NodeData::Directory { children } => !children.is_empty(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Metadata accessors
    // ------------------------------------------------------------------

    /// Returns the mode bits of `id` (always `0777` for symlinks).
    #[must_use]
    pub fn mode(&self, id: NodeId) -> u32 {
        self.node(id).mode
    }

    /// Sets the mode bits, enforcing the minimum-mode invariant.
    pub fn set_mode(&mut self, id: NodeId, mode: u32) -> Result<(), VfsError> {
        self.rw_check(id)?;
        let minimum = match self.kind(id) {
            PathKind::Directory => DIR_MIN_MODE,
            PathKind::File => FILE_MIN_MODE,
            PathKind::Symlink => {
                return Err(VfsError::SymlinkMode {
                    path: self.path(id),
                });
            }
        };
        if mode & minimum != minimum {
            return Err(VfsError::MinimumMode {
                path: self.path(id),
                mode,
                minimum,
            });
        }
        self.node_mut(id).mode = mode;
        Ok(())
    }

    /// Returns (owner, group) for `id`.
    #[must_use]
    pub fn ownership(&self, id: NodeId) -> (&meta::OwnershipDefinition, &meta::OwnershipDefinition) {
        let node = self.node(id);
        (&node.owner, &node.group)
    }

    /// Changes owner and/or group; `None` leaves the current value.
    pub fn chown(
        &mut self,
        id: NodeId,
        owner: Option<&meta::StaticOwner>,
        group: Option<&meta::StaticGroup>,
    ) -> Result<(), VfsError> {
        self.rw_check(id)?;
        let node = self.node_mut(id);
        if let Some(owner) = owner {
            node.owner = owner.ownership_definition().clone();
        }
        if let Some(group) = group {
            node.group = group.ownership_definition().clone();
        }
        Ok(())
    }

    /// Returns the mtime in seconds since the epoch, resolving it lazily
    /// from the backing path on first access.
    pub fn mtime(&mut self, id: NodeId) -> Result<f64, VfsError> {
        if let Some(mtime) = self.node(id).mtime {
            return Ok(mtime);
        }
        let fs_path = self.backing_path(id).map(Path::to_path_buf);
        let Some(fs_path) = fs_path else {
            return Err(VfsError::NoBackingPath {
                path: self.path(id),
            });
        };
        let st = fs::symlink_metadata(&fs_path)
            .map_err(|e| VfsError::io(fs_path.display().to_string(), e))?;
        let mtime = system_time_to_f64(&st);
        self.node_mut(id).mtime = Some(mtime);
        Ok(mtime)
    }

    /// Overrides the mtime.
    pub fn set_mtime(&mut self, id: NodeId, mtime: f64) -> Result<(), VfsError> {
        self.rw_check(id)?;
        self.node_mut(id).mtime = Some(mtime);
        Ok(())
    }

    /// Whether `id` has a backing path on the real filesystem.
    #[must_use]
    pub fn has_backing_path(&self, id: NodeId) -> bool {
        self.node(id).fs_path.is_some()
    }

    /// Returns the backing path, if any.
    #[must_use]
    pub fn backing_path(&self, id: NodeId) -> Option<&Path> {
        self.node(id).fs_path.as_deref()
    }

    pub(crate) fn set_backing_path(&mut self, id: NodeId, fs_path: PathBuf) {
        self.node_mut(id).fs_path = Some(fs_path);
    }

    /// Whether the backing file is private to this build and may be moved
    /// rather than copied at archive time.
    #[must_use]
    pub fn may_steal_backing(&self, id: NodeId) -> bool {
        self.node(id).replaceable_inline
    }

    /// Reads up to `max` bytes from the start of the backing file.
    ///
    /// Returns `None` for purely virtual files, so content sniffing can
    /// skip them without special-casing tests.
    pub fn read_backing_prefix(
        &self,
        id: NodeId,
        max: usize,
    ) -> Result<Option<Vec<u8>>, VfsError> {
        if !self.is_file(id) {
            return Err(VfsError::NotAFile {
                path: self.path(id),
            });
        }
        let Some(fs_path) = self.backing_path(id) else {
            return Ok(None);
        };
        let mut file =
            fs::File::open(fs_path).map_err(|e| VfsError::io(fs_path.display().to_string(), e))?;
        let mut buf = vec![0_u8; max];
        let mut filled = 0;
        while filled < max {
            let n = file
                .read(&mut buf[filled..])
                .map_err(|e| VfsError::io(self.path(id), e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Resolves `path` relative to `from`, following symlinks in all but
    /// the final segment.
    ///
    /// Returns `None` when a segment does not exist. Fails with
    /// [`VfsError::SymlinkLoop`] when the same symlink is traversed twice
    /// during this one resolution (see the crate docs for why partial
    /// aliasing is also rejected) and [`VfsError::EscapesRoot`] when `..`
    /// walks above the root.
    pub fn lookup(&self, from: NodeId, path: &str) -> Result<Option<NodeId>, VfsError> {
        let (node, missing) = self.attempt_lookup(from, path)?;
        if missing.is_empty() {
            Ok(Some(node))
        } else {
            Ok(None)
        }
    }

    /// Resolves as much of `path` as exists, returning the deepest node
    /// reached and the segments still missing below it.
    pub fn attempt_lookup(
        &self,
        from: NodeId,
        path: &str,
    ) -> Result<(NodeId, Vec<String>), VfsError> {
        if self.is_detached(from) {
            return Err(VfsError::Detached {
                path: self.path(from),
            });
        }
        let (absolute, must_be_dir, segments) = split_path(path);
        let mut current = if absolute { NodeId::ROOT } else { from };
        let mut remaining: Vec<String> = segments.iter().map(|s| (*s).to_owned()).collect();
        remaining.reverse();
        let mut traversed_links: Vec<String> = Vec::new();

        while let Some(segment) = remaining.pop() {
            let segment = segment.as_str();
            if segment == "." {
                continue;
            }
            if segment == ".." {
                match self.node(current).parent {
                    Some(parent) => current = parent,
                    None => {
                        return Err(VfsError::EscapesRoot {
                            path: path.to_owned(),
                        });
                    }
                }
                continue;
            }
            match self.get(current, segment) {
                Some(child) => {
                    current = child;
                }
                None => {
                    let mut missing: Vec<String> = Vec::with_capacity(remaining.len() + 1);
                    missing.push(segment.to_owned());
                    missing.extend(remaining.iter().rev().cloned());
                    if must_be_dir {
                        missing.pop();
                    }
                    return Ok((current, missing));
                }
            }
            if self.is_symlink(current) && !remaining.is_empty() {
                let link_path = self.path(current);
                if traversed_links.contains(&link_path) {
                    return Err(VfsError::SymlinkLoop {
                        path: path.to_owned(),
                        symlink: link_path,
                    });
                }
                let target = match &self.node(current).data {
                    NodeData::Symlink { target } => target.clone(),
                    _ => unreachable!("checked is_symlink above"),
                };
                traversed_links.push(link_path);
                let (link_absolute, _, link_segments) = split_path(&target);
                current = if link_absolute {
                    NodeId::ROOT
                } else {
                    match self.node(current).parent {
                        Some(parent) => parent,
                        None => {
                            return Err(VfsError::EscapesRoot {
                                path: path.to_owned(),
                            });
                        }
                    }
                };
                // The link target's own segments resolve before the rest of
                // the original path.
                for segment in link_segments.iter().rev() {
                    remaining.push((*segment).to_owned());
                }
            }
        }
        Ok((current, Vec::new()))
    }

    // ------------------------------------------------------------------
    // Tree construction
    // ------------------------------------------------------------------

    fn check_basename(name: &str) -> Result<(), VfsError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(VfsError::InvalidBasename {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn check_is_dir(&self, id: NodeId) -> Result<(), VfsError> {
        if self.is_dir(id) {
            return Ok(());
        }
        Err(VfsError::NotADirectory {
            path: self.path(id),
        })
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        let name = self.node(child).name.clone();
        match &mut self.node_mut(parent).data {
            NodeData::Directory { children } => {
                children.insert(name, child);
            }
            _ => unreachable!("attach callers validate the parent is a directory"),
        }
        self.node_mut(child).parent = Some(parent);
    }

    /// Creates a subdirectory of `parent`.
    ///
    /// Unlike the file insertion operations this refuses to replace an
    /// existing occupant.
    pub fn mkdir(&mut self, parent: NodeId, name: &str) -> Result<NodeId, VfsError> {
        Self::check_basename(name)?;
        self.check_is_dir(parent)?;
        self.rw_check(parent)?;
        if let Some(existing) = self.get(parent, name) {
            return Err(VfsError::AlreadyExists {
                path: self.path(existing),
            });
        }
        let node = Node {
            name: name.to_owned(),
            parent: None,
            data: NodeData::Directory {
                children: BTreeMap::new(),
            },
            mode: 0o755,
            mtime: None,
            owner: meta::OwnershipDefinition::root(),
            group: meta::OwnershipDefinition::root(),
            fs_path: None,
            replaceable_inline: false,
            last_known_path: None,
            metadata: MetadataTable::default(),
        };
        let id = self.alloc(node);
        self.attach(parent, id);
        Ok(id)
    }

    /// Ensures every directory segment of `path` (relative to `from`)
    /// exists, creating missing ones, and returns the final directory.
    pub fn mkdirs(&mut self, from: NodeId, path: &str) -> Result<NodeId, VfsError> {
        let dir_path = if path.ends_with('/') {
            path.to_owned()
        } else {
            format!("{path}/")
        };
        let (mut current, missing) = self.attempt_lookup(from, &dir_path)?;
        if !self.is_dir(current) {
            return Err(VfsError::MkdirsConflict {
                path: path.to_owned(),
                conflict: self.path(current),
            });
        }
        for segment in missing {
            current = self.mkdir(current, &segment)?;
        }
        Ok(current)
    }

    /// Replaces any existing occupant of `name` via a non-recursive
    /// unlink. Non-empty directory occupants must be removed by the
    /// caller first.
    fn displace_existing(&mut self, parent: NodeId, name: &str) -> Result<(), VfsError> {
        if let Some(existing) = self.get(parent, name) {
            self.unlink(existing, false)?;
        }
        Ok(())
    }

    /// Adds a symlink to `target` under `parent`.
    pub fn add_symlink(
        &mut self,
        parent: NodeId,
        name: &str,
        target: &str,
    ) -> Result<NodeId, VfsError> {
        Self::check_basename(name)?;
        self.check_is_dir(parent)?;
        self.rw_check(parent)?;
        self.displace_existing(parent, name)?;
        let node = Node {
            name: name.to_owned(),
            parent: None,
            data: NodeData::Symlink {
                target: target.to_owned(),
            },
            mode: SYMLINK_MODE,
            mtime: None,
            owner: meta::OwnershipDefinition::root(),
            group: meta::OwnershipDefinition::root(),
            fs_path: None,
            replaceable_inline: false,
            last_known_path: None,
            metadata: MetadataTable::default(),
        };
        let id = self.alloc(node);
        self.attach(parent, id);
        Ok(id)
    }

    /// Inserts a file node backed by `source` on the real filesystem.
    ///
    /// The source must be (or resolve to) a regular file; directories are
    /// cloned through [`Fs::mkdir`] by the install engine instead.
    pub fn insert_file_from_backing_path(
        &mut self,
        parent: NodeId,
        name: &str,
        source: &Path,
        options: InsertFileOptions,
    ) -> Result<NodeId, VfsError> {
        Self::check_basename(name)?;
        self.check_is_dir(parent)?;
        self.rw_check(parent)?;

        let source_display = source.display().to_string();
        let resolved: PathBuf = if options.follow_symlinks {
            source
                .canonicalize()
                .map_err(|e| VfsError::io(source_display.clone(), e))?
        } else {
            source.to_path_buf()
        };
        let st = fs::symlink_metadata(&resolved)
            .map_err(|e| VfsError::io(source_display.clone(), e))?;
        if st.is_dir() {
            return Err(VfsError::NotAFile {
                path: source_display,
            });
        }
        if !st.is_file() {
            return Err(VfsError::NotAFile {
                path: source_display,
            });
        }

        self.displace_existing(parent, name)?;
        let mode = if options.use_fs_path_mode {
            st.permissions().mode() & 0o7777
        } else {
            options.mode
        };
        let node = Node {
            name: name.to_owned(),
            parent: None,
            data: NodeData::File,
            mode,
            mtime: Some(system_time_to_f64(&st)),
            owner: meta::OwnershipDefinition::root(),
            group: meta::OwnershipDefinition::root(),
            fs_path: Some(resolved),
            replaceable_inline: options.may_steal,
            last_known_path: None,
            metadata: MetadataTable::default(),
        };
        let id = self.alloc(node);
        self.attach(parent, id);
        Ok(id)
    }

    /// Creates a file with `content` staged in the scratch directory.
    ///
    /// The staged copy is private to this build, so the node is marked
    /// stealable for archiving.
    pub fn add_file_from_bytes(
        &mut self,
        parent: NodeId,
        name: &str,
        content: &[u8],
        context: &BuildContext,
        mode: u32,
    ) -> Result<NodeId, VfsError> {
        Self::check_basename(name)?;
        self.check_is_dir(parent)?;
        self.rw_check(parent)?;
        if mode & FILE_MIN_MODE != FILE_MIN_MODE {
            return Err(VfsError::MinimumMode {
                path: format!("{}/{name}", self.path(parent)),
                mode,
                minimum: FILE_MIN_MODE,
            });
        }
        let staged = context
            .stage_content(name, content)
            .map_err(|e| VfsError::io(name, e))?;
        self.displace_existing(parent, name)?;
        let mtime = fs::symlink_metadata(&staged)
            .map(|st| system_time_to_f64(&st))
            .map_err(|e| VfsError::io(staged.display().to_string(), e))?;
        let node = Node {
            name: name.to_owned(),
            parent: None,
            data: NodeData::File,
            mode,
            mtime: Some(mtime),
            owner: meta::OwnershipDefinition::root(),
            group: meta::OwnershipDefinition::root(),
            fs_path: Some(staged),
            replaceable_inline: true,
            last_known_path: None,
            metadata: MetadataTable::default(),
        };
        let id = self.alloc(node);
        self.attach(parent, id);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Detaches `id` from the tree.
    ///
    /// Detaching an already-detached node is a no-op. Non-empty
    /// directories require `recursive`; the root cannot be unlinked.
    pub fn unlink(&mut self, id: NodeId, recursive: bool) -> Result<(), VfsError> {
        if id == NodeId::ROOT {
            return Err(VfsError::RootUnlink);
        }
        if self.is_detached(id) {
            return Ok(());
        }
        self.rw_check(id)?;
        if !recursive && self.has_children(id) {
            return Err(VfsError::DirectoryNotEmpty {
                path: self.path(id),
            });
        }
        let full_path = self.path(id);
        let parent = self.node(id).parent.expect("attached node has a parent");
        let name = self.node(id).name.clone();
        if let NodeData::Directory { children } = &mut self.node_mut(parent).data {
            children.remove(&name);
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.last_known_path = Some(full_path);
        Ok(())
    }

    /// Removes `id` if it is an empty directory, then walks up removing
    /// now-empty ancestors. Stops at (and never removes) the root.
    ///
    /// Equivalent to `rmdir --ignore-fail-on-non-empty --parents`.
    pub fn prune_if_empty_dir(&mut self, id: NodeId) -> Result<(), VfsError> {
        self.rw_check(id)?;
        let mut current = id;
        loop {
            if current == NodeId::ROOT {
                return Ok(());
            }
            self.check_is_dir(current)?;
            if self.has_children(current) {
                return Ok(());
            }
            let parent = match self.node(current).parent {
                Some(parent) => parent,
                None => return Ok(()),
            };
            self.unlink(current, false)?;
            current = parent;
        }
    }

    /// Renames `id` within its current directory.
    ///
    /// An existing occupant of the new name is recursively unlinked, as
    /// with `mv -T`; transformation rules check for collisions they want
    /// to reject before calling this.
    pub fn set_name(&mut self, id: NodeId, new_name: &str) -> Result<(), VfsError> {
        Self::check_basename(new_name)?;
        self.rw_check(id)?;
        if self.node(id).name == new_name {
            return Ok(());
        }
        if self.is_detached(id) {
            self.node_mut(id).name = new_name.to_owned();
            return Ok(());
        }
        let parent = self.node(id).parent.expect("attached node has a parent");
        let old_name = self.node(id).name.clone();
        if let Some(existing) = self.get(parent, new_name) {
            self.unlink(existing, true)?;
        }
        if let NodeData::Directory { children } = &mut self.node_mut(parent).data {
            children.remove(&old_name);
        }
        self.node_mut(id).name = new_name.to_owned();
        self.attach(parent, id);
        Ok(())
    }

    /// Moves `id` under `new_parent`, keeping its basename.
    ///
    /// An existing occupant of the same name is recursively unlinked.
    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), VfsError> {
        if id == NodeId::ROOT {
            return Err(VfsError::RootUnlink);
        }
        self.check_is_dir(new_parent)?;
        self.rw_check(id)?;
        if let Some(old_parent) = self.node(id).parent {
            let name = self.node(id).name.clone();
            if let NodeData::Directory { children } = &mut self.node_mut(old_parent).data {
                children.remove(&name);
            }
            self.node_mut(id).parent = None;
        }
        let name = self.node(id).name.clone();
        if let Some(existing) = self.get(new_parent, &name) {
            self.unlink(existing, true)?;
        }
        self.attach(new_parent, id);
        self.node_mut(id).last_known_path = None;
        Ok(())
    }

    /// Grants scoped mutable access to the backing file of `id`.
    ///
    /// When the backing file is shared (an original source file), it is
    /// first copy-staged into the scratch directory so the original is
    /// never touched. After `mutate` returns, the backing path is
    /// re-validated to still be a single-link regular file (detecting
    /// external tampering) and the recorded mode is restored on disk
    /// unless `trust_mutated_mode` is set. The cached mtime is invalidated.
    pub fn replace_fs_path_content(
        &mut self,
        id: NodeId,
        context: &BuildContext,
        trust_mutated_mode: bool,
        mutate: impl FnOnce(&Path) -> io::Result<()>,
    ) -> Result<(), VfsError> {
        if !self.is_file(id) {
            return Err(VfsError::NotAFile {
                path: self.path(id),
            });
        }
        self.rw_check(id)?;
        let current = self
            .backing_path(id)
            .map(Path::to_path_buf)
            .ok_or_else(|| VfsError::NoBackingPath {
                path: self.path(id),
            })?;
        let fs_path = if self.node(id).replaceable_inline {
            current
        } else {
            let name = self.node(id).name.clone();
            let staged = context
                .stage_copy(&name, &current)
                .map_err(|e| VfsError::io(current.display().to_string(), e))?;
            let node = self.node_mut(id);
            node.fs_path = Some(staged.clone());
            node.replaceable_inline = true;
            staged
        };

        // Keep the on-disk mtime in sync with the cached one, so tools
        // inspecting the staged file during mutation see the same stamp.
        if let Some(mtime) = self.node(id).mtime {
            let ft = FileTime::from_unix_time(mtime as i64, 0);
            filetime::set_file_mtime(&fs_path, ft)
                .map_err(|e| VfsError::io(fs_path.display().to_string(), e))?;
        }
        let mode_before = self.mode(id);

        mutate(&fs_path).map_err(|e| VfsError::io(fs_path.display().to_string(), e))?;

        let st = fs::symlink_metadata(&fs_path).map_err(|e| {
            VfsError::io(fs_path.display().to_string(), e)
        })?;
        if !st.is_file() || st.nlink() > 1 {
            let _ = fs::remove_file(&fs_path);
            return Err(VfsError::TamperedBackingFile {
                path: self.path(id),
                fs_path: fs_path.display().to_string(),
            });
        }
        if trust_mutated_mode {
            let mode = st.permissions().mode() & 0o7777;
            self.set_mode(id, mode)?;
        } else {
            fs::set_permissions(&fs_path, fs::Permissions::from_mode(mode_before))
                .map_err(|e| VfsError::io(fs_path.display().to_string(), e))?;
        }
        self.node_mut(id).mtime = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Path metadata
    // ------------------------------------------------------------------

    /// Attaches metadata of type `T` owned by the current plugin.
    ///
    /// Read-only trees reject writes; a frozen path's metadata is an
    /// always-empty view.
    pub fn set_path_metadata<T: std::any::Any + Send>(
        &mut self,
        id: NodeId,
        value: T,
    ) -> Result<(), VfsError> {
        self.rw_check(id)?;
        if self.is_detached(id) {
            return Err(VfsError::Detached {
                path: self.path(id),
            });
        }
        let plugin = self.current_plugin.clone();
        self.node_mut(id).metadata.insert(&plugin, value);
        Ok(())
    }

    /// Reads metadata of type `T` owned by the current plugin.
    #[must_use]
    pub fn path_metadata<T: std::any::Any + Send>(&self, id: NodeId) -> Option<&T> {
        self.node(id).metadata.get(&self.current_plugin)
    }

    /// Reads metadata owned by another plugin (explicit read delegation).
    #[must_use]
    pub fn path_metadata_owned_by<T: std::any::Any + Send>(
        &self,
        id: NodeId,
        owning_plugin: &str,
    ) -> Option<&T> {
        self.node(id).metadata.get(owning_plugin)
    }
}

fn split_path(path: &str) -> (bool, bool, Vec<&str>) {
    let must_be_dir = path.ends_with('/');
    let (absolute, trimmed) = if let Some(rest) = path.strip_prefix('/') {
        (true, rest)
    } else {
        (false, path)
    };
    let trimmed = trimmed.trim_end_matches('/');
    let mut segments: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    };
    if must_be_dir {
        segments.push(".");
    }
    (absolute, must_be_dir, segments)
}

fn system_time_to_f64(st: &fs::Metadata) -> f64 {
    st.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64())
}
