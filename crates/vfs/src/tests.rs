use std::fs as stdfs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use crate::{BuildContext, Fs, InsertFileOptions, PathKind, VfsError, WalkCursor};

// The context owns the scratch dir backing the staged file; callers
// keep it alive for as long as they read through the tree.
fn sample_tree() -> (Fs, BuildContext) {
    let mut fs = Fs::new();
    let root = fs.root();
    let usr = fs.mkdir(root, "usr").unwrap();
    let bin = fs.mkdir(usr, "bin").unwrap();
    let ctx = BuildContext::new().unwrap();
    fs.add_file_from_bytes(bin, "tool", b"#!/bin/sh\nexit 0\n", &ctx, 0o755)
        .unwrap();
    fs.add_symlink(bin, "tool-compat", "tool").unwrap();
    (fs, ctx)
}

#[test]
fn paths_are_normalized_with_dot_prefix() {
    let (fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    assert_eq!(fs.path(tool), "./usr/bin/tool");
    assert_eq!(fs.path(fs.root()), ".");
    let usr = fs.lookup(fs.root(), "usr").unwrap().unwrap();
    assert_eq!(fs.tar_path(usr), "./usr/");
}

#[test]
fn lookup_handles_absolute_and_relative_forms() {
    let (fs, _ctx) = sample_tree();
    let bin = fs.lookup(fs.root(), "usr/bin").unwrap().unwrap();
    let a = fs.lookup(bin, "/usr/bin/tool").unwrap().unwrap();
    let b = fs.lookup(bin, "tool").unwrap().unwrap();
    let c = fs.lookup(bin, "./tool").unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
    let up = fs.lookup(bin, "../bin/tool").unwrap().unwrap();
    assert_eq!(up, a);
}

#[test]
fn lookup_with_trailing_slash_requires_following_through() {
    let (fs, _ctx) = sample_tree();
    assert!(fs.lookup(fs.root(), "usr/bin/").unwrap().is_some());
    // Final-segment symlinks are returned as-is without a trailing slash.
    let link = fs.lookup(fs.root(), "usr/bin/tool-compat").unwrap().unwrap();
    assert_eq!(fs.kind(link), PathKind::Symlink);
    assert_eq!(fs.readlink(link).unwrap(), "tool");
}

#[test]
fn lookup_escaping_root_is_an_error() {
    let (fs, _ctx) = sample_tree();
    let err = fs.lookup(fs.root(), "../evil").unwrap_err();
    assert!(matches!(err, VfsError::EscapesRoot { .. }));
}

#[test]
fn attempt_lookup_reports_missing_segments() {
    let (fs, _ctx) = sample_tree();
    let (node, missing) = fs.attempt_lookup(fs.root(), "usr/share/doc/pkg").unwrap();
    let usr = fs.lookup(fs.root(), "usr").unwrap().unwrap();
    assert_eq!(node, usr);
    assert_eq!(missing, vec!["share", "doc", "pkg"]);
}

#[test]
fn symlinks_are_traversed_mid_path() {
    let mut fs = Fs::new();
    let root = fs.root();
    let usr = fs.mkdir(root, "usr").unwrap();
    let lib = fs.mkdir(usr, "lib").unwrap();
    fs.mkdir(lib, "pkg").unwrap();
    fs.add_symlink(usr, "lib64", "lib").unwrap();
    let via_link = fs.lookup(root, "usr/lib64/pkg").unwrap().unwrap();
    let direct = fs.lookup(root, "usr/lib/pkg").unwrap().unwrap();
    assert_eq!(via_link, direct);
}

#[test]
fn traversing_the_same_symlink_twice_is_rejected() {
    let mut fs = Fs::new();
    let root = fs.root();
    let a = fs.mkdir(root, "a").unwrap();
    fs.add_symlink(a, "loop", "../a/loop").unwrap();
    let err = fs.lookup(root, "a/loop/x").unwrap_err();
    assert!(matches!(err, VfsError::SymlinkLoop { .. }));
}

#[test]
fn absolute_symlink_targets_resolve_from_root() {
    let mut fs = Fs::new();
    let root = fs.root();
    let etc = fs.mkdir(root, "etc").unwrap();
    let usr = fs.mkdir(root, "usr").unwrap();
    let share = fs.mkdir(usr, "share").unwrap();
    fs.mkdir(share, "pkg").unwrap();
    fs.add_symlink(etc, "alias", "/usr/share/pkg").unwrap();
    let via = fs.lookup(root, "etc/alias/").unwrap().unwrap();
    let direct = fs.lookup(root, "usr/share/pkg").unwrap().unwrap();
    assert_eq!(via, direct);
}

#[test]
fn minimum_mode_bits_are_enforced() {
    let (mut fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    let bin = fs.lookup(fs.root(), "usr/bin").unwrap().unwrap();
    assert!(matches!(
        fs.set_mode(tool, 0o200),
        Err(VfsError::MinimumMode { minimum: 0o400, .. })
    ));
    assert!(matches!(
        fs.set_mode(bin, 0o400),
        Err(VfsError::MinimumMode { minimum: 0o500, .. })
    ));
    fs.set_mode(tool, 0o444).unwrap();
    assert_eq!(fs.mode(tool), 0o444);
}

#[test]
fn symlink_modes_are_fixed() {
    let (mut fs, _ctx) = sample_tree();
    let link = fs.lookup(fs.root(), "usr/bin/tool-compat").unwrap().unwrap();
    assert_eq!(fs.mode(link), 0o777);
    assert!(matches!(
        fs.set_mode(link, 0o644),
        Err(VfsError::SymlinkMode { .. })
    ));
}

#[test]
fn mkdir_refuses_to_replace() {
    let (mut fs, _ctx) = sample_tree();
    let usr = fs.lookup(fs.root(), "usr").unwrap().unwrap();
    assert!(matches!(
        fs.mkdir(usr, "bin"),
        Err(VfsError::AlreadyExists { .. })
    ));
}

#[test]
fn mkdirs_creates_missing_and_rejects_conflicts() {
    let (mut fs, _ctx) = sample_tree();
    let doc = fs.mkdirs(fs.root(), "usr/share/doc").unwrap();
    assert_eq!(fs.path(doc), "./usr/share/doc");
    // A second call is a no-op returning the same directory.
    assert_eq!(fs.mkdirs(fs.root(), "usr/share/doc").unwrap(), doc);
    assert!(matches!(
        fs.mkdirs(fs.root(), "usr/bin/tool/sub"),
        Err(VfsError::MkdirsConflict { .. })
    ));
}

#[test]
fn inserting_over_an_existing_name_displaces_it() {
    let (mut fs, _ctx) = sample_tree();
    let ctx = BuildContext::new().unwrap();
    let bin = fs.lookup(fs.root(), "usr/bin").unwrap().unwrap();
    let old = fs.lookup(bin, "tool").unwrap().unwrap();
    let new = fs
        .add_file_from_bytes(bin, "tool", b"replacement", &ctx, 0o644)
        .unwrap();
    assert!(fs.is_detached(old));
    assert!(!fs.is_detached(new));
    assert_eq!(fs.lookup(bin, "tool").unwrap(), Some(new));
}

#[test]
fn unlink_detaches_and_is_idempotent() {
    let (mut fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    fs.unlink(tool, false).unwrap();
    assert!(fs.is_detached(tool));
    assert!(fs.lookup(fs.root(), "usr/bin/tool").unwrap().is_none());
    // Detached paths remember where they were.
    assert_eq!(fs.path(tool), "./usr/bin/tool");
    fs.unlink(tool, false).unwrap();
}

#[test]
fn unlink_refuses_non_empty_directories_without_recursive() {
    let (mut fs, _ctx) = sample_tree();
    let usr = fs.lookup(fs.root(), "usr").unwrap().unwrap();
    assert!(matches!(
        fs.unlink(usr, false),
        Err(VfsError::DirectoryNotEmpty { .. })
    ));
    fs.unlink(usr, true).unwrap();
    assert!(fs.lookup(fs.root(), "usr").unwrap().is_none());
}

#[test]
fn the_root_cannot_be_unlinked() {
    let mut fs = Fs::new();
    let root = fs.root();
    assert!(matches!(fs.unlink(root, true), Err(VfsError::RootUnlink)));
}

#[test]
fn prune_if_empty_dir_walks_up_but_stops_at_root() {
    let mut fs = Fs::new();
    let deep = fs.mkdirs(fs.root(), "a/b/c").unwrap();
    fs.prune_if_empty_dir(deep).unwrap();
    assert!(fs.lookup(fs.root(), "a").unwrap().is_none());
    assert!(!fs.is_detached(fs.root()));
}

#[test]
fn prune_keeps_directories_with_content() {
    let (mut fs, _ctx) = sample_tree();
    let bin = fs.lookup(fs.root(), "usr/bin").unwrap().unwrap();
    fs.prune_if_empty_dir(bin).unwrap();
    assert!(fs.lookup(fs.root(), "usr/bin").unwrap().is_some());
}

#[test]
fn rename_within_directory() {
    let (mut fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    fs.set_name(tool, "tool2").unwrap();
    assert_eq!(fs.path(tool), "./usr/bin/tool2");
    assert!(fs.lookup(fs.root(), "usr/bin/tool").unwrap().is_none());
}

#[test]
fn move_to_a_new_parent_displaces_occupants() {
    let (mut fs, _ctx) = sample_tree();
    let sbin = {
        let usr = fs.lookup(fs.root(), "usr").unwrap().unwrap();
        fs.mkdir(usr, "sbin").unwrap()
    };
    let ctx = BuildContext::new().unwrap();
    let occupant = fs
        .add_file_from_bytes(sbin, "tool", b"old", &ctx, 0o644)
        .unwrap();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    fs.set_parent(tool, sbin).unwrap();
    assert!(fs.is_detached(occupant));
    assert_eq!(fs.path(tool), "./usr/sbin/tool");
}

#[test]
fn frozen_trees_reject_mutation() {
    let (mut fs, _ctx) = sample_tree();
    fs.freeze();
    assert!(!fs.is_read_write());
    let root = fs.root();
    assert!(matches!(
        fs.mkdir(root, "opt"),
        Err(VfsError::ReadOnly { .. })
    ));
    let tool = fs.lookup(root, "usr/bin/tool").unwrap().unwrap();
    assert!(matches!(
        fs.set_mode(tool, 0o644),
        Err(VfsError::ReadOnly { .. })
    ));
}

#[test]
fn walk_is_preorder_and_sorted() {
    let (fs, _ctx) = sample_tree();
    let names: Vec<String> = fs.all_paths().iter().map(|&id| fs.path(id)).collect();
    assert_eq!(
        names,
        vec![
            ".",
            "./usr",
            "./usr/bin",
            "./usr/bin/tool",
            "./usr/bin/tool-compat",
        ]
    );
}

#[test]
fn walk_skips_entries_detached_mid_traversal() {
    let (mut fs, _ctx) = sample_tree();
    let mut cursor = WalkCursor::new(fs.root());
    let mut seen = Vec::new();
    while let Some(id) = cursor.next(&fs) {
        if fs.path(id) == "./usr/bin" {
            let link = fs.lookup(id, "tool-compat").unwrap().unwrap();
            fs.unlink(link, false).unwrap();
        }
        seen.push(fs.path(id));
    }
    assert!(!seen.contains(&"./usr/bin/tool-compat".to_owned()));
    assert!(seen.contains(&"./usr/bin/tool".to_owned()));
}

#[test]
fn backing_prefix_reads_staged_content() {
    let (fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    let prefix = fs.read_backing_prefix(tool, 9).unwrap().unwrap();
    assert_eq!(prefix, b"#!/bin/sh");
}

#[test]
fn replace_fs_path_content_stages_a_copy_for_shared_files() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("orig");
    stdfs::write(&source, b"original").unwrap();

    let mut fs = Fs::new();
    let root = fs.root();
    let ctx = BuildContext::new().unwrap();
    let file = fs
        .insert_file_from_backing_path(root, "orig", &source, InsertFileOptions::default())
        .unwrap();
    assert!(!fs.may_steal_backing(file));

    fs.replace_fs_path_content(file, &ctx, false, |path| {
        let mut f = stdfs::OpenOptions::new().append(true).open(path)?;
        f.write_all(b" mutated")
    })
    .unwrap();

    // The original source file is untouched; the node now points at a
    // private staged copy.
    assert_eq!(stdfs::read(&source).unwrap(), b"original");
    assert!(fs.may_steal_backing(file));
    let staged = fs.backing_path(file).unwrap();
    assert_eq!(stdfs::read(staged).unwrap(), b"original mutated");
}

#[test]
fn replace_fs_path_content_restores_the_recorded_mode() {
    let mut fs = Fs::new();
    let root = fs.root();
    let ctx = BuildContext::new().unwrap();
    let file = fs
        .add_file_from_bytes(root, "script", b"#!/bin/sh\n", &ctx, 0o755)
        .unwrap();
    fs.replace_fs_path_content(file, &ctx, false, |path| {
        stdfs::set_permissions(path, stdfs::Permissions::from_mode(0o600))?;
        stdfs::write(path, b"#! /bin/sh\n")
    })
    .unwrap();
    assert_eq!(fs.mode(file), 0o755);
    let on_disk = stdfs::metadata(fs.backing_path(file).unwrap()).unwrap();
    assert_eq!(on_disk.permissions().mode() & 0o7777, 0o755);
}

#[test]
fn replace_fs_path_content_detects_type_changes() {
    let mut fs = Fs::new();
    let root = fs.root();
    let ctx = BuildContext::new().unwrap();
    let file = fs
        .add_file_from_bytes(root, "victim", b"data", &ctx, 0o644)
        .unwrap();
    let err = fs
        .replace_fs_path_content(file, &ctx, false, |path| {
            stdfs::remove_file(path)?;
            stdfs::create_dir(path)
        })
        .unwrap_err();
    assert!(matches!(err, VfsError::TamperedBackingFile { .. }));
}

#[test]
fn mtime_is_lazily_read_and_overridable() {
    let mut fs = Fs::new();
    let root = fs.root();
    let ctx = BuildContext::new().unwrap();
    let file = fs
        .add_file_from_bytes(root, "stamp", b"x", &ctx, 0o644)
        .unwrap();
    assert!(fs.mtime(file).unwrap() > 0.0);
    fs.set_mtime(file, 42.0).unwrap();
    assert!((fs.mtime(file).unwrap() - 42.0).abs() < f64::EPSILON);
    // Purely virtual directories have no mtime source.
    let dir = fs.mkdir(root, "d").unwrap();
    assert!(matches!(
        fs.mtime(dir),
        Err(VfsError::NoBackingPath { .. })
    ));
}

#[test]
fn from_fs_directory_mirrors_disk() {
    let tmp = tempfile::tempdir().unwrap();
    stdfs::create_dir_all(tmp.path().join("usr/bin")).unwrap();
    stdfs::write(tmp.path().join("usr/bin/run"), b"#!/bin/sh\n").unwrap();
    stdfs::set_permissions(
        tmp.path().join("usr/bin/run"),
        stdfs::Permissions::from_mode(0o750),
    )
    .unwrap();
    std::os::unix::fs::symlink("run", tmp.path().join("usr/bin/run2")).unwrap();

    let fs = Fs::from_fs_directory(tmp.path()).unwrap();
    let run = fs.lookup(fs.root(), "usr/bin/run").unwrap().unwrap();
    assert_eq!(fs.mode(run), 0o750);
    assert!(!fs.may_steal_backing(run));
    let run2 = fs.lookup(fs.root(), "usr/bin/run2").unwrap().unwrap();
    assert_eq!(fs.readlink(run2).unwrap(), "run");
}

#[test]
fn metadata_is_scoped_per_plugin_and_type() {
    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    let (mut fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    fs.set_path_metadata(tool, Marker(7)).unwrap();
    assert_eq!(fs.path_metadata::<Marker>(tool), Some(&Marker(7)));
    assert_eq!(fs.path_metadata::<String>(tool), None);

    fs.with_plugin_context("other-plugin", |fs| {
        assert_eq!(fs.path_metadata::<Marker>(tool), None);
        assert_eq!(
            fs.path_metadata_owned_by::<Marker>(tool, "debpack"),
            Some(&Marker(7))
        );
        fs.set_path_metadata(tool, Marker(9)).unwrap();
    });
    // Back in the default context the original value is untouched.
    assert_eq!(fs.path_metadata::<Marker>(tool), Some(&Marker(7)));
}

#[test]
fn chown_validates_through_static_entities() {
    let (mut fs, _ctx) = sample_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    let owner = meta::StaticOwner::from_name_and_id("daemon", 1).unwrap();
    let group = meta::StaticGroup::from_name_and_id("adm", 4).unwrap();
    fs.chown(tool, Some(&owner), Some(&group)).unwrap();
    let (o, g) = fs.ownership(tool);
    assert_eq!(o.name(), "daemon");
    assert_eq!(g.id(), 4);
}
