//! End-to-end staging: search dirs through install rules,
//! transformations and manifest emission.

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use debpack::{BuildDriver, BuildError, PackagePipeline};
use install::InstallRule;
use manifest::PathType;
use matchers::MatchRule;
use meta::{FileSystemMode, StaticGroup};
use pkgs::{BinaryPackage, ConditionContext, Substitution};
use tempfile::TempDir;
use transform::{SymlinkReplacementRule, TransformationRule};
use vfs::BuildContext;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .try_init()
        .ok();
}

fn write_file(root: &Path, rel: &str, contents: &[u8], mode: u32) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(mode);
    fs::set_permissions(&path, perms).unwrap();
}

/// Unpacked source tree with a populated `debian/tmp`.
fn source_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(
        root,
        "debian/tmp/usr/bin/tool",
        b"#!/usr/bin/env sh\necho hi\n",
        0o644,
    );
    write_file(root, "debian/tmp/usr/lib/pkg/libfoo.so.1.0", b"elf\n", 0o755);
    write_file(root, "debian/tmp/usr/lib/pkg/libfoo.la", b"libtool\n", 0o644);
    write_file(root, "debian/tmp/man/de/man1/tool.de.1", b".TH TOOL 1\n", 0o644);
    write_file(root, "debian/tmp/README.md", b"readme\n", 0o644);
    write_file(root, "debian/tmp/TODO", b"upstream notes\n", 0o644);
    tmp
}

fn foo() -> BinaryPackage {
    BinaryPackage::new("foo", "amd64", true)
}

fn driver_for(tree: &TempDir) -> BuildDriver {
    let substitution = Substitution::new();
    let into: BTreeSet<BinaryPackage> = [foo()].into_iter().collect();
    let mut driver = BuildDriver::new(tree.path(), ConditionContext::new("amd64"))
        .with_default_search_dirs(vec![tree.path().join("debian/tmp")])
        .with_clamp_mtime_to(1_700_000_000);
    let mut pipeline = PackagePipeline::default();
    pipeline.transformations.push(TransformationRule::CreateSymlink {
        link_target: "libfoo.so.1.0".to_owned(),
        link_dest: "usr/lib/pkg/libfoo.so.1".to_owned(),
        replacement_rule: SymlinkReplacementRule::ErrorIfDirectory,
        definition_source: "transformations[0]".to_owned(),
        condition: None,
    });
    pipeline.transformations.push(TransformationRule::Remove {
        match_rules: vec![MatchRule::from_path_or_glob(
            "usr/share/doc/foo/TODO",
            "transformations[1]",
            None,
            &substitution,
        )
        .unwrap()],
        keep_empty_parent_dirs: false,
        definition_source: "transformations[1]".to_owned(),
    });
    pipeline.transformations.push(TransformationRule::CreateDirectories {
        directories: vec!["var/lib/foo".to_owned()],
        owner: None,
        group: Some(StaticGroup::from_name_and_id("adm", 4).unwrap()),
        mode: Some(FileSystemMode::Octal(0o2750)),
        definition_source: "transformations[2]".to_owned(),
        condition: None,
    });
    driver.add_package(foo(), pipeline);
    driver.add_install_rule(
        InstallRule::install_dest(
            &["usr/bin/*"],
            None,
            into.clone(),
            "installations[0]",
            None,
            &substitution,
        )
        .unwrap(),
    );
    driver.add_install_rule(
        InstallRule::install_dest(
            &["usr/lib"],
            None,
            into.clone(),
            "installations[1]",
            None,
            &substitution,
        )
        .unwrap(),
    );
    driver.add_install_rule(
        InstallRule::install_man(
            &["man/de/man1/tool.de.1"],
            into.clone(),
            None,
            None,
            "installations[2]",
            None,
            &substitution,
        )
        .unwrap(),
    );
    driver.add_install_rule(
        InstallRule::install_doc(
            &["README.md", "TODO"],
            None,
            into,
            "installations[3]",
            None,
            &substitution,
        )
        .unwrap(),
    );
    driver
}

#[test]
fn full_build_stages_transforms_and_emits_the_manifest() {
    init_tracing();
    let tree = source_tree();
    let context = BuildContext::new().unwrap();
    let outputs = driver_for(&tree).run(&context).unwrap();
    assert_eq!(outputs.len(), 1);
    let output = &outputs[0];
    assert_eq!(output.package.name(), "foo");

    let fs_root = &output.fs_root;
    let lookup = |path: &str| fs_root.lookup(fs_root.root(), path).unwrap().unwrap();

    // Normalization: direct children of usr/bin are executables, shared
    // objects are not.
    let tool = lookup("usr/bin/tool");
    assert_eq!(fs_root.mode(tool), 0o755);
    let so = lookup("usr/lib/pkg/libfoo.so.1.0");
    assert_eq!(fs_root.mode(so), 0o644);

    // The libtool archive never made it into the package.
    assert!(fs_root.lookup(fs_root.root(), "usr/lib/pkg/libfoo.la").unwrap().is_none());

    // The transformation added the version symlink.
    let link = lookup("usr/lib/pkg/libfoo.so.1");
    assert!(fs_root.is_symlink(link));

    // Man page: section from the basename, language from the path.
    assert!(fs_root.is_file(lookup("usr/share/man/de/man1/tool.1")));
    assert!(fs_root.is_file(lookup("usr/share/doc/foo/README.md")));

    // The remove transformation stripped the upstream TODO again.
    assert!(fs_root
        .lookup(fs_root.root(), "usr/share/doc/foo/TODO")
        .unwrap()
        .is_none());

    // create-directories with mode and group.
    let state_dir = lookup("var/lib/foo");
    assert_eq!(fs_root.mode(state_dir), 0o2750);
    let (_, group) = fs_root.ownership(state_dir);
    assert_eq!((group.name(), group.id()), ("adm", 4));

    // The env shebang was canonicalized in the staged copy.
    let prefix = fs_root.read_backing_prefix(tool, 64).unwrap().unwrap();
    assert!(prefix.starts_with(b"#! /bin/sh\n"), "{prefix:?}");

    let manifest = &output.intermediate_manifest;
    assert_eq!(manifest[0].member_path, "./");
    assert_eq!(manifest.last().unwrap().path_type, PathType::Symlink);
    assert_eq!(manifest.last().unwrap().link_target, "libfoo.so.1.0");
    let tool_member = manifest
        .iter()
        .find(|m| m.member_path == "./usr/bin/tool")
        .unwrap();
    assert_eq!(tool_member.mode, 0o755);
    assert!(tool_member.mtime <= 1_700_000_000.0);
}

#[test]
fn finished_trees_are_frozen() {
    init_tracing();
    let tree = source_tree();
    let context = BuildContext::new().unwrap();
    let mut outputs = driver_for(&tree).run(&context).unwrap();
    let output = outputs.pop().unwrap();
    let mut fs_root = output.fs_root;
    let root = fs_root.root();
    assert!(fs_root.mkdir(root, "late-addition").is_err());
}

#[test]
fn leftover_source_paths_fail_the_build() {
    init_tracing();
    let tree = source_tree();
    write_file(tree.path(), "debian/tmp/forgotten.dat", b"?\n", 0o644);
    let context = BuildContext::new().unwrap();
    let err = driver_for(&tree).run(&context).unwrap_err();
    match err {
        BuildError::UninstalledPaths { paths } => {
            assert_eq!(paths, vec!["./forgotten.dat".to_owned()]);
        }
        other => panic!("expected UninstalledPaths, got {other}"),
    }
}

#[test]
fn a_trailing_discard_star_silences_leftovers() {
    init_tracing();
    let tree = source_tree();
    write_file(tree.path(), "debian/tmp/forgotten.dat", b"?\n", 0o644);
    let context = BuildContext::new().unwrap();
    let mut driver = driver_for(&tree);
    driver.add_install_rule(
        InstallRule::discard_paths(
            &["*"],
            "installations[4]",
            None,
            Vec::new(),
            &Substitution::new(),
        )
        .unwrap(),
    );
    let outputs = driver.run(&context).unwrap();
    let fs_root = &outputs[0].fs_root;
    assert!(fs_root
        .lookup(fs_root.root(), "forgotten.dat")
        .unwrap()
        .is_none());
}
