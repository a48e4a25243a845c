use matchers::MatchRule;
use meta::{FileSystemMode, StaticGroup, StaticOwner};
use pkgs::{ConditionContext, Substitution};
use vfs::{BuildContext, Fs};

use crate::{
    extract_shebang_interpreter, normalize_shebang_lines, Capability, ModeNormalizationTable,
    SymlinkReplacementRule, TransformError, TransformationRule,
};

fn parse(pattern: &str) -> MatchRule {
    MatchRule::from_path_or_glob(pattern, "test", None, &Substitution::new()).unwrap()
}

fn condition_context() -> ConditionContext {
    ConditionContext::new("amd64")
}

fn staged_tree() -> (Fs, BuildContext) {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let bin = fs.mkdirs(fs.root(), "usr/bin").unwrap();
    fs.add_file_from_bytes(bin, "tool", b"#!/usr/bin/env sh\necho hi\n", &ctx, 0o755)
        .unwrap();
    let lib = fs.mkdirs(fs.root(), "usr/lib/pkg").unwrap();
    fs.add_file_from_bytes(lib, "libfoo.so.1", b"elf\n", &ctx, 0o644)
        .unwrap();
    fs.add_file_from_bytes(lib, "helper.la", b"libtool\n", &ctx, 0o644)
        .unwrap();
    (fs, ctx)
}

fn all_paths(fs: &Fs) -> Vec<String> {
    fs.all_paths().into_iter().map(|id| fs.path(id)).collect()
}

fn remove_rule(patterns: &[&str], keep_empty_parent_dirs: bool) -> TransformationRule {
    TransformationRule::Remove {
        match_rules: patterns.iter().map(|p| parse(p)).collect(),
        keep_empty_parent_dirs,
        definition_source: "remove (test)".to_owned(),
    }
}

fn move_rule(pattern: &str, dest_path: &str, dest_is_dir: bool) -> TransformationRule {
    TransformationRule::Move {
        match_rule: parse(pattern),
        dest_path: dest_path.to_owned(),
        dest_is_dir,
        definition_source: "move (test)".to_owned(),
        condition: None,
    }
}

fn symlink_rule(
    link_target: &str,
    link_dest: &str,
    replacement_rule: SymlinkReplacementRule,
) -> TransformationRule {
    TransformationRule::CreateSymlink {
        link_target: link_target.to_owned(),
        link_dest: link_dest.to_owned(),
        replacement_rule,
        definition_source: "create-symlink (test)".to_owned(),
        condition: None,
    }
}

#[test]
fn remove_deletes_matches_and_prunes_emptied_parents() {
    let (mut fs, _ctx) = staged_tree();
    remove_rule(&["usr/lib/pkg/*"], false)
        .apply(&mut fs, &condition_context())
        .unwrap();
    assert_eq!(all_paths(&fs), vec![".", "./usr", "./usr/bin", "./usr/bin/tool"]);
}

#[test]
fn remove_can_keep_emptied_parent_dirs() {
    let (mut fs, _ctx) = staged_tree();
    remove_rule(&["usr/lib/pkg/*"], true)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let paths = all_paths(&fs);
    assert!(paths.contains(&"./usr/lib/pkg".to_owned()));
    assert!(!paths.iter().any(|p| p.starts_with("./usr/lib/pkg/")));
}

#[test]
fn unmatched_remove_is_an_error() {
    let (mut fs, _ctx) = staged_tree();
    let err = remove_rule(&["var/log/*"], false)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::NoMatch { .. }));
}

#[test]
fn move_renames_a_single_file() {
    let (mut fs, _ctx) = staged_tree();
    move_rule("usr/bin/tool", "usr/bin/mytool", false)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let paths = all_paths(&fs);
    assert!(paths.contains(&"./usr/bin/mytool".to_owned()));
    assert!(!paths.contains(&"./usr/bin/tool".to_owned()));
}

#[test]
fn move_into_directory_collects_all_matches() {
    let (mut fs, _ctx) = staged_tree();
    move_rule("usr/lib/pkg/*", "usr/lib/other", true)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let paths = all_paths(&fs);
    assert!(paths.contains(&"./usr/lib/other/libfoo.so.1".to_owned()));
    assert!(paths.contains(&"./usr/lib/other/helper.la".to_owned()));
}

#[test]
fn rename_with_multiple_matches_is_rejected() {
    let (mut fs, _ctx) = staged_tree();
    let err = move_rule("usr/lib/pkg/*", "usr/lib/single-slot", false)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::RenameMatchedMultiple { .. }));
}

#[test]
fn move_refuses_to_replace_a_directory() {
    let (mut fs, ctx) = staged_tree();
    fs.mkdirs(fs.root(), "usr/share/doc/pkg").unwrap();
    let stage = fs.mkdirs(fs.root(), "stage").unwrap();
    fs.add_file_from_bytes(stage, "pkg", b"not a dir\n", &ctx, 0o644)
        .unwrap();
    let err = move_rule("stage/pkg", "usr/share/doc", true)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::MoveReplacesDirectory { .. }));
}

#[test]
fn moving_directory_onto_a_non_directory_dest_is_an_error() {
    let (mut fs, _ctx) = staged_tree();
    let err = move_rule("usr/lib/pkg", "usr/bin/tool", true)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::NotADirectory { .. }));
}

#[test]
fn symlink_replaces_a_file_under_the_default_policy() {
    let (mut fs, _ctx) = staged_tree();
    symlink_rule("tool", "usr/bin/tool-alias", SymlinkReplacementRule::ErrorIfDirectory)
        .apply(&mut fs, &condition_context())
        .unwrap();
    // Replacing an existing file is fine under error-if-directory.
    symlink_rule("tool", "usr/bin/tool", SymlinkReplacementRule::ErrorIfDirectory)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let link = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    assert!(fs.is_symlink(link));
    assert_eq!(fs.readlink(link).unwrap(), "tool");
}

#[test]
fn symlink_error_if_exists_rejects_any_occupant() {
    let (mut fs, _ctx) = staged_tree();
    let err = symlink_rule("x", "usr/bin/tool", SymlinkReplacementRule::ErrorIfExists)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::RefusedSymlinkReplacement { .. }));
}

#[test]
fn symlink_abort_on_non_empty_directory_spares_only_empty_dirs() {
    let (mut fs, _ctx) = staged_tree();
    fs.mkdirs(fs.root(), "usr/share/empty").unwrap();
    symlink_rule("../x", "usr/share/empty", SymlinkReplacementRule::AbortOnNonEmptyDirectory)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let err = symlink_rule("../x", "usr/lib/pkg", SymlinkReplacementRule::AbortOnNonEmptyDirectory)
        .apply(&mut fs, &condition_context())
        .unwrap_err();
    assert!(matches!(err, TransformError::RefusedSymlinkReplacement { .. }));
}

#[test]
fn symlink_discard_existing_replaces_a_populated_directory() {
    let (mut fs, _ctx) = staged_tree();
    symlink_rule("elsewhere", "usr/lib/pkg", SymlinkReplacementRule::DiscardExisting)
        .apply(&mut fs, &condition_context())
        .unwrap();
    let link = fs.lookup(fs.root(), "usr/lib/pkg").unwrap().unwrap();
    assert!(fs.is_symlink(link));
}

#[test]
fn create_directories_applies_mode_and_ownership() {
    let (mut fs, _ctx) = staged_tree();
    let rule = TransformationRule::CreateDirectories {
        directories: vec!["var/log/pkg".to_owned()],
        owner: Some(StaticOwner::from_name_and_id("daemon", 1).unwrap()),
        group: Some(StaticGroup::from_name_and_id("adm", 4).unwrap()),
        mode: Some(FileSystemMode::Octal(0o2750)),
        definition_source: "create-directories (test)".to_owned(),
        condition: None,
    };
    rule.apply(&mut fs, &condition_context()).unwrap();
    let dir = fs.lookup(fs.root(), "var/log/pkg").unwrap().unwrap();
    assert_eq!(fs.mode(dir), 0o2750);
    let (owner, group) = fs.ownership(dir);
    assert_eq!((owner.name(), owner.id()), ("daemon", 1));
    assert_eq!((group.name(), group.id()), ("adm", 4));
}

#[test]
fn path_metadata_applies_recursively_and_skips_symlinks() {
    let (mut fs, _ctx) = staged_tree();
    let lib = fs.lookup(fs.root(), "usr/lib/pkg").unwrap().unwrap();
    fs.add_symlink(lib, "libfoo.so", "libfoo.so.1").unwrap();
    let rule = TransformationRule::PathMetadata {
        match_rules: vec![parse("usr/lib/pkg")],
        owner: None,
        group: None,
        mode: Some(FileSystemMode::symbolic("g-r").unwrap()),
        capabilities: None,
        capability_mode: None,
        recursive: true,
        definition_source: "path-metadata (test)".to_owned(),
        condition: None,
    };
    rule.apply(&mut fs, &condition_context()).unwrap();
    let so = fs.lookup(fs.root(), "usr/lib/pkg/libfoo.so.1").unwrap().unwrap();
    assert_eq!(fs.mode(so), 0o604);
    let link = fs.lookup(fs.root(), "usr/lib/pkg/libfoo.so").unwrap().unwrap();
    assert!(fs.is_symlink(link));
}

#[test]
fn path_metadata_records_capabilities_on_files() {
    let (mut fs, _ctx) = staged_tree();
    let rule = TransformationRule::PathMetadata {
        match_rules: vec![parse("usr/bin/tool")],
        owner: None,
        group: None,
        mode: None,
        capabilities: Some("cap_net_raw+ep".to_owned()),
        capability_mode: Some(FileSystemMode::Octal(0o755)),
        recursive: false,
        definition_source: "path-metadata (test)".to_owned(),
        condition: None,
    };
    rule.apply(&mut fs, &condition_context()).unwrap();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    let cap = fs.path_metadata::<Capability>(tool).unwrap();
    assert_eq!(cap.capabilities, "cap_net_raw+ep");
}

#[test]
fn disabled_condition_turns_a_rule_into_a_noop() {
    let (mut fs, _ctx) = staged_tree();
    let rule = TransformationRule::Move {
        match_rule: parse("no/such/path"),
        dest_path: "usr/bin/elsewhere".to_owned(),
        dest_is_dir: false,
        definition_source: "move (test)".to_owned(),
        condition: Some(pkgs::ManifestCondition::CrossCompiling),
    };
    // Not cross compiling, so the unmatchable pattern never runs.
    rule.apply(&mut fs, &condition_context()).unwrap();
}

fn normalization_tree() -> (Fs, BuildContext) {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let bin = fs.mkdirs(fs.root(), "usr/bin").unwrap();
    fs.add_file_from_bytes(bin, "tool", b"#!/bin/sh\necho hi\n", &ctx, 0o644)
        .unwrap();
    fs.add_file_from_bytes(bin, "libweird.so", b"elf\n", &ctx, 0o755)
        .unwrap();
    let man = fs.mkdirs(fs.root(), "usr/share/man/man1").unwrap();
    fs.add_file_from_bytes(man, "tool.1", b".TH TOOL 1\n", &ctx, 0o600)
        .unwrap();
    let misc = fs.mkdirs(fs.root(), "usr/share/misc").unwrap();
    fs.add_file_from_bytes(misc, "data", b"data\n", &ctx, 0o640)
        .unwrap();
    (fs, ctx)
}

fn builtin_table() -> ModeNormalizationTable {
    let substitution = Substitution::new().with_variable("PACKAGE", "pkg");
    ModeNormalizationTable::builtin(&substitution, &[]).unwrap()
}

#[test]
fn mode_normalization_applies_policy_modes() {
    let (mut fs, _ctx) = normalization_tree();
    builtin_table().apply(&mut fs).unwrap();
    let mode_of = |fs: &Fs, path: &str| {
        let id = fs.lookup(fs.root(), path).unwrap().unwrap();
        fs.mode(id)
    };
    assert_eq!(mode_of(&fs, "usr/bin/tool"), 0o755);
    assert_eq!(mode_of(&fs, "usr/share/man/man1/tool.1"), 0o644);
    // The catch-all symbolic rule opens group/other read on data files.
    assert_eq!(mode_of(&fs, "usr/share/misc/data"), 0o644);
    assert_eq!(mode_of(&fs, "usr/share/misc"), 0o755);
}

#[test]
fn shared_object_rule_beats_the_bin_dir_rule() {
    let (mut fs, _ctx) = normalization_tree();
    builtin_table().apply(&mut fs).unwrap();
    let so = fs.lookup(fs.root(), "usr/bin/libweird.so").unwrap().unwrap();
    assert_eq!(fs.mode(so), 0o644);
}

#[test]
fn perl_and_ada_rules_reach_nested_files() {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let perl_root = "usr/lib/x86_64-linux-gnu/perl5/5.36";
    let perl = fs.mkdirs(fs.root(), &format!("{perl_root}/Foo/Bar")).unwrap();
    fs.add_file_from_bytes(perl, "Baz.pm", b"package Baz;\n", &ctx, 0o755)
        .unwrap();
    let ada = fs.mkdirs(fs.root(), "usr/lib/gnat/deep").unwrap();
    fs.add_file_from_bytes(ada, "unit.ali", b"V \"GNAT\"\n", &ctx, 0o644)
        .unwrap();

    let substitution = Substitution::new().with_variable("PACKAGE", "pkg");
    let table =
        ModeNormalizationTable::builtin(&substitution, &[perl_root.to_owned()]).unwrap();
    table.apply(&mut fs).unwrap();

    let pm = fs
        .lookup(fs.root(), &format!("{perl_root}/Foo/Bar/Baz.pm"))
        .unwrap()
        .unwrap();
    assert_eq!(fs.mode(pm), 0o644);
    let ali = fs.lookup(fs.root(), "usr/lib/gnat/deep/unit.ali").unwrap().unwrap();
    assert_eq!(fs.mode(ali), 0o444);
}

#[test]
fn mode_normalization_is_idempotent() {
    let (mut fs, _ctx) = normalization_tree();
    let table = builtin_table();
    table.apply(&mut fs).unwrap();
    let before: Vec<(String, u32)> = fs
        .all_paths()
        .into_iter()
        .map(|id| (fs.path(id), fs.mode(id)))
        .collect();
    table.apply(&mut fs).unwrap();
    let after: Vec<(String, u32)> = fs
        .all_paths()
        .into_iter()
        .map(|id| (fs.path(id), fs.mode(id)))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn env_shebangs_are_unwrapped_to_the_canonical_interpreter() {
    let detected = extract_shebang_interpreter(b"#! /usr/bin/env sh\n").unwrap();
    assert_eq!(detected.original_command, "/usr/bin/env sh");
    assert_eq!(detected.command_stem, "sh");
    assert_eq!(detected.corrected_shebang_line.as_deref(), Some("#! /bin/sh"));
}

#[test]
fn canonical_shebangs_need_no_fixup() {
    let detected = extract_shebang_interpreter(b"#! /usr/bin/python3 -b\n").unwrap();
    assert_eq!(detected.command_stem, "python");
    assert_eq!(detected.interpreter_version, "3");
    assert!(!detected.fixup_needed());
}

#[test]
fn versioned_interpreters_keep_their_version_after_fixup() {
    let detected = extract_shebang_interpreter(b"#!/usr/local/bin/python3.12-dbg -b\n").unwrap();
    assert_eq!(detected.command_stem, "python");
    assert_eq!(detected.interpreter_version, "3.12-dbg");
    assert_eq!(
        detected.corrected_shebang_line.as_deref(),
        Some("#! /usr/bin/python3.12-dbg -b")
    );
}

#[test]
fn non_shebang_lines_are_ignored() {
    assert!(extract_shebang_interpreter(b"echo hi\n").is_none());
    // Relative interpreter paths never match.
    assert!(extract_shebang_interpreter(b"#!python3\n").is_none());
}

#[test]
fn shebang_normalization_rewrites_content_but_not_mtime() {
    let (mut fs, ctx) = staged_tree();
    let tool = fs.lookup(fs.root(), "usr/bin/tool").unwrap().unwrap();
    fs.set_mtime(tool, 1_234_567.5).unwrap();
    normalize_shebang_lines(&mut fs, &ctx).unwrap();
    let content = fs.read_backing_prefix(tool, 4096).unwrap().unwrap();
    assert_eq!(content, b"#! /bin/sh\necho hi\n");
    assert_eq!(fs.mtime(tool).unwrap(), 1_234_567.5);
}

#[test]
fn shebang_normalization_leaves_canonical_scripts_alone() {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let bin = fs.mkdirs(fs.root(), "usr/bin").unwrap();
    let tool = fs
        .add_file_from_bytes(bin, "tool", b"#!/bin/sh\necho hi\n", &ctx, 0o755)
        .unwrap();
    normalize_shebang_lines(&mut fs, &ctx).unwrap();
    let content = fs.read_backing_prefix(tool, 4096).unwrap().unwrap();
    assert_eq!(content, b"#!/bin/sh\necho hi\n");
}
