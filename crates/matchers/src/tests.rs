use pkgs::Substitution;
use vfs::{BuildContext, Fs, PathKind};

use crate::{MatchError, MatchRule, MatchRuleKind};

fn parse(pattern: &str) -> MatchRule {
    MatchRule::from_path_or_glob(pattern, "test", None, &Substitution::new()).unwrap()
}

fn staged_tree() -> (Fs, BuildContext) {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let bin = fs.mkdirs(fs.root(), "usr/bin").unwrap();
    fs.add_file_from_bytes(bin, "tool", b"#!/usr/bin/env sh\n", &ctx, 0o755)
        .unwrap();
    fs.add_file_from_bytes(bin, "tool.sh", b"plain\n", &ctx, 0o644)
        .unwrap();
    let lib = fs.mkdirs(fs.root(), "usr/lib/pkg").unwrap();
    fs.add_file_from_bytes(lib, "libfoo.so.1", b"elf\n", &ctx, 0o644)
        .unwrap();
    fs.add_file_from_bytes(lib, "helper.la", b"libtool\n", &ctx, 0o644)
        .unwrap();
    (fs, ctx)
}

fn matched_paths(rule: &MatchRule, fs: &Fs) -> Vec<String> {
    rule.finditer(fs, None)
        .into_iter()
        .map(|id| fs.path(id))
        .collect()
}

#[test]
fn literal_patterns_become_exact_matches() {
    let rule = parse("usr/bin/tool");
    assert_eq!(rule.kind(), MatchRuleKind::ExactMatch);
    assert_eq!(rule.exact_path(), Some("./usr/bin/tool"));
    let (fs, _ctx) = staged_tree();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/bin/tool"]);
}

#[test]
fn leading_and_doubled_slashes_are_normalized_away() {
    let rule = parse("//usr///bin/./tool");
    assert_eq!(rule.exact_path(), Some("./usr/bin/tool"));
}

#[test]
fn trailing_star_is_a_direct_children_rule() {
    let rule = parse("usr/bin/*");
    assert_eq!(rule.kind(), MatchRuleKind::DirectChildrenOfDir);
    let (fs, _ctx) = staged_tree();
    assert_eq!(
        matched_paths(&rule, &fs),
        vec!["./usr/bin/tool", "./usr/bin/tool.sh"]
    );
}

#[test]
fn bare_basename_glob_is_recursive() {
    let rule = parse("*.la");
    assert_eq!(rule.kind(), MatchRuleKind::BasenameGlob);
    let (fs, _ctx) = staged_tree();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/lib/pkg/helper.la"]);
}

#[test]
fn double_star_prefix_glob_matches_any_depth() {
    let rule = parse("**/libfoo.so*");
    assert_eq!(rule.kind(), MatchRuleKind::BasenameGlob);
    let (fs, _ctx) = staged_tree();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/lib/pkg/libfoo.so.1"]);
}

#[test]
fn directory_scoped_glob_is_not_recursive() {
    let rule = parse("usr/lib/*.so*");
    assert_eq!(rule.kind(), MatchRuleKind::BasenameGlob);
    let (fs, _ctx) = staged_tree();
    // The .so lives one level deeper, so the scoped variant misses it.
    assert!(matched_paths(&rule, &fs).is_empty());
    let deeper = parse("usr/lib/pkg/*.so*");
    assert_eq!(matched_paths(&deeper, &fs), vec!["./usr/lib/pkg/libfoo.so.1"]);
}

#[test]
fn scoped_recursive_basename_glob_matches_at_any_depth() {
    let rule = MatchRule::basename_glob_beneath_directory(
        "usr/lib",
        "*.so*",
        "test",
        Some(PathKind::File),
        &Substitution::new(),
    )
    .unwrap();
    assert_eq!(rule.kind(), MatchRuleKind::BasenameGlob);
    assert_eq!(rule.describe_match_short(), "./usr/lib/**/*.so* <only for files>");
    let (fs, _ctx) = staged_tree();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/lib/pkg/libfoo.so.1"]);
    // Nothing outside the scope directory is considered.
    let scoped = MatchRule::basename_glob_beneath_directory(
        "usr/lib",
        "tool*",
        "test",
        None,
        &Substitution::new(),
    )
    .unwrap();
    assert!(matched_paths(&scoped, &fs).is_empty());
}

#[test]
fn interior_wildcards_fall_back_to_generic_glob() {
    let rule = parse("usr/*/pkg/*.la");
    assert_eq!(rule.kind(), MatchRuleKind::GenericGlob);
    let (fs, _ctx) = staged_tree();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/lib/pkg/helper.la"]);
}

#[test]
fn whole_tree_spellings_become_the_sentinel() {
    for pattern in ["*", "**/*", ".", "/"] {
        assert_eq!(parse(pattern).kind(), MatchRuleKind::MatchAnything);
    }
}

#[test]
fn brace_expansion_is_rejected_with_a_hint() {
    let err = MatchRule::from_path_or_glob("usr/{bin,sbin}/tool", "rule #1", None, &Substitution::new())
        .unwrap_err();
    match err {
        MatchError::BraceExpansion {
            replacement_hint, ..
        } => {
            // The hint stops at the closing brace; the tail is not echoed.
            assert_eq!(replacement_hint, "usr/{{OPEN_CURLY_BRACE}}bin,sbin}");
        }
        other => panic!("expected BraceExpansion, got {other}"),
    }
}

#[test]
fn interior_double_star_is_rejected() {
    let err =
        MatchRule::from_path_or_glob("usr/**/tool", "rule #1", None, &Substitution::new())
            .unwrap_err();
    assert!(matches!(err, MatchError::DoubleStar { .. }));
    let err = MatchRule::from_path_or_glob("usr/lib**", "rule #1", None, &Substitution::new())
        .unwrap_err();
    assert!(matches!(err, MatchError::DoubleStar { .. }));
}

#[test]
fn escaping_the_root_is_rejected() {
    let err = MatchRule::from_path_or_glob("../tool", "rule #1", None, &Substitution::new())
        .unwrap_err();
    assert!(matches!(err, MatchError::EscapesRoot { .. }));
}

#[test]
fn substituted_values_never_widen_globs() {
    let subst = Substitution::new().with_variable("SUFFIX", "s?");
    let rule =
        MatchRule::from_path_or_glob("tool{{SUFFIX}}*", "rule #1", None, &subst).unwrap();
    let (mut fs, ctx) = staged_tree();
    let bin = fs.lookup(fs.root(), "usr/bin").unwrap().unwrap();
    fs.add_file_from_bytes(bin, "tools?x", b"x", &ctx, 0o644)
        .unwrap();
    // "s?" must match literally, not as a glob that would also hit
    // "tool.sh" via "s" + any char.
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/bin/tools?x"]);
}

#[test]
fn path_kind_filter_applies() {
    let (fs, _ctx) = staged_tree();
    let rule = MatchRule::from_path_or_glob(
        "usr/bin/*",
        "rule #1",
        Some(PathKind::Directory),
        &Substitution::new(),
    )
    .unwrap();
    assert!(matched_paths(&rule, &fs).is_empty());
}

#[test]
fn recursive_beneath_directory_excludes_the_directory_itself() {
    let rule = MatchRule::recursive_beneath_directory(
        "usr/lib",
        "rule #1",
        None,
        &Substitution::new(),
    )
    .unwrap();
    assert_eq!(rule.kind(), MatchRuleKind::AnythingBeneathDir);
    let (fs, _ctx) = staged_tree();
    assert_eq!(
        matched_paths(&rule, &fs),
        vec![
            "./usr/lib/pkg",
            "./usr/lib/pkg/helper.la",
            "./usr/lib/pkg/libfoo.so.1",
        ]
    );
}

#[test]
fn ignore_callback_prunes_candidates() {
    let (fs, _ctx) = staged_tree();
    let rule = parse("usr/bin/*");
    let ignore = |id: vfs::NodeId| fs.name(id) == "tool";
    let matches: Vec<String> = rule
        .finditer(&fs, Some(&ignore))
        .into_iter()
        .map(|id| fs.path(id))
        .collect();
    assert_eq!(matches, vec!["./usr/bin/tool.sh"]);
}

#[test]
fn doc_content_rule_skips_examples_subtrees() {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let pkg_doc = fs.mkdirs(fs.root(), "usr/share/doc/pkg").unwrap();
    fs.add_file_from_bytes(pkg_doc, "README", b"docs", &ctx, 0o644)
        .unwrap();
    let examples = fs.mkdir(pkg_doc, "examples").unwrap();
    fs.add_file_from_bytes(examples, "demo.sh", b"#!/bin/sh\n", &ctx, 0o755)
        .unwrap();
    let nested = fs.mkdirs(fs.root(), "usr/share/doc/pkg/html").unwrap();
    fs.add_file_from_bytes(nested, "index.html", b"<html>", &ctx, 0o644)
        .unwrap();

    let rule = MatchRule::usr_share_doc_content();
    let mut matches = matched_paths(&rule, &fs);
    matches.sort();
    assert_eq!(
        matches,
        vec![
            "./usr/share/doc/pkg/README",
            "./usr/share/doc/pkg/html/index.html",
        ]
    );
}

#[test]
fn shebang_rule_sniffs_file_content() {
    let ctx = BuildContext::new().unwrap();
    let mut fs = Fs::new();
    let bin = fs.mkdirs(fs.root(), "usr/bin").unwrap();
    fs.add_file_from_bytes(bin, "script", b"#! /usr/bin/perl -w\n", &ctx, 0o644)
        .unwrap();
    fs.add_file_from_bytes(bin, "not-script", b"data #!/bin/sh\n", &ctx, 0o644)
        .unwrap();
    fs.add_file_from_bytes(bin, "local-script", b"#!/usr/local/bin/thing\n", &ctx, 0o644)
        .unwrap();

    let rule = MatchRule::shebang_scripts();
    assert_eq!(matched_paths(&rule, &fs), vec!["./usr/bin/script"]);
}

#[test]
fn descriptions_spell_out_the_match_semantics() {
    assert_eq!(
        parse("usr/bin/tool").describe_match_exact(),
        "./usr/bin/tool (the exact path / no globbing)"
    );
    assert_eq!(parse("usr/bin/*").describe_match_short(), "./usr/bin/*");
    assert_eq!(
        parse("*.la").describe_match_exact(),
        "*.la (basename match)"
    );
    assert_eq!(MatchRule::match_anything().to_string(), "**/*");
}
