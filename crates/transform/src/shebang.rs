//! Interpreter detection and `#!`-line canonicalization.
//!
//! Debian policy wants scripts to use the canonical interpreter
//! locations (`/bin/sh`, `/usr/bin/perl`, ...). Scripts using `env` or
//! an alternative path such as `/usr/bin/sh` get their first line
//! rewritten; the rewrite is not counted as a content change, so the
//! file keeps its mtime.

use std::io::{Read, Write};
use std::sync::LazyLock;

use vfs::{BuildContext, Fs, WalkCursor};

use crate::error::TransformError;

static SHEBANG_RE: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(r"^#!\s*(/\S+/([a-zA-Z][^/\s]*))").expect("static regex")
});
static WORD_RE: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new(r"\s+(\S+)").expect("static regex"));
static STRIP_VERSION_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(-?\d+(?:[.]\d.+)?)$").expect("static regex"));

fn canonical_location(stem: &str) -> Option<&'static str> {
    match stem {
        "sh" => Some("/bin/sh"),
        "bash" => Some("/bin/bash"),
        "dash" => Some("/bin/dash"),
        "perl" => Some("/usr/bin/perl"),
        "python" => Some("/usr/bin/python"),
        _ => None,
    }
}

/// A parsed `#!` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectedInterpreter {
    /// The command as written, with the `env` argument folded in.
    pub original_command: String,
    /// Basename of the real interpreter, version included.
    pub command_full_basename: String,
    /// Basename with the trailing version stripped.
    pub command_stem: String,
    /// The stripped version part, empty when versionless.
    pub interpreter_version: String,
    /// Canonical location for the interpreter, when known.
    pub correct_command: Option<String>,
    /// Replacement first line; `None` when the line is already canonical
    /// or the interpreter is unknown.
    pub corrected_shebang_line: Option<String>,
}

impl DetectedInterpreter {
    /// Whether the `#!` line points at a non-canonical location.
    #[must_use]
    pub const fn fixup_needed(&self) -> bool {
        self.corrected_shebang_line.is_some()
    }
}

/// Parses the first line of a script. Returns `None` when the line is
/// not a shebang or not valid UTF-8.
#[must_use]
pub fn extract_shebang_interpreter(first_line: &[u8]) -> Option<DetectedInterpreter> {
    let m = SHEBANG_RE.captures(first_line)?;
    let full = m.get(1)?;
    let mut original_command = std::str::from_utf8(full.as_bytes()).ok()?.trim().to_owned();
    let mut command_full_basename = std::str::from_utf8(m.get(2)?.as_bytes())
        .ok()?
        .trim()
        .to_owned();
    let mut endpos = full.end();
    if command_full_basename == "env" {
        // `env` is a trampoline; the first argument is the interpreter.
        if let Some(wm) = WORD_RE.captures(&first_line[endpos..]) {
            let word = wm.get(1)?;
            command_full_basename = std::str::from_utf8(word.as_bytes()).ok()?.to_owned();
            original_command.push(' ');
            original_command.push_str(&command_full_basename);
            endpos += word.end();
        }
    }
    let (command_stem, interpreter_version) =
        match STRIP_VERSION_RE.captures(&command_full_basename) {
            Some(vm) => {
                let version = vm.get(1).map_or("", |g| g.as_str()).to_owned();
                let stem = command_full_basename[..command_full_basename.len() - version.len()]
                    .to_owned();
                (stem, version)
            }
            None => (command_full_basename.clone(), String::new()),
        };
    let correct_command = canonical_location(&command_stem).map(|canonical| {
        let mut command = canonical.to_owned();
        command.push_str(&interpreter_version);
        command
    });

    let corrected_shebang_line = match &correct_command {
        Some(correct) if *correct != original_command => {
            let trailing = first_line
                .get(endpos + 1..)
                .map(|rest| String::from_utf8_lossy(rest).trim().to_owned())
                .unwrap_or_default();
            let mut line = format!("#! {correct}");
            if !trailing.is_empty() {
                line.push(' ');
                line.push_str(&trailing);
            }
            Some(line)
        }
        _ => None,
    };

    Some(DetectedInterpreter {
        original_command,
        command_full_basename,
        command_stem,
        interpreter_version,
        correct_command,
        corrected_shebang_line,
    })
}

/// Rewrites non-canonical `#!` lines across every file in the tree.
///
/// Virtual files (no backing content) and files whose first 4 KiB hold
/// no newline are left alone. Rewritten files keep their mtime.
pub fn normalize_shebang_lines(fs: &mut Fs, context: &BuildContext) -> Result<(), TransformError> {
    let mut cursor = WalkCursor::new(fs.root());
    let mut files = Vec::new();
    while let Some(id) = cursor.next(fs) {
        if fs.is_file(id) {
            files.push(id);
        }
    }
    for id in files {
        let Some(prefix) = fs.read_backing_prefix(id, 4096)? else {
            continue;
        };
        let Some(newline) = prefix.iter().position(|&b| b == b'\n') else {
            continue;
        };
        let first_line = &prefix[..=newline];
        let Some(interpreter) = extract_shebang_interpreter(first_line) else {
            continue;
        };
        let Some(corrected) = interpreter.corrected_shebang_line else {
            continue;
        };
        tracing::debug!(
            path = %fs.path(id),
            from = %interpreter.original_command,
            to = %corrected,
            "rewriting shebang line to the canonical interpreter location"
        );
        let skip = newline + 1;
        let mtime = fs.mtime(id)?;
        fs.replace_fs_path_content(id, context, false, |staged| {
            let mut original = Vec::new();
            std::fs::File::open(staged)?.read_to_end(&mut original)?;
            let mut out = std::fs::File::create(staged)?;
            out.write_all(corrected.as_bytes())?;
            out.write_all(b"\n")?;
            out.write_all(&original[skip..])?;
            Ok(())
        })?;
        fs.set_mtime(id, mtime)?;
    }
    Ok(())
}
