use std::fs;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use vfs::{Fs, NodeId};

use crate::error::InstallError;

static MAN_TH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[.]TH\s+\S+\s+"?(\d+[^"\s]*)"?"#).expect("static regex"));
static MAN_DT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[.]Dt\s+\S+\s+(\d+\S*)").expect("static regex"));
static MAN_SECTION_BASENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.]([1-9]\w*)(?:[.]gz)?$").expect("static regex"));
static MAN_REAL_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("static regex"));
static MAN_INST_BASENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.][^.]+$").expect("static regex"));
static MAN_GUESS_LANG_FROM_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)man/(?:([a-z][a-z](?:_[A-Z][A-Z])?)(?:\.[^/]+)?)?/man[1-9]/")
        .expect("static regex")
});
static MAN_GUESS_FROM_BASENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.]([a-z][a-z](?:_[A-Z][A-Z])?)[.](?:[1-9]|man)").expect("static regex")
});

/// How the language of an install-man rule is chosen.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) enum ManpageLanguage {
    /// Sniff a `man/<lang>/manN/` segment out of the source path.
    #[default]
    DeriveFromPath,
    /// Sniff a `.<lang>.<section>` infix out of the basename.
    DeriveFromBasename,
    /// A fixed language (`C` meaning "no language subdir").
    Explicit(String),
}

impl ManpageLanguage {
    pub(crate) fn from_option(language: Option<&str>) -> Self {
        match language {
            None | Some("derive-from-path") => Self::DeriveFromPath,
            Some("derive-from-basename") => Self::DeriveFromBasename,
            Some(explicit) => Self::Explicit(explicit.to_owned()),
        }
    }
}

fn detect_section_from_content(fs: &Fs, id: NodeId) -> Option<String> {
    let fs_path = fs.backing_path(id)?;
    let content = fs::read_to_string(fs_path).ok()?;
    for line in content.lines() {
        if !line.starts_with(".TH") && !line.starts_with(".Dt") {
            continue;
        }
        let m = MAN_DT_LINE
            .captures(line)
            .or_else(|| MAN_TH_LINE.captures(line))?;
        let detected = m[1].to_owned();
        if detected.contains('.') {
            warn!(
                "ignoring detected section {detected} in {}: it looks too much like a version",
                fs_path.display()
            );
            return None;
        }
        return Some(detected);
    }
    None
}

fn determine_section(
    fs: &Fs,
    id: NodeId,
    provided_section: Option<u32>,
) -> Option<String> {
    if let Some(section) = provided_section {
        return Some(section.to_string());
    }
    detect_section_from_content(fs, id).or_else(|| {
        MAN_SECTION_BASENAME
            .captures(fs.name(id))
            .map(|m| m[1].to_owned())
    })
}

fn determine_real_section(
    fs: &Fs,
    id: NodeId,
    section: Option<&str>,
    definition_source: &str,
) -> Result<u32, InstallError> {
    let real_section = section
        .and_then(|s| MAN_REAL_SECTION.captures(s))
        .and_then(|m| m[1].parse::<u32>().ok());
    match real_section {
        Some(real) if (1..=9).contains(&real) => Ok(real),
        other => {
            if let Some(real) = other {
                warn!(
                    "computed section for {} was {real} (section: {}), which is not a valid \
                     section (must be between 1 and 9 incl.)",
                    fs.path(id),
                    section.unwrap_or("")
                );
            }
            Err(InstallError::ManpageSection {
                path: fs
                    .backing_path(id)
                    .map_or_else(|| fs.path(id).into(), std::path::Path::to_path_buf),
                definition_source: definition_source.to_owned(),
            })
        }
    }
}

fn determine_language(fs: &Fs, id: NodeId, language: &ManpageLanguage) -> Option<String> {
    match language {
        ManpageLanguage::Explicit(lang) => {
            if lang == "C" {
                None
            } else {
                Some(lang.clone())
            }
        }
        ManpageLanguage::DeriveFromBasename => MAN_GUESS_FROM_BASENAME
            .captures(fs.name(id))
            .map(|m| m[1].to_owned()),
        ManpageLanguage::DeriveFromPath => MAN_GUESS_LANG_FROM_PATH
            .captures(&fs.path(id))
            .and_then(|m| m.get(1))
            .map(|m| m.as_str().to_owned()),
    }
}

/// Computes the destination path for one matched man page.
///
/// The section comes from (in order) the rule, a `.TH`/`.Dt` troff
/// header, or the basename suffix; the language from the rule's language
/// policy. The result has the `usr/share/man/[<lang>/]manN/<page>.N`
/// shape.
pub(crate) fn manpage_dest_path(
    fs: &Fs,
    id: NodeId,
    provided_section: Option<u32>,
    language: &ManpageLanguage,
    definition_source: &str,
) -> Result<String, InstallError> {
    let mut inst_basename = MAN_INST_BASENAME.replace(fs.name(id), "").into_owned();
    let section = determine_section(fs, id, provided_section);
    let real_section = determine_real_section(fs, id, section.as_deref(), definition_source)?;
    let section = section.expect("real section implies a section");
    let maybe_language = match determine_language(fs, id, language) {
        Some(lang) => {
            let lang_suffix = format!(".{lang}");
            if let Some(stripped) = inst_basename.strip_suffix(&lang_suffix) {
                inst_basename = stripped.to_owned();
            }
            format!("{lang}/")
        }
        None => String::new(),
    };
    Ok(format!(
        "usr/share/man/{maybe_language}man{real_section}/{inst_basename}.{section}"
    ))
}
