use std::io;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Tar entry type of a manifest member.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// Regular file, always backed by a real filesystem path.
    File,
    /// Directory; may be virtual.
    Directory,
    /// Symlink; always virtual, its target lives in the record itself.
    Symlink,
}

impl PathType {
    /// Whether members of this type can exist without a backing path.
    #[must_use]
    pub const fn can_be_virtual(self) -> bool {
        matches!(self, Self::Directory | Self::Symlink)
    }
}

/// Modes are serialized as octal string literals (`"0o755"`) so the
/// manifest stays human-auditable.
mod octal_mode {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0o{mode:o}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let digits = raw
            .strip_prefix("0o")
            .ok_or_else(|| D::Error::custom(format!("bad mode {raw:?}: missing 0o prefix")))?;
        u32::from_str_radix(digits, 8)
            .map_err(|e| D::Error::custom(format!("bad mode {raw:?}: {e}")))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One member of the intermediate manifest: everything the `data.tar`
/// assembler needs to emit the entry without consulting the staging
/// tree again.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TarMember {
    /// In-package path (`./usr/bin/tool`; directories keep a trailing
    /// slash, the root is `./`).
    pub member_path: String,
    /// Entry type.
    pub path_type: PathType,
    /// Backing path holding the member's content. `None` for virtual
    /// members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_path: Option<String>,
    /// Mode bits.
    #[serde(with = "octal_mode")]
    pub mode: u32,
    /// Owner name.
    pub owner: String,
    /// Owner id.
    pub uid: u32,
    /// Group name.
    pub group: String,
    /// Group id.
    pub gid: u32,
    /// Modification time in seconds since the epoch, already clamped to
    /// the reproducibility cutoff.
    pub mtime: f64,
    /// Normalized symlink target; empty for non-symlinks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_target: String,
    /// Whether the member has no backing content.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_virtual_entry: bool,
    /// Whether the assembler may consume (move) the backing file rather
    /// than copying it. Only ever true for scratch-dir copies.
    #[serde(default, skip_serializing_if = "is_false")]
    pub may_steal_fs_path: bool,
}

fn member_dirname(member_path: &str) -> &str {
    let trimmed = member_path.trim_end_matches('/');
    if trimmed == "." {
        return trimmed;
    }
    trimmed.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// The intermediate manifest is an ordered list of [`TarMember`]s.
pub type IntermediateManifest = Vec<TarMember>;

/// Serializes `members` as JSON to `writer`.
pub fn write_intermediate_manifest<W: io::Write>(
    writer: W,
    members: &[TarMember],
) -> Result<(), ManifestError> {
    serde_json::to_writer_pretty(writer, members)?;
    Ok(())
}

/// Parses and validates an intermediate manifest.
///
/// The order invariant matters: every member must come after the
/// directory containing it, or the resulting `data.tar` would be broken
/// for stock `dpkg`.
pub fn parse_intermediate_manifest<R: io::Read>(
    reader: R,
) -> Result<IntermediateManifest, ManifestError> {
    let members: Vec<TarMember> = serde_json::from_reader(reader)?;
    let Some(first) = members.first() else {
        return Err(ManifestError::EmptyManifest);
    };
    if first.member_path != "./" {
        return Err(ManifestError::MissingRoot);
    }
    let mut directories: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    directories.insert(".");
    for member in &members {
        let dirname = member_dirname(&member.member_path);
        if !directories.contains(dirname) {
            return Err(ManifestError::OutOfOrderMember {
                member_path: member.member_path.clone(),
            });
        }
        if member.path_type == PathType::Directory {
            directories.insert(member.member_path.trim_end_matches('/'));
        }
    }
    Ok(members)
}
