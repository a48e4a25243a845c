use vfs::{Fs, NodeId, PathKind};

use crate::error::ManifestError;
use crate::member::{IntermediateManifest, PathType, TarMember};
use crate::symlink::debian_policy_normalize_symlink_target;

/// Mode recorded for symlink members. Tar would accept anything, but
/// reproducible builds require the conventional value.
const SYMLINK_MODE: u32 = 0o777;

fn member_path(fs: &Fs, id: NodeId) -> String {
    let path = fs.path(id);
    if fs.is_dir(id) {
        format!("{path}/")
    } else {
        path
    }
}

fn base_member(fs: &Fs, id: NodeId, path_type: PathType, mode: u32, mtime: f64) -> TarMember {
    let (owner, group) = fs.ownership(id);
    TarMember {
        member_path: member_path(fs, id),
        path_type,
        fs_path: None,
        mode,
        owner: owner.name().to_owned(),
        uid: owner.id(),
        group: group.name().to_owned(),
        gid: group.id(),
        mtime,
        link_target: String::new(),
        is_virtual_entry: true,
        may_steal_fs_path: false,
    }
}

fn path_to_tar_member(
    fs: &mut Fs,
    id: NodeId,
    clamp_mtime_to: u64,
) -> Result<TarMember, ManifestError> {
    #[allow(clippy::cast_precision_loss)]
    let mut mtime = clamp_mtime_to as f64;
    if fs.has_backing_path(id) {
        mtime = mtime.min(fs.mtime(id)?);
    }

    match fs.kind(id) {
        PathKind::Symlink => {
            let link_path = fs.path(id);
            let link_target = debian_policy_normalize_symlink_target(&link_path, fs.readlink(id)?);
            let mut member = base_member(fs, id, PathType::Symlink, SYMLINK_MODE, mtime);
            member.link_target = link_target;
            Ok(member)
        }
        PathKind::Directory => {
            let mut member = base_member(fs, id, PathType::Directory, fs.mode(id), mtime);
            if let Some(backing) = fs.backing_path(id) {
                member.fs_path = Some(backing.display().to_string());
                member.is_virtual_entry = false;
            }
            Ok(member)
        }
        PathKind::File => {
            let Some(backing) = fs.backing_path(id) else {
                return Err(ManifestError::VirtualFile { path: fs.path(id) });
            };
            let fs_path = backing.display().to_string();
            let mut member = base_member(fs, id, PathType::File, fs.mode(id), mtime);
            member.fs_path = Some(fs_path);
            member.is_virtual_entry = false;
            member.may_steal_fs_path = fs.may_steal_backing(id);
            Ok(member)
        }
    }
}

/// Flattens a finished staging tree into the member list the `data.tar`
/// assembler consumes.
///
/// Members come out in walk order with one exception: symlinks are held
/// back and appended after everything else, so a link is never archived
/// before the content it points at.
pub fn generate_intermediate_manifest(
    fs: &mut Fs,
    clamp_mtime_to: u64,
) -> Result<IntermediateManifest, ManifestError> {
    let mut members = Vec::new();
    let mut symlinks = Vec::new();
    for id in fs.all_paths() {
        let member = path_to_tar_member(fs, id, clamp_mtime_to)?;
        if member.path_type == PathType::Symlink {
            symlinks.push(member);
        } else {
            members.push(member);
        }
    }
    members.append(&mut symlinks);
    Ok(members)
}
