//! Symlink target normalization per Debian Policy 10.5.
//!
//! A link and its target inside the same top-level directory must use a
//! relative target; links crossing top-level directories must use an
//! absolute one.

fn normalize_target_segments(link_target: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in link_target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Root escapes collapse like the kernel would resolve
                // them (/.. is /).
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments
}

/// Rewrites `link_target` into the spelling Debian Policy requires for a
/// link at `link_path` (a normalized `./`-prefixed in-package path).
///
/// Relative targets are resolved against the link's directory first, so
/// the result depends only on where the link and target actually live.
#[must_use]
pub fn debian_policy_normalize_symlink_target(link_path: &str, link_target: &str) -> String {
    let link_path = link_path.strip_prefix("./").unwrap_or(link_path);

    let resolved_target = if link_target.starts_with('/') {
        link_target.to_owned()
    } else {
        let link_dir = link_path.rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("/{link_dir}/{link_target}")
    };

    let link_path_parts: Vec<&str> = link_path.split('/').collect();
    let link_target_parts = normalize_target_segments(&resolved_target);

    if link_target_parts.first() != link_path_parts.first() {
        // Different top-level directories, so the target must be absolute.
        return format!("/{}", link_target_parts.join("/"));
    }

    let shortest = link_target_parts.len().min(link_path_parts.len());
    let mut common = 1;
    while common < shortest && link_target_parts[common] == link_path_parts[common] {
        common += 1;
    }

    if common == shortest && link_path_parts.len() - 1 == link_target_parts.len() {
        // The link points at its own directory.
        return ".".to_owned();
    }

    let up_dir_count = link_path_parts.len().saturating_sub(common + 1);
    let mut parts: Vec<&str> = Vec::with_capacity(up_dir_count + link_target_parts.len() - common);
    parts.extend(std::iter::repeat_n("..", up_dir_count));
    parts.extend(&link_target_parts[common..]);
    parts.join("/")
}
