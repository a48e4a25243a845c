use vfs::{Fs, NodeId, WalkCursor};

/// Files beneath `usr/share/doc`, skipping each package's `examples/`
/// subtree. Examples commonly ship scripts that must keep their execute
/// bits, so the doc-dir permission normalization must not see them.
pub(crate) fn doc_content_matches(fs: &Fs, skip: &dyn Fn(NodeId) -> bool) -> Vec<NodeId> {
    let Some(doc_dir) = fs
        .lookup(fs.root(), "usr/share/doc")
        .ok()
        .flatten()
        .filter(|&id| fs.is_dir(id))
    else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for pkg_entry in fs.children(doc_dir) {
        if skip(pkg_entry) {
            continue;
        }
        if fs.is_file(pkg_entry) {
            out.push(pkg_entry);
        }
        for sub in fs.children(pkg_entry) {
            if fs.name(sub) == "examples" && fs.is_dir(sub) {
                continue;
            }
            let mut cursor = WalkCursor::new(sub);
            while let Some(id) = cursor.next(fs) {
                if fs.is_file(id) && !skip(id) {
                    out.push(id);
                }
            }
        }
    }
    out
}
