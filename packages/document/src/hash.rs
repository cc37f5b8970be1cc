use crate::fragment::Fragment;
use crate::node::Node;
use crc32fast::Hasher;

/// Attribute (on nodes and formatting marks) holding change annotations.
pub const TRACKED_ATTR: &str = "dataTracked";

/// Copy of `node` with every change annotation removed, recursively.
pub fn strip_tracking(node: &Node) -> Node {
    let marks = node
        .marks()
        .iter()
        .filter(|m| !m.kind.is_tracking())
        .map(|m| {
            let mut m = m.clone();
            m.attrs.remove(TRACKED_ATTR);
            m
        })
        .collect();
    let mut attrs = node.attrs().clone();
    attrs.remove(TRACKED_ATTR);
    let stripped = node.with_attrs(attrs).with_marks(marks);
    if node.is_text() || node.child_count() == 0 {
        return stripped;
    }
    stripped.copy(node.content().map_children(strip_tracking))
}

/// Content hash of a node ignoring change annotations.
///
/// Two nodes with the same hash are treated as the same content for move
/// pairing.
pub fn content_hash(node: &Node) -> u32 {
    let mut hasher = Hasher::new();
    // Serializing a Node cannot fail: every field is plain data.
    if let Ok(bytes) = serde_json::to_vec(&strip_tracking(node)) {
        hasher.update(&bytes);
    }
    hasher.finalize()
}

pub fn fragment_hash(fragment: &Fragment) -> u32 {
    let mut hasher = Hasher::new();
    for node in fragment.iter() {
        hasher.update(&content_hash(node).to_le_bytes());
    }
    hasher.finalize()
}
