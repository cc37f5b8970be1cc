//! Queries about where structural edits are possible.

use redline_document::{Fragment, Node, NodeRange, ResolvedPos};

fn can_cut(node: &Node, start: usize, end: usize) -> bool {
    (start == 0 || node.can_replace(start, node.child_count(), &Fragment::empty()))
        && (end == node.child_count() || node.can_replace(0, end, &Fragment::empty()))
}

/// The depth the content of `range` could be lifted to, if any.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let parent = range.parent();
    let content = parent
        .content()
        .cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth && node.can_replace(index, end_index, &content) {
            return Some(depth);
        }
        if depth == 0 || node.kind().is_isolating() || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

/// Whether the nodes on both sides of `pos` can be joined.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    let index = rpos.index(rpos.depth);
    match (rpos.node_before(), rpos.node_after()) {
        (Some(before), Some(after)) => {
            !before.is_leaf()
                && before.kind().compatible_content(after.kind())
                && rpos.parent().can_replace(index, index + 1, &Fragment::empty())
        }
        _ => false,
    }
}

/// Whether the textblock (or `depth` levels of ancestors) around `pos` can be
/// split there.
pub fn can_split(doc: &Node, pos: usize, depth: usize) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    if depth == 0 || depth > rpos.depth {
        return false;
    }
    let base = rpos.depth - depth;
    (base + 1..=rpos.depth).all(|d| !rpos.node(d).kind().is_isolating())
        && rpos.node(base).kind().allows(rpos.node(base + 1).kind())
}

/// Range of the block at `pos` resolved as a single-node block range.
pub fn block_range_at(rpos: &ResolvedPos) -> Option<NodeRange> {
    rpos.block_range(rpos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_document::builders::*;

    #[test]
    fn test_lift_target_out_of_blockquote() {
        let d = doc(vec![blockquote(vec![p("ab")])]);
        let rpos = d.resolve(2).unwrap();
        let range = block_range_at(&rpos).unwrap();
        assert_eq!(lift_target(&range), Some(0));
    }

    #[test]
    fn test_no_lift_target_at_top_level() {
        let d = doc(vec![p("ab")]);
        let rpos = d.resolve(1).unwrap();
        let range = block_range_at(&rpos).unwrap();
        assert_eq!(lift_target(&range), None);
    }

    #[test]
    fn test_can_join_paragraphs_not_lists() {
        let d = doc(vec![p("ab"), p("cd"), bullet_list(vec![list_item(vec![p("e")])])]);
        assert!(can_join(&d, 4));
        assert!(!can_join(&d, 8));
        assert!(!can_join(&d, 2));
    }

    #[test]
    fn test_can_split_textblock() {
        let d = doc(vec![p("abcd")]);
        assert!(can_split(&d, 3, 1));
        assert!(!can_split(&d, 3, 2));
    }
}
