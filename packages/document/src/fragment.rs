//! Ordered sequence of sibling nodes.

use crate::error::{ReplaceError, ReplaceResult};
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Immutable list of sibling nodes with a cached size.
///
/// Cloning is cheap: children are shared behind an `Arc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Node>", into = "Vec<Node>")]
pub struct Fragment {
    content: Arc<Vec<Node>>,
    size: usize,
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.content == other.content
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment::from_vec(nodes)
    }
}

impl From<Fragment> for Vec<Node> {
    fn from(fragment: Fragment) -> Self {
        fragment.content.as_ref().clone()
    }
}

impl Fragment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a fragment, joining adjacent text nodes with identical marks and
    /// dropping empty text.
    pub fn from_vec(nodes: Vec<Node>) -> Self {
        let mut joined: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            push_joined(&mut joined, node);
        }
        let size = joined.iter().map(Node::node_size).sum();
        Self {
            content: Arc::new(joined),
            size,
        }
    }

    pub fn from_node(node: Node) -> Self {
        Self::from_vec(vec![node])
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    pub fn child(&self, index: usize) -> &Node {
        &self.content[index]
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.content.get(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.content.iter()
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.content.as_ref().clone()
    }

    /// Find the child index containing `pos` and the offset where it starts.
    ///
    /// With `round > 0` a position inside a child rounds to the index after it.
    pub fn find_index(&self, pos: usize, round: i32) -> ReplaceResult<(usize, usize)> {
        if pos == 0 {
            return Ok((0, 0));
        }
        if pos == self.size {
            return Ok((self.content.len(), pos));
        }
        if pos > self.size {
            return Err(ReplaceError::out_of_range(pos, self.size));
        }
        let mut cur = 0;
        for (i, child) in self.content.iter().enumerate() {
            let end = cur + child.node_size();
            if end >= pos {
                if end == pos || round > 0 {
                    return Ok((i + 1, end));
                }
                return Ok((i, cur));
            }
            cur = end;
        }
        Err(ReplaceError::out_of_range(pos, self.size))
    }

    /// Call `f` for every node overlapping `[from, to)`, descending into
    /// children unless `f` returns false. `f` receives the node, its absolute
    /// position, its parent and its index in the parent.
    pub fn nodes_between<F>(
        &self,
        from: usize,
        to: usize,
        f: &mut F,
        node_start: usize,
        parent: Option<&Node>,
    ) where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        let mut pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos, parent, i) && child.content().size() > 0 {
                let start = pos + 1;
                child.content().nodes_between(
                    from.saturating_sub(start),
                    child.content().size().min(to.saturating_sub(start)),
                    f,
                    node_start + start,
                    Some(child),
                );
            }
            pos = end;
        }
    }

    /// Visit every descendant.
    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.size, f, 0, None);
    }

    pub fn text_between(&self, from: usize, to: usize, block_separator: &str) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(
            from,
            to,
            &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
                if let Some(s) = node.text_str() {
                    let start = from.saturating_sub(pos);
                    let end = (to - pos).min(node.node_size());
                    text.push_str(&char_slice(s, start, end));
                    first = false;
                } else if node.is_leaf() {
                    if node.kind() == crate::schema::NodeKind::HardBreak {
                        text.push('\n');
                    }
                    first = false;
                } else if !first && node.is_block() {
                    text.push_str(block_separator);
                    first = true;
                }
                true
            },
            0,
            None,
        );
        text
    }

    /// Concatenate, joining text at the seam.
    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.size == 0 && other.is_empty() {
            return self.clone();
        }
        if self.size == 0 && self.is_empty() {
            return other.clone();
        }
        let mut content = self.to_vec();
        for node in other.iter() {
            push_joined(&mut content, node.clone());
        }
        Fragment {
            size: self.size + other.size,
            content: Arc::new(content),
        }
    }

    /// Cut out the part of this fragment between two positions.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to >= self.size {
            return self.clone();
        }
        let mut result = Vec::new();
        if to > from {
            let mut pos = 0;
            for child in self.content.iter() {
                if pos >= to {
                    break;
                }
                let end = pos + child.node_size();
                if end > from {
                    let piece = if pos < from || end > to {
                        if child.is_text() {
                            child.cut(from.saturating_sub(pos), (to - pos).min(child.node_size()))
                        } else {
                            child.cut(
                                from.saturating_sub(pos + 1),
                                (to.saturating_sub(pos + 1)).min(child.content().size()),
                            )
                        }
                    } else {
                        child.clone()
                    };
                    result.push(piece);
                }
                pos = end;
            }
        }
        Fragment::from_vec(result)
    }

    pub fn cut_by_index(&self, from: usize, to: usize) -> Fragment {
        if from == to {
            return Fragment::empty();
        }
        if from == 0 && to == self.content.len() {
            return self.clone();
        }
        Fragment::from_vec(self.content[from..to].to_vec())
    }

    /// New fragment with the child at `index` replaced.
    pub fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let mut content = self.to_vec();
        content[index] = node;
        Fragment::from_vec(content)
    }

    /// Map every child, rebuilding the fragment.
    pub fn map_children<F>(&self, f: F) -> Fragment
    where
        F: FnMut(&Node) -> Node,
    {
        Fragment::from_vec(self.iter().map(f).collect())
    }
}

fn push_joined(target: &mut Vec<Node>, node: Node) {
    if node.is_text() && node.node_size() == 0 {
        return;
    }
    if let Some(last) = target.last_mut() {
        if last.is_text() && node.is_text() && last.same_markup(&node) {
            let joined = format!(
                "{}{}",
                last.text_str().unwrap_or_default(),
                node.text_str().unwrap_or_default()
            );
            *last = last.with_text(joined);
            return;
        }
    }
    target.push(node);
}

/// Slice a string by char offsets.
pub fn char_slice(s: &str, from: usize, to: usize) -> String {
    s.chars().skip(from).take(to.saturating_sub(from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::*;
    use crate::schema::MarkKind;

    #[test]
    fn test_from_vec_joins_text_with_same_marks() {
        let fragment = Fragment::from_vec(vec![text("ab"), text("cd")]);
        assert_eq!(fragment.child_count(), 1);
        assert_eq!(fragment.size(), 4);
    }

    #[test]
    fn test_from_vec_keeps_differently_marked_text_apart() {
        let fragment = Fragment::from_vec(vec![text("ab"), marked("cd", &[MarkKind::Bold])]);
        assert_eq!(fragment.child_count(), 2);
    }

    #[test]
    fn test_find_index() {
        let fragment = Fragment::from_vec(vec![p("ab"), p("cd")]);
        assert_eq!(fragment.find_index(0, -1).unwrap(), (0, 0));
        assert_eq!(fragment.find_index(2, -1).unwrap(), (0, 0));
        assert_eq!(fragment.find_index(4, -1).unwrap(), (1, 4));
        assert_eq!(fragment.find_index(8, -1).unwrap(), (2, 8));
        assert!(fragment.find_index(9, -1).is_err());
    }

    #[test]
    fn test_cut_descends_into_blocks() {
        let fragment = Fragment::from_vec(vec![p("abc"), p("def")]);
        let cut = fragment.cut(2, 7);
        assert_eq!(cut.child_count(), 2);
        assert_eq!(cut.child(0).text_content(), "bc");
        assert_eq!(cut.child(1).text_content(), "de");
    }

    #[test]
    fn test_text_between_separates_blocks() {
        let fragment = Fragment::from_vec(vec![p("ab"), p("cd")]);
        assert_eq!(fragment.text_between(0, fragment.size(), "|"), "ab|cd");
    }
}
