//! Resolved positions: a position plus the path of ancestors around it.

use crate::error::{ReplaceError, ReplaceResult};
use crate::mark::Mark;
use crate::node::Node;

#[derive(Debug, Clone)]
struct PathEntry {
    node: Node,
    index: usize,
    /// Absolute position of the start of child `index`.
    offset: usize,
}

/// A position resolved against a specific document version.
///
/// Owns its ancestor chain so it remains usable after the document that
/// produced it has been replaced.
#[derive(Debug, Clone)]
pub struct ResolvedPos {
    pub pos: usize,
    pub depth: usize,
    pub parent_offset: usize,
    path: Vec<PathEntry>,
}

impl ResolvedPos {
    pub fn resolve(doc: &Node, pos: usize) -> ReplaceResult<ResolvedPos> {
        if pos > doc.content().size() {
            return Err(ReplaceError::out_of_range(pos, doc.content().size()));
        }
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc.clone();
        loop {
            let (index, offset) = node.content().find_index(parent_offset, -1)?;
            let rem = parent_offset - offset;
            path.push(PathEntry {
                node: node.clone(),
                index,
                offset: start + offset,
            });
            if rem == 0 {
                break;
            }
            let child = node.child(index).clone();
            if child.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += offset + 1;
            node = child;
        }
        Ok(ResolvedPos {
            pos,
            depth: path.len() - 1,
            parent_offset,
            path,
        })
    }

    /// The ancestor at depth `depth` (0 is the document).
    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    pub fn parent(&self) -> &Node {
        self.node(self.depth)
    }

    pub fn doc(&self) -> &Node {
        self.node(0)
    }

    /// Index into the ancestor at `depth`.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Index pointing after this position into the ancestor at `depth`.
    pub fn index_after(&self, depth: usize) -> usize {
        let bump = if depth == self.depth && self.text_offset() == 0 {
            0
        } else {
            1
        };
        self.index(depth) + bump
    }

    /// Start of the content of the ancestor at `depth`.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].offset + 1
        }
    }

    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content().size()
    }

    /// Position directly before the ancestor at `depth` (depth > 0). One
    /// level below the position itself this is the position.
    pub fn before(&self, depth: usize) -> usize {
        debug_assert!(depth > 0, "there is no position before the top-level node");
        if depth == self.depth + 1 {
            return self.pos;
        }
        self.path[depth - 1].offset
    }

    pub fn after(&self, depth: usize) -> usize {
        if depth == self.depth + 1 {
            return self.pos;
        }
        self.before(depth) + self.node(depth).node_size()
    }

    /// Offset into a text node when the position points inside one.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.depth].offset
    }

    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth);
        if index == parent.child_count() {
            return None;
        }
        let d_off = self.text_offset();
        let child = parent.child(index);
        if d_off > 0 {
            Some(child.cut(d_off, child.node_size()))
        } else {
            Some(child.clone())
        }
    }

    pub fn node_before(&self) -> Option<Node> {
        let index = self.index(self.depth);
        let d_off = self.text_offset();
        if d_off > 0 {
            return Some(self.parent().child(index).cut(0, d_off));
        }
        if index == 0 {
            None
        } else {
            Some(self.parent().child(index - 1).clone())
        }
    }

    /// Marks that apply at this position.
    pub fn marks(&self) -> Vec<Mark> {
        let parent = self.parent();
        let index = self.index(self.depth);
        if parent.content().size() == 0 {
            return Vec::new();
        }
        if self.text_offset() > 0 {
            return parent.child(index).marks().to_vec();
        }
        match parent.maybe_child(index.wrapping_sub(1)) {
            Some(before) if index > 0 => before.marks().to_vec(),
            _ => parent
                .maybe_child(index)
                .map(|n| n.marks().to_vec())
                .unwrap_or_default(),
        }
    }

    /// Deepest depth whose ancestor also contains `pos`.
    pub fn shared_depth(&self, pos: usize) -> usize {
        for depth in (1..=self.depth).rev() {
            if self.start(depth) <= pos && self.end(depth) >= pos {
                return depth;
            }
        }
        0
    }

    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.depth == other.depth && self.pos - self.parent_offset == other.pos - other.parent_offset
    }

    /// The range of block siblings around this position and `other`.
    pub fn block_range(&self, other: &ResolvedPos) -> Option<NodeRange> {
        self.block_range_where(other, |_| true)
    }

    pub fn block_range_where<P>(&self, other: &ResolvedPos, pred: P) -> Option<NodeRange>
    where
        P: Fn(&Node) -> bool,
    {
        if other.pos < self.pos {
            return other.block_range_where(self, pred);
        }
        let skip = if self.parent().inline_content() || self.pos == other.pos {
            1
        } else {
            0
        };
        if skip > self.depth {
            return None;
        }
        let mut d = self.depth - skip;
        loop {
            if other.pos <= self.end(d) && pred(self.node(d)) {
                return Some(NodeRange {
                    from: self.clone(),
                    to: other.clone(),
                    depth: d,
                });
            }
            if d == 0 {
                return None;
            }
            d -= 1;
        }
    }
}

/// A flat range of siblings inside a common parent.
#[derive(Debug, Clone)]
pub struct NodeRange {
    pub from: ResolvedPos,
    pub to: ResolvedPos,
    pub depth: usize,
}

impl NodeRange {
    pub fn start(&self) -> usize {
        self.from.before(self.depth + 1)
    }

    pub fn end(&self) -> usize {
        self.to.after(self.depth + 1)
    }

    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}
