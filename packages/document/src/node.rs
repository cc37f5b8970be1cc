//! # Document nodes
//!
//! A [`Node`] is immutable. Every edit produces a new tree that shares
//! untouched children with the old one. Positions address the tree linearly:
//! entering or leaving a non-leaf node costs one position, each character of
//! text costs one, and a leaf node counts as one.

use crate::error::{ReplaceError, ReplaceResult};
use crate::fragment::{char_slice, Fragment};
use crate::mark::{Attrs, Mark};
use crate::replace::replace;
use crate::resolved::ResolvedPos;
use crate::schema::NodeKind;
use crate::slice::Slice;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: Attrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    marks: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Fragment::is_empty")]
    content: Fragment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Node {
    pub fn new(kind: NodeKind, attrs: Attrs, content: Fragment, marks: Vec<Mark>) -> Self {
        Self {
            kind,
            attrs,
            marks,
            content,
            text: None,
        }
    }

    /// Create an element node without attributes or marks.
    pub fn element(kind: NodeKind, children: Vec<Node>) -> Self {
        Self::new(kind, Attrs::new(), Fragment::from_vec(children), Vec::new())
    }

    pub fn text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            kind: NodeKind::Text,
            attrs: Attrs::new(),
            marks,
            content: Fragment::empty(),
            text: Some(text.into()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn text_str(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_text(&self) -> bool {
        self.kind.is_text()
    }

    pub fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    pub fn is_textblock(&self) -> bool {
        self.kind.is_textblock()
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    pub fn inline_content(&self) -> bool {
        self.kind.is_textblock()
    }

    pub fn node_size(&self) -> usize {
        match &self.text {
            Some(text) => text.chars().count(),
            None if self.kind.is_leaf() => 1,
            None => self.content.size() + 2,
        }
    }

    pub fn child_count(&self) -> usize {
        self.content.child_count()
    }

    pub fn child(&self, index: usize) -> &Node {
        self.content.child(index)
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.content.maybe_child(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first_child()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last_child()
    }

    pub fn text_content(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.content.text_between(0, self.content.size(), ""),
        }
    }

    pub fn text_between(&self, from: usize, to: usize, block_separator: &str) -> String {
        self.content.text_between(from, to, block_separator)
    }

    /// Same kind, attributes and marks.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.kind == other.kind && self.attrs == other.attrs && self.marks == other.marks
    }

    /// Copy of this node with different content.
    pub fn copy(&self, content: Fragment) -> Node {
        Node {
            kind: self.kind,
            attrs: self.attrs.clone(),
            marks: self.marks.clone(),
            content,
            text: None,
        }
    }

    pub fn with_text(&self, text: impl Into<String>) -> Node {
        Node {
            text: Some(text.into()),
            ..self.clone()
        }
    }

    pub fn with_marks(&self, marks: Vec<Mark>) -> Node {
        Node {
            marks,
            ..self.clone()
        }
    }

    pub fn with_attrs(&self, attrs: Attrs) -> Node {
        Node {
            attrs,
            ..self.clone()
        }
    }

    pub fn with_attr(&self, key: &str, value: Value) -> Node {
        let mut attrs = self.attrs.clone();
        if value.is_null() {
            attrs.remove(key);
        } else {
            attrs.insert(key.to_string(), value);
        }
        self.with_attrs(attrs)
    }

    /// Same attributes, marks and content under another kind.
    pub fn with_kind(&self, kind: NodeKind) -> Node {
        Node {
            kind,
            ..self.clone()
        }
    }

    /// Cut the node down to `[from, to)` of its content (or characters for text).
    pub fn cut(&self, from: usize, to: usize) -> Node {
        match &self.text {
            Some(text) => {
                let len = text.chars().count();
                if from == 0 && to >= len {
                    return self.clone();
                }
                self.with_text(char_slice(text, from, to))
            }
            None => {
                if from == 0 && to >= self.content.size() {
                    return self.clone();
                }
                self.copy(self.content.cut(from, to))
            }
        }
    }

    /// Extract the content between two positions as a slice.
    pub fn slice(&self, from: usize, to: usize) -> ReplaceResult<Slice> {
        if from == to {
            return Ok(Slice::empty());
        }
        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        let depth = rfrom.shared_depth(to);
        let start = rfrom.start(depth);
        let node = rfrom.node(depth);
        let content = node.content().cut(rfrom.pos - start, rto.pos - start);
        Ok(Slice::new(content, rfrom.depth - depth, rto.depth - depth))
    }

    /// Replace `[from, to)` with a slice, returning the new tree.
    pub fn replace(&self, from: usize, to: usize, slice: &Slice) -> ReplaceResult<Node> {
        replace(&self.resolve(from)?, &self.resolve(to)?, slice)
    }

    pub fn resolve(&self, pos: usize) -> ReplaceResult<ResolvedPos> {
        ResolvedPos::resolve(self, pos)
    }

    /// The node starting at `pos`, if any.
    pub fn node_at(&self, pos: usize) -> Option<&Node> {
        let mut node = self;
        let mut pos = pos;
        loop {
            let (index, offset) = node.content.find_index(pos, -1).ok()?;
            let child = node.content.maybe_child(index)?;
            if offset == pos || child.is_text() {
                return Some(child);
            }
            pos -= offset + 1;
            node = child;
        }
    }

    pub fn nodes_between<F>(&self, from: usize, to: usize, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.content.nodes_between(from, to, f, 0, Some(self));
    }

    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.content.size(), f);
    }

    /// Rebuild the tree with the node starting at `pos` swapped for `node`.
    pub fn replace_node_at(&self, pos: usize, node: Node) -> ReplaceResult<Node> {
        let (index, offset) = self.content.find_index(pos, -1)?;
        let child = self
            .content
            .maybe_child(index)
            .ok_or(ReplaceError::NoNodeAt(pos))?;
        if offset == pos {
            if child.is_text() != node.is_text() {
                return Err(ReplaceError::NoNodeAt(pos));
            }
            return Ok(self.copy(self.content.replace_child(index, node)));
        }
        if child.is_text() {
            return Err(ReplaceError::NoNodeAt(pos));
        }
        let inner = child.replace_node_at(pos - offset - 1, node)?;
        Ok(self.copy(self.content.replace_child(index, inner)))
    }

    /// Whether the children of this node are all of allowed kinds.
    pub fn valid_content(&self, content: &Fragment) -> bool {
        content.iter().all(|child| self.kind.allows(child.kind()))
    }

    /// Whether replacing children `[from, to)` with `replacement` keeps the
    /// content valid.
    pub fn can_replace(&self, from: usize, to: usize, replacement: &Fragment) -> bool {
        let before = self.content.cut_by_index(0, from);
        let after = self.content.cut_by_index(to, self.child_count());
        self.valid_content(&before.append(replacement).append(&after))
    }

    pub fn check(&self) -> ReplaceResult<()> {
        if !self.valid_content(&self.content) {
            return Err(ReplaceError::invalid_content(self.kind.name()));
        }
        for child in self.content.iter() {
            child.check()?;
        }
        Ok(())
    }
}
