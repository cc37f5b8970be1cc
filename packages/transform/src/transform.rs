//! # Transform
//!
//! An edit in progress: a starting document, the steps applied to it so far,
//! every intermediate document and the accumulated position mapping.
//!
//! ## Design
//!
//! - `docs[i]` is the document step `i` was applied to
//! - The mapping holds one step map per step, in order
//! - Metadata travels with the edit so downstream consumers (like the
//!   change tracker) can be told to leave it alone
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tr = Transform::new(doc);
//! tr.delete(3, 7)?;
//! tr.add_mark(1, 3, Mark::new(MarkKind::Bold))?;
//! let edited = tr.doc();
//! ```

use crate::step::{
    AddMarkStep, AddNodeMarkStep, AttrStep, RemoveMarkStep, RemoveNodeMarkStep,
    ReplaceAroundStep, ReplaceStep, Step, StepError, StepResult,
};
use crate::step_map::Mapping;
use redline_document::{Attrs, Fragment, Mark, MarkKind, Node, NodeKind, NodeRange, Slice};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Transform {
    /// Document before each step
    docs: Vec<Node>,

    steps: Vec<Step>,

    /// Current document
    doc: Node,

    mapping: Mapping,

    meta: BTreeMap<String, Value>,
}

impl Transform {
    pub fn new(doc: Node) -> Self {
        Self {
            docs: Vec::new(),
            steps: Vec::new(),
            doc,
            mapping: Mapping::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    /// The document before any step was applied.
    pub fn before(&self) -> &Node {
        self.docs.first().unwrap_or(&self.doc)
    }

    pub fn docs(&self) -> &[Node] {
        &self.docs
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn has_meta(&self, key: &str) -> bool {
        self.meta.contains_key(key)
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    /// Apply a step, failing without touching the transform if it does not
    /// apply.
    pub fn step(&mut self, step: Step) -> StepResult<&mut Self> {
        let doc = step.apply(&self.doc)?;
        trace!(step = step.name(), from = step.from(), "applied step");
        self.add_step(step, doc);
        Ok(self)
    }

    /// Apply a step, returning whether it applied.
    pub fn maybe_step(&mut self, step: Step) -> bool {
        self.step(step).is_ok()
    }

    fn add_step(&mut self, step: Step, doc: Node) {
        let previous = std::mem::replace(&mut self.doc, doc);
        self.docs.push(previous);
        self.mapping.append_map(step.get_map());
        self.steps.push(step);
    }

    pub fn replace(&mut self, from: usize, to: usize, slice: Slice) -> StepResult<&mut Self> {
        if from == to && slice.size() == 0 {
            return Ok(self);
        }
        self.step(Step::replace(from, to, slice))
    }

    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: Fragment,
    ) -> StepResult<&mut Self> {
        self.replace(from, to, Slice::closed(content))
    }

    pub fn insert(&mut self, pos: usize, content: Fragment) -> StepResult<&mut Self> {
        self.replace_with(pos, pos, content)
    }

    pub fn insert_text(&mut self, pos: usize, text: &str) -> StepResult<&mut Self> {
        // Change-tracking marks never extend to newly typed text.
        let marks = self
            .doc
            .resolve(pos)?
            .marks()
            .into_iter()
            .filter(|m| !m.kind.is_tracking())
            .collect();
        self.insert(pos, Fragment::from_node(Node::text(text, marks)))
    }

    pub fn delete(&mut self, from: usize, to: usize) -> StepResult<&mut Self> {
        self.replace(from, to, Slice::empty())
    }

    /// Add a mark to inline content, replacing marks of the same kind.
    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> StepResult<&mut Self> {
        let mut removed: Vec<RemoveMarkStep> = Vec::new();
        let mut added: Vec<AddMarkStep> = Vec::new();
        self.doc.nodes_between(
            from,
            to,
            &mut |node: &Node, pos: usize, parent: Option<&Node>, _index: usize| {
                if !node.is_inline() {
                    return true;
                }
                let allowed = parent.map(|p| p.kind().allows_marks()).unwrap_or(false);
                if mark.is_in_set(node.marks()) || !allowed {
                    return true;
                }
                let start = pos.max(from);
                let end = (pos + node.node_size()).min(to);
                let new_set = mark.add_to_set(node.marks());
                for old in node.marks() {
                    if old.is_in_set(&new_set) {
                        continue;
                    }
                    match removed.last_mut() {
                        Some(last) if last.to == start && last.mark == *old => last.to = end,
                        _ => removed.push(RemoveMarkStep {
                            from: start,
                            to: end,
                            mark: old.clone(),
                        }),
                    }
                }
                match added.last_mut() {
                    Some(last) if last.to == start => last.to = end,
                    _ => added.push(AddMarkStep {
                        from: start,
                        to: end,
                        mark: mark.clone(),
                    }),
                }
                true
            },
        );
        for step in removed {
            self.step(Step::RemoveMark(step))?;
        }
        for step in added {
            self.step(Step::AddMark(step))?;
        }
        Ok(self)
    }

    /// Remove every mark of `kind` from inline content in the range.
    pub fn remove_mark(&mut self, from: usize, to: usize, kind: MarkKind) -> StepResult<&mut Self> {
        let mut matched: Vec<RemoveMarkStep> = Vec::new();
        self.doc.nodes_between(
            from,
            to,
            &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
                if !node.is_inline() {
                    return true;
                }
                let start = pos.max(from);
                let end = (pos + node.node_size()).min(to);
                for mark in node.marks().iter().filter(|m| m.kind == kind) {
                    match matched.iter_mut().find(|m| m.mark == *mark && m.to == start) {
                        Some(found) => found.to = end,
                        None => matched.push(RemoveMarkStep {
                            from: start,
                            to: end,
                            mark: mark.clone(),
                        }),
                    }
                }
                true
            },
        );
        for step in matched {
            self.step(Step::RemoveMark(step))?;
        }
        Ok(self)
    }

    pub fn add_node_mark(&mut self, pos: usize, mark: Mark) -> StepResult<&mut Self> {
        self.step(Step::AddNodeMark(AddNodeMarkStep { pos, mark }))
    }

    pub fn remove_node_mark(&mut self, pos: usize, mark: Mark) -> StepResult<&mut Self> {
        self.step(Step::RemoveNodeMark(RemoveNodeMarkStep { pos, mark }))
    }

    pub fn set_node_attribute(
        &mut self,
        pos: usize,
        attr: impl Into<String>,
        value: Value,
    ) -> StepResult<&mut Self> {
        self.step(Step::Attr(AttrStep {
            pos,
            attr: attr.into(),
            value,
        }))
    }

    /// Change the kind and/or attributes of the node at `pos`, keeping its
    /// content.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        kind: Option<NodeKind>,
        attrs: Option<Attrs>,
    ) -> StepResult<&mut Self> {
        let node = self.doc.node_at(pos).ok_or(StepError::NoNodeAt(pos))?.clone();
        let kind = kind.unwrap_or(node.kind());
        let attrs = attrs.unwrap_or_else(|| node.attrs().clone());
        let marker = Node::new(kind, attrs, Fragment::empty(), node.marks().to_vec());
        if node.is_leaf() {
            return self.replace_with(pos, pos + node.node_size(), Fragment::from_node(marker));
        }
        if !marker.valid_content(node.content()) {
            return Err(redline_document::ReplaceError::invalid_content(kind.name()).into());
        }
        let end = pos + node.node_size();
        self.step(Step::ReplaceAround(ReplaceAroundStep {
            from: pos,
            to: end,
            gap_from: pos + 1,
            gap_to: end - 1,
            slice: Slice::closed(Fragment::from_node(marker)),
            insert: 1,
            structure: true,
        }))
    }

    /// Lift the content of `range` out of its ancestors down to depth `target`.
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> StepResult<&mut Self> {
        let from = &range.from;
        let to = &range.to;
        let depth = range.depth;
        let gap_start = from.before(depth + 1);
        let gap_end = to.after(depth + 1);
        let mut start = gap_start;
        let mut end = gap_end;

        let mut before = Fragment::empty();
        let mut open_start = 0;
        let mut splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || from.index(d) > 0 {
                splitting = true;
                before = Fragment::from_node(from.node(d).copy(before));
                open_start += 1;
            } else {
                start -= 1;
            }
        }

        let mut after = Fragment::empty();
        let mut open_end = 0;
        let mut splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || to.after(d + 1) < to.end(d) {
                splitting = true;
                after = Fragment::from_node(to.node(d).copy(after));
                open_end += 1;
            } else {
                end += 1;
            }
        }

        let insert = before.size() - open_start;
        self.step(Step::ReplaceAround(ReplaceAroundStep {
            from: start,
            to: end,
            gap_from: gap_start,
            gap_to: gap_end,
            slice: Slice::new(before.append(&after), open_start, open_end),
            insert,
            structure: true,
        }))
    }

    /// Wrap `range` in the given wrapper nodes, outermost first. The wrappers'
    /// own content is ignored.
    pub fn wrap(&mut self, range: &NodeRange, wrappers: &[Node]) -> StepResult<&mut Self> {
        let mut content = Fragment::empty();
        for wrapper in wrappers.iter().rev() {
            content = Fragment::from_node(wrapper.copy(content));
        }
        let start = range.start();
        let end = range.end();
        self.step(Step::ReplaceAround(ReplaceAroundStep {
            from: start,
            to: end,
            gap_from: start,
            gap_to: end,
            slice: Slice::closed(content),
            insert: wrappers.len(),
            structure: true,
        }))
    }

    /// Split the node at `pos`, `depth` levels deep.
    pub fn split(&mut self, pos: usize, depth: usize) -> StepResult<&mut Self> {
        let rpos = self.doc.resolve(pos)?;
        let mut before = Fragment::empty();
        let mut after = Fragment::empty();
        let stop = rpos.depth.saturating_sub(depth);
        for d in (stop + 1..=rpos.depth).rev() {
            before = Fragment::from_node(rpos.node(d).copy(before));
            after = Fragment::from_node(rpos.node(d).copy(after));
        }
        self.step(Step::Replace(ReplaceStep::structural(
            pos,
            pos,
            Slice::new(before.append(&after), depth, depth),
        )))
    }

    /// Join the blocks around `pos`, `depth` levels deep.
    pub fn join(&mut self, pos: usize, depth: usize) -> StepResult<&mut Self> {
        self.step(Step::Replace(ReplaceStep::structural(
            pos - depth,
            pos + depth,
            Slice::empty(),
        )))
    }
}
