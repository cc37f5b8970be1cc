//! # Steps
//!
//! The atomic, invertible edits a [`crate::Transform`] is made of. Each step
//! can be applied to a document, report the positions it changed as a
//! [`StepMap`], produce its inverse against the document it was applied to,
//! and be rebased over a [`Mapping`].

use crate::step_map::{MapRange, Mapping, StepMap};
use redline_document::{Fragment, Mark, Node, ReplaceError, Slice};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type StepResult<T> = Result<T, StepError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error("Structure replace would overwrite content")]
    StructureOverwrite,

    #[error("Gap is not a flat range")]
    GapNotFlat,

    #[error("Content does not fit in gap")]
    GapDoesNotFit,

    #[error("No node at position {0}")]
    NoNodeAt(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceStep {
    pub from: usize,
    pub to: usize,
    pub slice: Slice,
    /// Only allowed to replace structure (node boundaries), never content.
    #[serde(default)]
    pub structure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAroundStep {
    pub from: usize,
    pub to: usize,
    pub gap_from: usize,
    pub gap_to: usize,
    pub slice: Slice,
    /// Position in the slice where the gap content is inserted.
    pub insert: usize,
    #[serde(default)]
    pub structure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrStep {
    pub pos: usize,
    pub attr: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
pub enum Step {
    Replace(ReplaceStep),
    ReplaceAround(ReplaceAroundStep),
    AddMark(AddMarkStep),
    RemoveMark(RemoveMarkStep),
    AddNodeMark(AddNodeMarkStep),
    RemoveNodeMark(RemoveNodeMarkStep),
    Attr(AttrStep),
}

impl ReplaceStep {
    pub fn new(from: usize, to: usize, slice: Slice) -> Self {
        Self {
            from,
            to,
            slice,
            structure: false,
        }
    }

    pub fn structural(from: usize, to: usize, slice: Slice) -> Self {
        Self {
            structure: true,
            ..Self::new(from, to, slice)
        }
    }
}

impl Step {
    pub fn replace(from: usize, to: usize, slice: Slice) -> Step {
        Step::Replace(ReplaceStep::new(from, to, slice))
    }

    pub fn apply(&self, doc: &Node) -> StepResult<Node> {
        match self {
            Step::Replace(s) => {
                if s.structure && content_between(doc, s.from, s.to)? {
                    return Err(StepError::StructureOverwrite);
                }
                Ok(doc.replace(s.from, s.to, &s.slice)?)
            }
            Step::ReplaceAround(s) => {
                if s.structure
                    && (content_between(doc, s.from, s.gap_from)?
                        || content_between(doc, s.gap_to, s.to)?)
                {
                    return Err(StepError::StructureOverwrite);
                }
                let gap = doc.slice(s.gap_from, s.gap_to)?;
                if gap.open_start > 0 || gap.open_end > 0 {
                    return Err(StepError::GapNotFlat);
                }
                let inserted = s
                    .slice
                    .insert_at(s.insert, &gap.content)
                    .ok_or(StepError::GapDoesNotFit)?;
                Ok(doc.replace(s.from, s.to, &inserted)?)
            }
            Step::AddMark(s) => apply_mark(doc, s.from, s.to, |marks| s.mark.add_to_set(marks)),
            Step::RemoveMark(s) => {
                apply_mark(doc, s.from, s.to, |marks| s.mark.remove_from_set(marks))
            }
            Step::AddNodeMark(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                let updated = node.with_marks(s.mark.add_to_set(node.marks()));
                Ok(doc.replace_node_at(s.pos, updated)?)
            }
            Step::RemoveNodeMark(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                let updated = node.with_marks(s.mark.remove_from_set(node.marks()));
                Ok(doc.replace_node_at(s.pos, updated)?)
            }
            Step::Attr(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                let updated = node.with_attr(&s.attr, s.value.clone());
                Ok(doc.replace_node_at(s.pos, updated)?)
            }
        }
    }

    pub fn get_map(&self) -> StepMap {
        match self {
            Step::Replace(s) => StepMap::single(s.from, s.to - s.from, s.slice.size()),
            Step::ReplaceAround(s) => StepMap::new(vec![
                MapRange {
                    start: s.from,
                    old_size: s.gap_from - s.from,
                    new_size: s.insert,
                },
                MapRange {
                    start: s.gap_to,
                    old_size: s.to - s.gap_to,
                    new_size: s.slice.size() - s.insert,
                },
            ]),
            _ => StepMap::empty(),
        }
    }

    /// The step that undoes this one, given the document it was applied to.
    pub fn invert(&self, doc: &Node) -> StepResult<Step> {
        Ok(match self {
            Step::Replace(s) => Step::Replace(ReplaceStep {
                from: s.from,
                to: s.from + s.slice.size(),
                slice: doc.slice(s.from, s.to)?,
                structure: false,
            }),
            Step::ReplaceAround(s) => {
                let gap = s.gap_to - s.gap_from;
                Step::ReplaceAround(ReplaceAroundStep {
                    from: s.from,
                    to: s.from + s.slice.size() + gap,
                    gap_from: s.from + s.insert,
                    gap_to: s.from + s.insert + gap,
                    slice: doc
                        .slice(s.from, s.to)?
                        .remove_between(s.gap_from - s.from, s.gap_to - s.from)?,
                    insert: s.gap_from - s.from,
                    structure: s.structure,
                })
            }
            Step::AddMark(s) => Step::RemoveMark(RemoveMarkStep {
                from: s.from,
                to: s.to,
                mark: s.mark.clone(),
            }),
            Step::RemoveMark(s) => Step::AddMark(AddMarkStep {
                from: s.from,
                to: s.to,
                mark: s.mark.clone(),
            }),
            Step::AddNodeMark(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                match redline_document::mark::find_mark(node.marks(), s.mark.kind) {
                    Some(existing) => Step::AddNodeMark(AddNodeMarkStep {
                        pos: s.pos,
                        mark: existing.clone(),
                    }),
                    None => Step::RemoveNodeMark(RemoveNodeMarkStep {
                        pos: s.pos,
                        mark: s.mark.clone(),
                    }),
                }
            }
            Step::RemoveNodeMark(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                if s.mark.is_in_set(node.marks()) {
                    Step::AddNodeMark(AddNodeMarkStep {
                        pos: s.pos,
                        mark: s.mark.clone(),
                    })
                } else {
                    self.clone()
                }
            }
            Step::Attr(s) => {
                let node = doc.node_at(s.pos).ok_or(StepError::NoNodeAt(s.pos))?;
                Step::Attr(AttrStep {
                    pos: s.pos,
                    attr: s.attr.clone(),
                    value: node.attr(&s.attr).cloned().unwrap_or(Value::Null),
                })
            }
        })
    }

    /// Rebase this step over `mapping`. `None` when its range was deleted.
    pub fn map(&self, mapping: &Mapping) -> Option<Step> {
        match self {
            Step::Replace(s) => {
                let from = mapping.map_result(s.from, 1);
                let to = mapping.map_result(s.to, -1);
                if from.deleted_across() && to.deleted_across() {
                    return None;
                }
                Some(Step::Replace(ReplaceStep {
                    from: from.pos,
                    to: from.pos.max(to.pos),
                    slice: s.slice.clone(),
                    structure: s.structure,
                }))
            }
            Step::ReplaceAround(s) => {
                let from = mapping.map_result(s.from, 1);
                let to = mapping.map_result(s.to, -1);
                let gap_from = if s.from == s.gap_from {
                    from.pos
                } else {
                    mapping.map(s.gap_from, -1)
                };
                let gap_to = if s.to == s.gap_to {
                    to.pos
                } else {
                    mapping.map(s.gap_to, 1)
                };
                if (from.deleted_across() && to.deleted_across())
                    || gap_from < from.pos
                    || gap_to > to.pos
                {
                    return None;
                }
                Some(Step::ReplaceAround(ReplaceAroundStep {
                    from: from.pos,
                    to: to.pos,
                    gap_from,
                    gap_to,
                    slice: s.slice.clone(),
                    insert: s.insert,
                    structure: s.structure,
                }))
            }
            Step::AddMark(s) => map_mark_range(mapping, s.from, s.to).map(|(from, to)| {
                Step::AddMark(AddMarkStep {
                    from,
                    to,
                    mark: s.mark.clone(),
                })
            }),
            Step::RemoveMark(s) => map_mark_range(mapping, s.from, s.to).map(|(from, to)| {
                Step::RemoveMark(RemoveMarkStep {
                    from,
                    to,
                    mark: s.mark.clone(),
                })
            }),
            Step::AddNodeMark(s) => map_node_pos(mapping, s.pos).map(|pos| {
                Step::AddNodeMark(AddNodeMarkStep {
                    pos,
                    mark: s.mark.clone(),
                })
            }),
            Step::RemoveNodeMark(s) => map_node_pos(mapping, s.pos).map(|pos| {
                Step::RemoveNodeMark(RemoveNodeMarkStep {
                    pos,
                    mark: s.mark.clone(),
                })
            }),
            Step::Attr(s) => map_node_pos(mapping, s.pos).map(|pos| {
                Step::Attr(AttrStep {
                    pos,
                    attr: s.attr.clone(),
                    value: s.value.clone(),
                })
            }),
        }
    }

    /// Start of the range this step touches.
    pub fn from(&self) -> usize {
        match self {
            Step::Replace(s) => s.from,
            Step::ReplaceAround(s) => s.from,
            Step::AddMark(s) => s.from,
            Step::RemoveMark(s) => s.from,
            Step::AddNodeMark(s) => s.pos,
            Step::RemoveNodeMark(s) => s.pos,
            Step::Attr(s) => s.pos,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Replace(_) => "replace",
            Step::ReplaceAround(_) => "replaceAround",
            Step::AddMark(_) => "addMark",
            Step::RemoveMark(_) => "removeMark",
            Step::AddNodeMark(_) => "addNodeMark",
            Step::RemoveNodeMark(_) => "removeNodeMark",
            Step::Attr(_) => "attr",
        }
    }
}

fn map_mark_range(mapping: &Mapping, from: usize, to: usize) -> Option<(usize, usize)> {
    let from = mapping.map_result(from, 1);
    let to = mapping.map_result(to, -1);
    if (from.deleted() && to.deleted()) || from.pos >= to.pos {
        return None;
    }
    Some((from.pos, to.pos))
}

fn map_node_pos(mapping: &Mapping, pos: usize) -> Option<usize> {
    let result = mapping.map_result(pos, 1);
    if result.deleted_after() {
        None
    } else {
        Some(result.pos)
    }
}

/// Whether `[from, to)` contains anything besides node boundaries.
pub fn content_between(doc: &Node, from: usize, to: usize) -> StepResult<bool> {
    let rfrom = doc.resolve(from)?;
    let mut dist = to.saturating_sub(from);
    let mut depth = rfrom.depth;
    while dist > 0 && depth > 0 && rfrom.index_after(depth) == rfrom.node(depth).child_count() {
        depth -= 1;
        dist -= 1;
    }
    if dist > 0 {
        let mut next = rfrom.node(depth).maybe_child(rfrom.index_after(depth));
        while dist > 0 {
            match next {
                Some(node) if !node.is_leaf() => {
                    next = node.first_child();
                    dist -= 1;
                }
                _ => return Ok(true),
            }
        }
    }
    Ok(false)
}

fn apply_mark<F>(doc: &Node, from: usize, to: usize, update: F) -> StepResult<Node>
where
    F: Fn(&[Mark]) -> Vec<Mark>,
{
    let old = doc.slice(from, to)?;
    let rfrom = doc.resolve(from)?;
    let parent = rfrom.node(rfrom.shared_depth(to)).clone();
    let content = map_inline(&old.content, &parent, &update);
    let slice = Slice::new(content, old.open_start, old.open_end);
    Ok(doc.replace(from, to, &slice)?)
}

fn map_inline<F>(fragment: &Fragment, parent: &Node, update: &F) -> Fragment
where
    F: Fn(&[Mark]) -> Vec<Mark>,
{
    fragment.map_children(|child| {
        let mut child = child.clone();
        if child.content().size() > 0 {
            let inner = map_inline(child.content(), &child, update);
            child = child.copy(inner);
        }
        if child.is_inline() && child.is_leaf() && parent.kind().allows_marks() {
            child = child.with_marks(update(child.marks()));
        }
        child
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use redline_document::builders::*;
    use redline_document::MarkKind;

    #[test]
    fn test_replace_step_invert_restores() {
        let d = doc(vec![p("hello"), p("world")]);
        let step = Step::replace(3, 9, Slice::empty());
        let applied = step.apply(&d).unwrap();
        assert_eq!(applied, doc(vec![p("heorld")]));
        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.apply(&applied).unwrap(), d);
    }

    #[test]
    fn test_structure_step_refuses_to_overwrite_content() {
        let d = doc(vec![p("ab"), p("cd")]);
        let step = Step::Replace(ReplaceStep::structural(2, 6, Slice::empty()));
        assert_eq!(step.apply(&d), Err(StepError::StructureOverwrite));
        let join = Step::Replace(ReplaceStep::structural(3, 5, Slice::empty()));
        assert_eq!(join.apply(&d).unwrap(), doc(vec![p("abcd")]));
    }

    #[test]
    fn test_add_mark_and_invert() {
        let d = doc(vec![p("abcd")]);
        let step = Step::AddMark(AddMarkStep {
            from: 2,
            to: 4,
            mark: Mark::new(MarkKind::Bold),
        });
        let applied = step.apply(&d).unwrap();
        assert_eq!(
            applied,
            doc(vec![p_with(vec![
                text("a"),
                marked("bc", &[MarkKind::Bold]),
                text("d")
            ])])
        );
        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.apply(&applied).unwrap(), d);
    }

    #[test]
    fn test_attr_step_invert_restores_missing_attr() {
        let d = doc(vec![p("ab")]);
        let step = Step::Attr(AttrStep {
            pos: 0,
            attr: "id".into(),
            value: serde_json::json!("p1"),
        });
        let applied = step.apply(&d).unwrap();
        assert_eq!(applied.child(0).attr("id").unwrap(), "p1");
        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.apply(&applied).unwrap(), d);
    }

    #[test]
    fn test_replace_step_maps_through_insertion() {
        let step = Step::replace(4, 6, Slice::empty());
        let mapping = Mapping::from_maps(vec![StepMap::single(1, 0, 3)]);
        let mapped = step.map(&mapping).unwrap();
        assert_eq!(mapped.from(), 7);
    }

    #[test]
    fn test_step_serializes_with_type_tag() {
        let step = Step::replace(1, 2, Slice::empty());
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["stepType"], "replace");
        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }
}
