use crate::annotation::{
    has_pending_descendants, node_annotations, Operation, Status, WrapDirection,
};
use crate::changes::{AnnotationSource, Change, ChangeKind};
use crate::error::TrackResult;
use crate::merge::set_plain_attrs;
use crate::store::{
    add_node_annotation, drop_mark, reference_holders, references, retain_node_annotations,
    rewrite_annotation, strip_references,
};
use redline_document::{Node, Slice};
use redline_transform::{can_join, ReplaceAroundStep, ReplaceStep, Step, Transform};
use tracing::{debug, trace, warn};

fn rejected(change: &Change) -> bool {
    change.status() == Some(Status::Rejected)
}

/// Where the node of `change` is now, unless it is gone.
fn mapped_node(tr: &Transform, base: usize, change: &Change) -> Option<(usize, Node)> {
    let mapped = tr.mapping().slice(base).map_result(change.from, 1);
    if mapped.deleted_after() {
        trace!(id = %change.id, "node already removed");
        return None;
    }
    let node = tr.doc().node_at(mapped.pos)?.clone();
    Some((mapped.pos, node))
}

fn mapped_range(tr: &Transform, base: usize, change: &Change) -> Option<(usize, usize)> {
    let mapping = tr.mapping().slice(base);
    let from = mapping.map(change.from, 1);
    let to = mapping.map(change.to, -1);
    (from < to).then_some((from, to))
}

/// Drop the node annotation `id`, leaving the node as it is.
fn strip(tr: &mut Transform, pos: usize, id: &str) -> TrackResult<()> {
    rewrite_annotation(tr, AnnotationSource::Node, pos, pos, id, None)
}

/// Replace the node at `pos` by its content.
fn lift(tr: &mut Transform, pos: usize, node: &Node) -> TrackResult<()> {
    let end = pos + node.node_size();
    tr.step(Step::ReplaceAround(ReplaceAroundStep {
        from: pos,
        to: end,
        gap_from: pos + 1,
        gap_to: end - 1,
        slice: Slice::empty(),
        insert: 0,
        structure: true,
    }))?;
    Ok(())
}

/// Take a node out of the document. Content that still carries pending
/// changes survives: it is lifted into the parent when the parent accepts
/// it, or joined into the previous textblock.
fn remove_node(tr: &mut Transform, pos: usize, node: &Node) -> TrackResult<()> {
    let rpos = tr.doc().resolve(pos)?;
    let origins: Vec<_> = node_annotations(node)
        .into_iter()
        .filter(|a| a.is_operation(Operation::Reference))
        .collect();
    // A split origin that disappears hands its role to the parent.
    if rpos.depth > 0 {
        let parent_pos = rpos.before(rpos.depth);
        for reference in origins {
            add_node_annotation(tr, parent_pos, reference)?;
        }
    }

    let end = pos + node.node_size();
    if node.is_leaf() || !has_pending_descendants(node) {
        tr.delete(pos, end)?;
        return Ok(());
    }
    let parent = rpos.parent().kind();
    if node.content().iter().all(|child| parent.allows(child.kind())) {
        debug!(pos, "lifting content with pending changes");
        return lift(tr, pos, node);
    }
    if node.is_textblock() && can_join(tr.doc(), pos) {
        debug!(pos, "joining content with pending changes into previous block");
        tr.step(Step::Replace(ReplaceStep::structural(pos - 1, pos + 1, Slice::empty())))?;
        return Ok(());
    }
    tr.delete(pos, end)?;
    Ok(())
}

pub(super) fn apply_attr(tr: &mut Transform, base: usize, change: &Change) -> TrackResult<()> {
    let Some((pos, _)) = mapped_node(tr, base, change) else {
        return Ok(());
    };
    if rejected(change) {
        if let ChangeKind::NodeAttr { old_attrs, .. } = &change.kind {
            set_plain_attrs(tr, pos, old_attrs)?;
        }
    }
    strip(tr, pos, &change.id)
}

/// Accepting a split keeps both halves. Rejecting it joins the second half
/// back into the node it came from, or moves its content there when the two
/// are no longer adjacent.
pub(super) fn apply_split(tr: &mut Transform, base: usize, change: &Change) -> TrackResult<()> {
    let Some(split) = change.data.move_node_id().map(str::to_string) else {
        return Ok(());
    };
    let Some((pos, node)) = mapped_node(tr, base, change) else {
        return strip_references(tr, &split);
    };
    if !rejected(change) {
        strip(tr, pos, &change.id)?;
        return strip_references(tr, &split);
    }

    let before = tr.doc().resolve(pos)?.node_before();
    if let Some(before) = before.filter(|b| references(b, &split)) {
        if can_join(tr.doc(), pos) {
            let left = pos - before.node_size();
            tr.step(Step::Replace(ReplaceStep::structural(pos - 1, pos + 1, Slice::empty())))?;
            return drop_reference(tr, left, &split);
        }
    }

    let origin = reference_holders(tr.doc(), &split)
        .into_iter()
        .find_map(|at| tr.doc().node_at(at).map(|n| (at, n.kind(), n.node_size())));
    match origin {
        Some((at, kind, size)) if kind.compatible_content(node.kind()) => {
            let content = node.content().clone();
            let mark = tr.steps().len();
            tr.delete(pos, pos + node.node_size())?;
            let target = tr.mapping().slice(mark).map(at + size - 1, -1);
            tr.insert(target, content)?;
            let at = tr.mapping().slice(mark).map(at, -1);
            drop_reference(tr, at, &split)
        }
        _ => {
            warn!(split = %split, "split origin gone, keeping both halves");
            strip(tr, pos, &change.id)?;
            strip_references(tr, &split)
        }
    }
}

fn drop_reference(tr: &mut Transform, pos: usize, split: &str) -> TrackResult<()> {
    retain_node_annotations(tr, pos, |a| {
        !(a.is_operation(Operation::Reference) && a.move_node_id() == Some(split))
    })
}

/// Text, formatting marks and node changes other than splits and
/// structural edits.
pub(super) fn apply_change(tr: &mut Transform, base: usize, change: &Change) -> TrackResult<()> {
    match change.source {
        AnnotationSource::TextMark(kind) => {
            let Some((from, to)) = mapped_range(tr, base, change) else {
                return Ok(());
            };
            let removes = match change.operation() {
                Some(Operation::Insert) => rejected(change),
                Some(Operation::Delete) => !rejected(change),
                _ => false,
            };
            if removes {
                tr.delete(from, to)?;
            } else {
                tr.remove_mark(from, to, kind)?;
            }
            Ok(())
        }
        AnnotationSource::FormatMark(_) => {
            let Some((from, to)) = mapped_range(tr, base, change) else {
                return Ok(());
            };
            apply_mark(tr, change, from, to)
        }
        AnnotationSource::NodeMark(_) => {
            let Some((pos, _)) = mapped_node(tr, base, change) else {
                return Ok(());
            };
            apply_mark(tr, change, pos, pos)
        }
        AnnotationSource::Node => apply_node(tr, base, change),
    }
}

/// An added mark stays on accept and goes on reject; a removed mark goes
/// on accept and stays on reject.
fn apply_mark(tr: &mut Transform, change: &Change, from: usize, to: usize) -> TrackResult<()> {
    let added = change.data.is_operation(Operation::Insert);
    if added == rejected(change) {
        drop_mark(tr, change.source, from, to)
    } else {
        rewrite_annotation(tr, change.source, from, to, &change.id, None)
    }
}

fn apply_node(tr: &mut Transform, base: usize, change: &Change) -> TrackResult<()> {
    let Some((pos, node)) = mapped_node(tr, base, change) else {
        return Ok(());
    };
    let removes = match change.operation() {
        Some(Operation::Insert) | Some(Operation::Move) => rejected(change),
        Some(Operation::Delete) => !rejected(change),
        Some(Operation::WrapWithNode) => {
            let unwraps = match change.data.direction {
                Some(WrapDirection::Unwrap) => !rejected(change),
                _ => rejected(change),
            };
            if unwraps {
                return lift(tr, pos, &node);
            }
            false
        }
        _ => false,
    };
    if removes {
        remove_node(tr, pos, &node)
    } else {
        strip(tr, pos, &change.id)
    }
}
