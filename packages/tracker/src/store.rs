//! Writing annotations back into a document through transform steps.

use crate::annotation::{
    annotated_mark, annotations_value, node_annotations, plain_mark, tracking_mark, Operation,
    TrackedAttrs,
};
use crate::changes::AnnotationSource;
use crate::error::{TrackError, TrackResult};
use redline_document::mark::find_mark;
use redline_document::{Mark, MarkKind, Node, TRACKED_ATTR};
use redline_transform::Transform;

pub(crate) fn node_at(tr: &Transform, pos: usize) -> TrackResult<Node> {
    tr.doc()
        .node_at(pos)
        .cloned()
        .ok_or(TrackError::NoNodeAt(pos))
}

/// Replace the annotation list of the node at `pos`.
pub(crate) fn set_node_annotations(
    tr: &mut Transform,
    pos: usize,
    annotations: &[TrackedAttrs],
) -> TrackResult<()> {
    tr.set_node_attribute(pos, TRACKED_ATTR, annotations_value(annotations))?;
    Ok(())
}

pub(crate) fn add_node_annotation(
    tr: &mut Transform,
    pos: usize,
    annotation: TrackedAttrs,
) -> TrackResult<()> {
    let mut annotations = node_annotations(&node_at(tr, pos)?);
    annotations.push(annotation);
    set_node_annotations(tr, pos, &annotations)
}

/// Keep only the annotations of the node at `pos` that satisfy `keep`.
pub(crate) fn retain_node_annotations<F>(tr: &mut Transform, pos: usize, keep: F) -> TrackResult<()>
where
    F: Fn(&TrackedAttrs) -> bool,
{
    let annotations = node_annotations(&node_at(tr, pos)?);
    let kept: Vec<TrackedAttrs> = annotations.iter().filter(|a| keep(a)).cloned().collect();
    if kept.len() != annotations.len() {
        set_node_annotations(tr, pos, &kept)?;
    }
    Ok(())
}

/// Whether `node` is the origin of split `id`.
pub(crate) fn references(node: &Node, id: &str) -> bool {
    node_annotations(node)
        .iter()
        .any(|a| a.is_operation(Operation::Reference) && a.move_node_id() == Some(id))
}

/// Positions of the nodes holding a `reference` annotation for `id`.
pub(crate) fn reference_holders(doc: &Node, id: &str) -> Vec<usize> {
    let mut holders = Vec::new();
    doc.descendants(&mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
        if references(node, id) {
            holders.push(pos);
        }
        !node.is_text()
    });
    holders
}

/// Remove every `reference` annotation for `id`.
pub(crate) fn strip_references(tr: &mut Transform, id: &str) -> TrackResult<()> {
    for pos in reference_holders(tr.doc(), id) {
        retain_node_annotations(tr, pos, |a| {
            !(a.is_operation(Operation::Reference) && a.move_node_id() == Some(id))
        })?;
    }
    Ok(())
}

fn first_mark_in(tr: &Transform, from: usize, to: usize, kind: MarkKind) -> Option<Mark> {
    let mut found = None;
    tr.doc().nodes_between(
        from,
        to,
        &mut |node: &Node, _pos: usize, _parent: Option<&Node>, _index: usize| {
            if found.is_none() {
                found = find_mark(node.marks(), kind).cloned();
            }
            found.is_none()
        },
    );
    found
}

/// Replace the annotation `id` stored at a change location with `new`, or
/// drop it when `new` is `None`. Formatting marks keep the mark and lose
/// only the annotation.
pub(crate) fn rewrite_annotation(
    tr: &mut Transform,
    source: AnnotationSource,
    from: usize,
    to: usize,
    id: &str,
    new: Option<&TrackedAttrs>,
) -> TrackResult<()> {
    match source {
        AnnotationSource::TextMark(kind) => {
            tr.remove_mark(from, to, kind)?;
            if let Some(attrs) = new {
                tr.add_mark(from, to, tracking_mark(kind, attrs))?;
            }
        }
        AnnotationSource::FormatMark(kind) => {
            let Some(existing) = first_mark_in(tr, from, to, kind) else {
                return Ok(());
            };
            let replacement = match new {
                Some(attrs) => annotated_mark(&existing, attrs),
                None => plain_mark(&existing),
            };
            tr.remove_mark(from, to, kind)?;
            tr.add_mark(from, to, replacement)?;
        }
        AnnotationSource::Node => {
            let annotations = node_annotations(&node_at(tr, from)?);
            let updated: Vec<TrackedAttrs> = annotations
                .into_iter()
                .filter_map(|a| {
                    if a.id() == id {
                        new.cloned()
                    } else {
                        Some(a)
                    }
                })
                .collect();
            set_node_annotations(tr, from, &updated)?;
        }
        AnnotationSource::NodeMark(kind) => {
            let node = node_at(tr, from)?;
            let Some(existing) = find_mark(node.marks(), kind).cloned() else {
                return Ok(());
            };
            let replacement = match new {
                Some(attrs) => annotated_mark(&existing, attrs),
                None => plain_mark(&existing),
            };
            tr.remove_node_mark(from, existing)?;
            tr.add_node_mark(from, replacement)?;
        }
    }
    Ok(())
}

/// Remove a formatting mark (text range or node mark) outright.
pub(crate) fn drop_mark(
    tr: &mut Transform,
    source: AnnotationSource,
    from: usize,
    to: usize,
) -> TrackResult<()> {
    match source {
        AnnotationSource::FormatMark(kind) => {
            tr.remove_mark(from, to, kind)?;
        }
        AnnotationSource::NodeMark(kind) => {
            let node = node_at(tr, from)?;
            if let Some(existing) = find_mark(node.marks(), kind).cloned() {
                tr.remove_node_mark(from, existing)?;
            }
        }
        AnnotationSource::TextMark(_) | AnnotationSource::Node => {}
    }
    Ok(())
}
