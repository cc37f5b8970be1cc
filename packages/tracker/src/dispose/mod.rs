//! # Review
//!
//! Accepting or rejecting changes happens in two passes. [`set_status`]
//! writes the decision into the annotations of every change it reaches,
//! then [`apply_changes`] turns each decided change into its final effect
//! on the document: content is removed or kept, attributes restored,
//! wrappers lifted and structural edits restored from their snapshot.
//!
//! A decision reaches more than the ids asked for. Changes linked by a
//! shared move node id (the halves of a move, split, wrap or structural
//! edit) are decided together, as are changes nested in a decided node.

mod content;
mod structure;

use crate::annotation::{Operation, Status};
use crate::changes::{discover, Change, ChangeSet};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::store::rewrite_annotation;
use crate::structure::ShadowHistory;
use redline_document::Node;
use redline_transform::Transform;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Record `status` on the changes `ids` (and everything linked to them) and
/// carry out the decided changes. Returns the transform that does both.
#[instrument(level = "debug", skip(doc, changes, ctx), fields(reviewer = %ctx.author_id))]
pub fn set_status(
    doc: &Node,
    changes: &ChangeSet,
    ids: &[&str],
    status: Status,
    ctx: &TrackContext,
) -> TrackResult<Transform> {
    let history = ShadowHistory::load(doc);
    let targets = expand(changes, &history, ids, status);
    let now = ctx.now();
    let mut tr = Transform::new(doc.clone());
    for change in changes.flatten() {
        if !targets.contains(change.id.as_str()) || change.status() == Some(status) {
            continue;
        }
        let mut data = change.data.clone();
        data.status = Some(status);
        data.status_update_at = Some(if status == Status::Pending { 0 } else { now });
        data.reviewed_by_id = Some(ctx.author_id.clone());
        rewrite_annotation(&mut tr, change.source, change.from, change.to, &change.id, Some(&data))?;
    }
    debug!(requested = ids.len(), decided = targets.len(), "statuses written");
    let decided = discover(tr.doc());
    apply_changes(&decided, &mut tr)?;
    Ok(tr)
}

/// The move node id through which `change` is decided together with others.
fn linked_id(change: &Change) -> Option<&str> {
    match change.operation()? {
        Operation::Move
        | Operation::Delete
        | Operation::Structure
        | Operation::WrapWithNode
        | Operation::NodeSplit => change.data.move_node_id(),
        _ => None,
    }
}

/// Every change id a decision on `ids` reaches.
fn expand<'a>(
    changes: &'a ChangeSet,
    history: &ShadowHistory,
    ids: &[&str],
    status: Status,
) -> HashSet<&'a str> {
    let flat = changes.flatten();
    let mut targets: HashSet<&str> = flat
        .iter()
        .copied()
        .filter(|c| ids.contains(&c.id.as_str()))
        .map(|c| c.id.as_str())
        .collect();
    loop {
        let before = targets.len();
        let mut linked: HashSet<String> = HashSet::new();
        let mut nested: Vec<&str> = Vec::new();
        for change in flat.iter().copied().filter(|c| targets.contains(c.id.as_str())) {
            nested.extend(change.children().iter().map(|c| c.id.as_str()));
            let Some(id) = linked_id(change) else {
                continue;
            };
            linked.insert(id.to_string());
            // Rejecting a structural change undoes every later one built on it.
            if status == Status::Rejected && change.data.is_operation(Operation::Structure) {
                linked.extend(history.descendants(id));
            }
        }
        targets.extend(nested);
        for change in flat.iter().copied() {
            if linked_id(change).map(|id| linked.contains(id)).unwrap_or(false) {
                targets.insert(change.id.as_str());
            }
        }
        if targets.len() == before {
            return targets;
        }
    }
}

/// Carry out every decided change in `changes`, which must describe
/// `tr.doc()`. Pending changes are left alone.
pub fn apply_changes(changes: &ChangeSet, tr: &mut Transform) -> TrackResult<()> {
    let base = tr.steps().len();
    let decided: Vec<&Change> = changes
        .flatten()
        .into_iter()
        .filter(|c| !c.is_pending())
        .collect();
    if decided.is_empty() {
        return Ok(());
    }

    let mut attrs = Vec::new();
    let mut structural = Vec::new();
    let mut splits = Vec::new();
    for change in decided {
        if change.is_node_attr_change() {
            attrs.push(change);
        } else if change.data.is_operation(Operation::Structure) {
            structural.push(change);
        } else if change.data.is_operation(Operation::NodeSplit) {
            splits.push(change);
        }
    }
    splits.sort_by_key(|c| c.from);

    // Attributes first, while every node they point at still exists.
    for change in attrs {
        guarded(tr, change, |tr| content::apply_attr(tr, base, change))?;
    }
    structure::apply_structure(tr, &structural)?;
    for change in splits {
        guarded(tr, change, |tr| content::apply_split(tr, base, change))?;
    }

    // Restored snapshots and relocated split content do not map position
    // for position, so the remaining changes are read off the document as
    // it is now.
    let remaining = discover(tr.doc());
    let base = tr.steps().len();
    let mut rest: Vec<&Change> = remaining
        .flatten()
        .into_iter()
        .filter(|c| !c.is_pending() && is_content_change(c))
        .collect();
    rest.sort_by_key(|c| c.data.updated_at.unwrap_or_default());
    for change in rest {
        guarded(tr, change, |tr| content::apply_change(tr, base, change))?;
    }
    Ok(())
}

/// Decided by [`content::apply_change`] rather than one of the earlier
/// passes.
fn is_content_change(change: &Change) -> bool {
    !change.is_node_attr_change()
        && !change.data.is_operation(Operation::Structure)
        && !change.data.is_operation(Operation::NodeSplit)
}

/// Run `apply` for one change, rolling back and moving on when it fails.
/// A corrupt shadow history still fails the whole review.
fn guarded<F>(tr: &mut Transform, change: &Change, apply: F) -> TrackResult<()>
where
    F: FnOnce(&mut Transform) -> TrackResult<()>,
{
    let checkpoint = tr.clone();
    match apply(tr) {
        Ok(()) => Ok(()),
        Err(err @ TrackError::MissingShadowEntry(_)) => Err(err),
        Err(err) => {
            warn!(id = %change.id, error = %err, "change could not be applied, left in place");
            *tr = checkpoint;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{node_annotations, text_annotation};
    use crate::config::TrackConfig;
    use crate::track::track;
    use pretty_assertions::assert_eq;
    use redline_document::builders::*;
    use redline_document::{Fragment, MarkKind};

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "d", 1_000)
    }

    fn tracked(start: Node, edit: impl FnOnce(&mut Transform)) -> (Node, TrackContext) {
        let mut ctx = ctx();
        let mut tr = Transform::new(start);
        edit(&mut tr);
        let out = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
        (out.doc().clone(), ctx)
    }

    fn decide_all(doc: &Node, status: Status, ctx: &TrackContext) -> Node {
        let changes = discover(doc);
        let ids: Vec<&str> = changes.flatten().into_iter().map(|c| c.id.as_str()).collect();
        set_status(doc, &changes, &ids, status, ctx).unwrap().doc().clone()
    }

    #[test]
    fn test_accept_insert_keeps_plain_text() {
        let (edited, ctx) = tracked(doc(vec![p("abc")]), |tr| {
            tr.insert_text(2, "X").unwrap();
        });
        let accepted = decide_all(&edited, Status::Accepted, &ctx);
        assert_eq!(accepted, doc(vec![p("aXbc")]));
    }

    #[test]
    fn test_reject_insert_removes_text() {
        let (edited, ctx) = tracked(doc(vec![p("abc")]), |tr| {
            tr.insert_text(2, "X").unwrap();
        });
        let rejected = decide_all(&edited, Status::Rejected, &ctx);
        assert_eq!(rejected, doc(vec![p("abc")]));
    }

    #[test]
    fn test_accept_delete_removes_text() {
        let (edited, ctx) = tracked(doc(vec![p("abc")]), |tr| {
            tr.delete(2, 3).unwrap();
        });
        let accepted = decide_all(&edited, Status::Accepted, &ctx);
        assert_eq!(accepted, doc(vec![p("ac")]));
    }

    #[test]
    fn test_reject_block_insert_removes_block() {
        let (edited, ctx) = tracked(doc(vec![p("a")]), |tr| {
            tr.insert(3, Fragment::from_node(p("b"))).unwrap();
        });
        let rejected = decide_all(&edited, Status::Rejected, &ctx);
        assert_eq!(rejected, doc(vec![p("a")]));
    }

    #[test]
    fn test_status_is_recorded_before_applying() {
        let (edited, ctx) = tracked(doc(vec![p("abc")]), |tr| {
            tr.delete(2, 3).unwrap();
        });
        let changes = discover(&edited);
        let id = changes.all()[0].id.clone();
        let tr = set_status(&edited, &changes, &[id.as_str()], Status::Rejected, &ctx).unwrap();
        // The rejected deletion is still marked in the intermediate document.
        let marked = &tr.docs()[2];
        let data = text_annotation(marked.child(0).child(1), MarkKind::TrackedDelete).unwrap();
        assert_eq!(data.status, Some(Status::Rejected));
        assert_eq!(data.reviewed_by_id.as_deref(), Some("alice"));
        assert_eq!(tr.doc(), &doc(vec![p("abc")]));
    }

    #[test]
    fn test_split_halves_are_decided_together() {
        let (edited, ctx) = tracked(doc(vec![p("abcd")]), |tr| {
            tr.split(3, 1).unwrap();
        });
        let changes = discover(&edited);
        assert_eq!(changes.all().len(), 1);
        let id = changes.all()[0].id.clone();
        let rejected = set_status(&edited, &changes, &[id.as_str()], Status::Rejected, &ctx)
            .unwrap()
            .doc()
            .clone();
        assert_eq!(rejected, doc(vec![p("abcd")]));
        assert!(node_annotations(rejected.child(0)).is_empty());
    }

    #[test]
    fn test_unknown_ids_change_nothing() {
        let (edited, ctx) = tracked(doc(vec![p("abc")]), |tr| {
            tr.insert_text(2, "X").unwrap();
        });
        let changes = discover(&edited);
        let tr = set_status(&edited, &changes, &["nope"], Status::Accepted, &ctx).unwrap();
        assert_eq!(tr.doc(), &edited);
    }
}
