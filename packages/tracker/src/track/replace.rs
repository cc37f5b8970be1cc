use super::HostStep;
use crate::annotation::{node_annotations, Operation};
use crate::context::TrackContext;
use crate::error::TrackResult;
use crate::merge::{apply_change_steps, plan_deletion, plan_insertion};
use crate::store::strip_references;
use redline_document::{Node, Slice};
use redline_transform::{content_between, ReplaceStep, Step, Transform};
use tracing::debug;

pub(super) fn track_replace(
    tr: &mut Transform,
    host: &HostStep,
    step: &ReplaceStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let Some(Step::Replace(inverse)) = host.inverse(tr)? else {
        return Ok(());
    };
    // What the step inserted, as later steps left it.
    let inserted = if inverse.to - inverse.from == step.slice.size() {
        tr.doc().slice(inverse.from, inverse.to)?
    } else {
        step.slice.clone()
    };
    tr.step(Step::Replace(inverse.clone()))?;

    let from = inverse.from;
    let to = from + (step.to - step.from);
    if inserted.size() == 0 && undo_split(tr, from, to, &ctx.author_id)? {
        return Ok(());
    }

    let snapshot = tr.doc().clone();
    let mut steps = Vec::new();
    plan_deletion(&snapshot, from, to, host.moves.origin(host.index), ctx, &mut steps);
    plan_insertion(
        &snapshot,
        from,
        to,
        &inserted,
        host.moves.destination(host.index),
        ctx,
        &mut steps,
    )?;
    debug!(from, to, planned = steps.len(), "tracking replace");
    apply_change_steps(tr, steps, ctx)
}

/// Id of the split that produced the boundary at `mid`, when the author
/// made it and it is still pending.
fn split_at(doc: &Node, mid: usize, author: &str) -> Option<String> {
    let rpos = doc.resolve(mid).ok()?;
    let after = rpos.node_after()?;
    let before = rpos.node_before()?;
    let split = node_annotations(&after)
        .into_iter()
        .find(|a| a.is_own_pending(author, Operation::NodeSplit))?;
    let id = split.move_node_id?;
    node_annotations(&before)
        .iter()
        .any(|a| a.is_operation(Operation::Reference) && a.move_node_id() == Some(id.as_str()))
        .then_some(id)
}

/// Joining a node back into the node it was split from by the same author
/// removes the split outright.
fn undo_split(tr: &mut Transform, from: usize, to: usize, author: &str) -> TrackResult<bool> {
    let gap = to - from;
    if gap == 0 || gap % 2 != 0 || content_between(tr.doc(), from, to)? {
        return Ok(false);
    }
    let Some(id) = split_at(tr.doc(), from + gap / 2, author) else {
        return Ok(false);
    };
    debug!(split = %id, "join undoes split");
    tr.step(Step::Replace(ReplaceStep::structural(from, to, Slice::empty())))?;
    strip_references(tr, &id)?;
    Ok(true)
}
