use super::attrs::track_attr_change;
use super::HostStep;
use crate::annotation::{node_annotations, plain_attrs, Operation, TrackedAttrs, WrapDirection};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::store::add_node_annotation;
use crate::structure::link_structure;
use redline_document::Node;
use redline_transform::{ReplaceAroundStep, Step, Transform};
use tracing::{debug, warn};

/// Action recorded for structural edits without a more specific name.
const RESTRUCTURE: &str = "restructure";

pub(super) fn track_replace_around(
    tr: &mut Transform,
    host: &HostStep,
    step: &ReplaceAroundStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    if let Some(new_node) = markup_change(step) {
        let old_node = host
            .before()
            .node_at(step.from)
            .cloned()
            .ok_or(TrackError::NoNodeAt(step.from))?;
        if old_node.kind() == new_node.kind() {
            let pos = host.mapping_after(tr).map(step.from, 1);
            return track_attr_change(tr, pos, &old_node, &plain_attrs(new_node.attrs()), ctx);
        }
        let action = format!("convert_to_{}", new_node.kind().name());
        return track_structure(tr, host, &action, ctx);
    }
    if let Some(levels) = wrap_levels(step) {
        return track_wrap(tr, host, levels, ctx);
    }
    if let Some(levels) = unwrap_levels(host.before(), step) {
        return track_unwrap(tr, host, levels, ctx);
    }
    track_structure(tr, host, RESTRUCTURE, ctx)
}

/// The replacement node when the step only swaps the markup of one node.
fn markup_change(step: &ReplaceAroundStep) -> Option<&Node> {
    let slice = &step.slice;
    let single = slice.open_start == 0 && slice.open_end == 0 && slice.content.child_count() == 1;
    if step.gap_from == step.from + 1 && step.gap_to + 1 == step.to && step.insert == 1 && single {
        slice.content.first_child()
    } else {
        None
    }
}

/// Number of wrapper levels when the step wraps its range in new nodes.
fn wrap_levels(step: &ReplaceAroundStep) -> Option<usize> {
    let wraps = step.from == step.gap_from
        && step.to == step.gap_to
        && step.insert > 0
        && step.slice.size() == 2 * step.insert;
    wraps.then_some(step.insert)
}

/// Number of wrapper levels when the step removes a chain of nodes around
/// its gap and nothing else.
fn unwrap_levels(doc: &Node, step: &ReplaceAroundStep) -> Option<usize> {
    let levels = step.gap_from.checked_sub(step.from)?;
    if step.slice.size() != 0 || levels == 0 || step.to.checked_sub(step.gap_to)? != levels {
        return None;
    }
    let span = step.to - step.from;
    (0..levels)
        .all(|level| {
            doc.node_at(step.from + level)
                .map(|node| !node.is_text() && node.node_size() == span - 2 * level)
                .unwrap_or(false)
        })
        .then_some(levels)
}

fn wrap_annotation(ctx: &mut TrackContext, direction: WrapDirection, id: &str) -> TrackedAttrs {
    TrackedAttrs::new(ctx, Operation::WrapWithNode)
        .with_direction(direction)
        .with_move_node_id(id)
}

fn track_wrap(
    tr: &mut Transform,
    host: &HostStep,
    levels: usize,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let Some(inverse) = host.inverse(tr)? else {
        return Ok(());
    };
    let id = ctx.new_id();
    debug!(levels, id = %id, "tracking wrap");
    for level in 0..levels {
        let annotation = wrap_annotation(ctx, WrapDirection::Wrap, &id);
        add_node_annotation(tr, inverse.from() + level, annotation)?;
    }
    Ok(())
}

fn track_unwrap(
    tr: &mut Transform,
    host: &HostStep,
    levels: usize,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let wrapper = host.before().node_at(host.step().from()).cloned();
    let own_wrap = wrapper
        .map(|node| {
            node_annotations(&node).iter().any(|a| {
                a.is_own_pending(&ctx.author_id, Operation::WrapWithNode)
                    && a.direction == Some(WrapDirection::Wrap)
            })
        })
        .unwrap_or(false);
    if own_wrap {
        debug!("unwrap cancels a pending wrap");
        return Ok(());
    }

    let Some(inverse) = host.inverse(tr)? else {
        return Ok(());
    };
    let from = inverse.from();
    tr.step(inverse)?;
    let id = ctx.new_id();
    debug!(levels, id = %id, "tracking unwrap");
    for level in 0..levels {
        let annotation = wrap_annotation(ctx, WrapDirection::Unwrap, &id);
        add_node_annotation(tr, from + level, annotation)?;
    }
    Ok(())
}

/// Undo the step to capture the blocks it rearranged, redo it, and link the
/// result as one structural change.
fn track_structure(
    tr: &mut Transform,
    host: &HostStep,
    action: &str,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let Some(inverse) = host.inverse(tr)? else {
        return Ok(());
    };
    let undone = tr.doc().clone();
    tr.step(inverse.clone())?;

    let rfrom = tr.doc().resolve(inverse.from())?;
    let rto = tr.doc().resolve(inverse_end(&inverse))?;
    let region = match rfrom.block_range(&rto) {
        Some(range) => {
            let old = tr.doc().slice(range.start(), range.end())?.content;
            Some((range.start(), range.end(), old))
        }
        None => None,
    };
    let forward = inverse.invert(&undone)?;
    let map = forward.get_map();
    tr.step(forward)?;

    let Some((start, end, old)) = region else {
        warn!(action, "no block range around structural edit, left untracked");
        return Ok(());
    };
    link_structure(tr, map.map(start, -1), map.map(end, 1), &old, action, ctx)
}

fn inverse_end(step: &Step) -> usize {
    match step {
        Step::Replace(s) => s.to,
        Step::ReplaceAround(s) => s.to,
        other => other.from(),
    }
}
