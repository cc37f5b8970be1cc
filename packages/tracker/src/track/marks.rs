use super::HostStep;
use crate::annotation::{
    annotated_mark, inside_own_insert, is_own_insert, mark_annotation, Operation, TrackedAttrs,
};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::store::node_at;
use redline_document::mark::find_mark;
use redline_document::{Mark, MarkKind, Node};
use redline_transform::{
    AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep, Transform,
};
use tracing::trace;

/// Whether a mark's annotation records a pending removal.
fn is_pending_removal(mark: &Mark) -> bool {
    mark_annotation(mark)
        .map(|a| a.is_operation(Operation::Delete) && a.is_pending())
        .unwrap_or(false)
}

/// Inline ranges of `[from, to)` in `doc` accepted by `keep`, merged where
/// they touch.
fn inline_ranges<F>(doc: &Node, from: usize, to: usize, mut keep: F) -> Vec<(usize, usize)>
where
    F: FnMut(&Node, usize) -> bool,
{
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    doc.nodes_between(
        from,
        to,
        &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
            if !node.is_inline() {
                return true;
            }
            let start = pos.max(from);
            let end = (pos + node.node_size()).min(to);
            if start >= end || !keep(node, start) {
                return false;
            }
            match ranges.last_mut() {
                Some(last) if last.1 == start => last.1 = end,
                _ => ranges.push((start, end)),
            }
            false
        },
    );
    ranges
}

fn has_kind_between(doc: &Node, from: usize, to: usize, kind: MarkKind) -> bool {
    let mut found = false;
    doc.nodes_between(
        from,
        to,
        &mut |node: &Node, _pos: usize, _parent: Option<&Node>, _index: usize| {
            found = found || find_mark(node.marks(), kind).is_some();
            !found
        },
    );
    found
}

/// An added formatting mark becomes a pending mark insertion, except on
/// the author's own unreviewed text and where it restores a mark whose
/// removal is still pending.
pub(super) fn track_add_mark(
    tr: &mut Transform,
    host: &HostStep,
    step: &AddMarkStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let author = ctx.author_id.clone();
    // Marks as they were before this run of mark steps started.
    let original = &host.host.docs()[host.mark_run_start()];
    let ranges = inline_ranges(original, step.from, step.to, |node, start| {
        let existing = find_mark(node.marks(), step.mark.kind);
        let restores = existing.map(is_pending_removal).unwrap_or(false);
        let unchanged = existing == Some(&step.mark);
        !(restores
            || unchanged
            || is_own_insert(node, &author)
            || inside_own_insert(original, start, &author))
    });
    if ranges.is_empty() {
        return Ok(());
    }
    let mark = annotated_mark(&step.mark, &TrackedAttrs::new(ctx, Operation::Insert));
    let mapping = host.mapping_after(tr);
    for (from, to) in ranges {
        let from = mapping.map(from, 1);
        let to = mapping.map(to, -1);
        if from < to {
            tr.add_mark(from, to, mark.clone())?;
        }
    }
    Ok(())
}

/// A removed formatting mark is put back as a pending mark removal.
pub(super) fn track_remove_mark(
    tr: &mut Transform,
    host: &HostStep,
    step: &RemoveMarkStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let author = ctx.author_id.clone();
    let settled = mark_annotation(&step.mark)
        .map(|a| {
            (a.is_operation(Operation::Delete) && a.is_pending())
                || a.is_own_pending(&author, Operation::Insert)
        })
        .unwrap_or(false);
    if settled {
        trace!(kind = step.mark.kind.name(), "mark removal needs no tracking");
        return Ok(());
    }
    let before = host.before();
    let ranges = inline_ranges(before, step.from, step.to, |node, start| {
        step.mark.is_in_set(node.marks())
            && !is_own_insert(node, &author)
            && !inside_own_insert(before, start, &author)
    });
    if ranges.is_empty() {
        return Ok(());
    }
    let mark = annotated_mark(&step.mark, &TrackedAttrs::new(ctx, Operation::Delete));
    let mapping = host.mapping_after(tr);
    for (from, to) in ranges {
        let from = mapping.map(from, 1);
        let to = mapping.map(to, -1);
        // A same-kind mark still there replaced the removed one.
        if from >= to || has_kind_between(tr.doc(), from, to, step.mark.kind) {
            continue;
        }
        tr.add_mark(from, to, mark.clone())?;
    }
    Ok(())
}

pub(super) fn track_add_node_mark(
    tr: &mut Transform,
    host: &HostStep,
    step: &AddNodeMarkStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let node = host
        .before()
        .node_at(step.pos)
        .ok_or(TrackError::NoNodeAt(step.pos))?;
    if is_own_insert(node, &ctx.author_id) {
        return Ok(());
    }
    let original = host.host.docs()[host.mark_run_start()]
        .node_at(step.pos)
        .and_then(|n| find_mark(n.marks(), step.mark.kind).cloned());
    if let Some(existing) = original {
        if is_pending_removal(&existing) || existing == step.mark {
            return Ok(());
        }
    }
    let mapped = host.mapping_after(tr).map_result(step.pos, 1);
    if mapped.deleted_after() {
        return Ok(());
    }
    let mark = annotated_mark(&step.mark, &TrackedAttrs::new(ctx, Operation::Insert));
    tr.add_node_mark(mapped.pos, mark)?;
    Ok(())
}

pub(super) fn track_remove_node_mark(
    tr: &mut Transform,
    host: &HostStep,
    step: &RemoveNodeMarkStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let node = host
        .before()
        .node_at(step.pos)
        .ok_or(TrackError::NoNodeAt(step.pos))?;
    let settled = mark_annotation(&step.mark)
        .map(|a| is_pending_removal(&step.mark) || a.is_own_pending(&ctx.author_id, Operation::Insert))
        .unwrap_or(false);
    if settled || is_own_insert(node, &ctx.author_id) {
        return Ok(());
    }
    let mapped = host.mapping_after(tr).map_result(step.pos, 1);
    if mapped.deleted_after() {
        return Ok(());
    }
    let current = node_at(tr, mapped.pos)?;
    if find_mark(current.marks(), step.mark.kind).is_some() {
        return Ok(());
    }
    let mark = annotated_mark(&step.mark, &TrackedAttrs::new(ctx, Operation::Delete));
    tr.add_node_mark(mapped.pos, mark)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::annotation::{mark_annotation, Operation};
    use crate::config::TrackConfig;
    use crate::context::TrackContext;
    use crate::track::track;
    use redline_document::builders::*;
    use redline_document::mark::find_mark;
    use redline_document::{Mark, MarkKind, TRACKED_ATTR};
    use redline_transform::Transform;

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "k", 10)
    }

    #[test]
    fn test_added_mark_is_annotated() {
        let mut ctx = ctx();
        let mut tr = Transform::new(doc(vec![p("abc")]));
        tr.add_mark(1, 4, Mark::new(MarkKind::Bold)).unwrap();
        let tracked = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
        let run = tracked.doc().child(0).child(0);
        let bold = find_mark(run.marks(), MarkKind::Bold).unwrap();
        assert!(mark_annotation(bold).unwrap().is_operation(Operation::Insert));
    }

    #[test]
    fn test_removed_mark_stays_as_pending_removal() {
        let mut ctx = ctx();
        let mut tr = Transform::new(doc(vec![p_with(vec![marked("abc", &[MarkKind::Bold])])]));
        tr.remove_mark(1, 4, MarkKind::Bold).unwrap();
        let tracked = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
        let run = tracked.doc().child(0).child(0);
        let bold = find_mark(run.marks(), MarkKind::Bold).unwrap();
        assert!(mark_annotation(bold).unwrap().is_operation(Operation::Delete));
    }

    #[test]
    fn test_re_adding_removed_mark_restores_it() {
        let mut ctx = ctx();
        let config = TrackConfig::new("alice");
        let mut tr = Transform::new(doc(vec![p_with(vec![marked("abc", &[MarkKind::Bold])])]));
        tr.remove_mark(1, 4, MarkKind::Bold).unwrap();
        let removed = track(&tr, &config, &mut ctx).unwrap();

        let mut tr = Transform::new(removed.doc().clone());
        tr.add_mark(1, 4, Mark::new(MarkKind::Bold)).unwrap();
        let restored = track(&tr, &config, &mut ctx).unwrap();
        let run = restored.doc().child(0).child(0);
        let bold = find_mark(run.marks(), MarkKind::Bold).unwrap();
        assert!(bold.attr(TRACKED_ATTR).is_none());
    }

    #[test]
    fn test_marking_own_insert_stays_plain() {
        let mut ctx = ctx();
        let config = TrackConfig::new("alice");
        let mut tr = Transform::new(doc(vec![p("ab")]));
        tr.insert_text(3, "cd").unwrap();
        let typed = track(&tr, &config, &mut ctx).unwrap();

        let mut tr = Transform::new(typed.doc().clone());
        tr.add_mark(3, 5, Mark::new(MarkKind::Italic)).unwrap();
        let tracked = track(&tr, &config, &mut ctx).unwrap();
        let run = tracked.doc().child(0).child(1);
        let italic = find_mark(run.marks(), MarkKind::Italic).unwrap();
        assert!(italic.attr(TRACKED_ATTR).is_none());
    }
}
