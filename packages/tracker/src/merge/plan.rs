use super::tag::tag_fragment;
use super::ChangeStep;
use crate::annotation::{
    inside_own_insert, is_own_insert, is_pending_delete, text_annotation, Operation, TrackedAttrs,
};
use crate::context::TrackContext;
use crate::error::TrackResult;
use redline_document::{Fragment, MarkKind, Node, NodeKind, ResolvedPos, Slice};
use tracing::trace;

/// Pending deletion by `author` on a text neighbour, to continue its run.
fn neighbour_annotation(node: Option<Node>, kind: MarkKind, author: &str) -> Option<TrackedAttrs> {
    let node = node?;
    if !node.is_text() {
        return None;
    }
    let operation = match kind {
        MarkKind::TrackedInsert => Operation::Insert,
        _ => Operation::Delete,
    };
    text_annotation(&node, kind).filter(|a| a.is_own_pending(author, operation))
}

/// Plan the deletion of `[from, to)` in `doc`.
///
/// Text is tagged over exactly the overlapped characters. A node wholly
/// inside the range is tagged at its top only, leaving its children intact.
/// Nodes only partially covered (one of their boundary tokens is in the
/// range) are descended into and never deleted, so no join happens. When
/// `move_id` is set, whole-node deletions are the origin of that move.
pub(crate) fn plan_deletion(
    doc: &Node,
    from: usize,
    to: usize,
    move_id: Option<&str>,
    ctx: &mut TrackContext,
    steps: &mut Vec<ChangeStep>,
) {
    if from >= to {
        return;
    }
    let author = ctx.author_id.clone();
    let mut last_run: Option<(usize, TrackedAttrs)> = None;

    doc.nodes_between(
        from,
        to,
        &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
            if node.kind() == NodeKind::ShadowHistory {
                return false;
            }
            let end = pos + node.node_size();

            if node.is_text() {
                let start = pos.max(from);
                let stop = end.min(to);
                if start >= stop || is_pending_delete(node) {
                    return false;
                }
                if is_own_insert(node, &author) || inside_own_insert(doc, start, &author) {
                    steps.push(ChangeStep::DeleteText {
                        from: start,
                        to: stop,
                        attrs: None,
                    });
                    return false;
                }
                let attrs = match &last_run {
                    Some((last_end, attrs)) if *last_end == start => attrs.clone(),
                    _ => {
                        let before = doc.resolve(start).ok().and_then(|r| r.node_before());
                        let after = doc.resolve(stop).ok().and_then(|r| r.node_after());
                        neighbour_annotation(before, MarkKind::TrackedDelete, &author)
                            .or_else(|| neighbour_annotation(after, MarkKind::TrackedDelete, &author))
                            .unwrap_or_else(|| TrackedAttrs::new(ctx, Operation::Delete))
                    }
                };
                last_run = Some((stop, attrs.clone()));
                steps.push(ChangeStep::DeleteText {
                    from: start,
                    to: stop,
                    attrs: Some(attrs),
                });
                return false;
            }

            // Whole-node deletion wins over boundary handling when a node
            // is fully covered.
            if pos >= from && end <= to {
                if is_own_insert(node, &author) || inside_own_insert(doc, pos, &author) {
                    steps.push(ChangeStep::DeleteNode {
                        pos,
                        size: node.node_size(),
                        attrs: None,
                    });
                } else if !is_pending_delete(node) {
                    let mut attrs = TrackedAttrs::new(ctx, Operation::Delete);
                    attrs.move_node_id = move_id.map(str::to_string);
                    steps.push(ChangeStep::DeleteNode {
                        pos,
                        size: node.node_size(),
                        attrs: Some(attrs),
                    });
                }
                return false;
            }
            true
        },
    );
    trace!(from, to, steps = steps.len(), "planned deletion");
}

/// Reduce a slice that is a single chain of open nodes to its inner content,
/// e.g. `<p>x</p>` open on both sides becomes the text `x`.
fn flatten(slice: &Slice) -> Slice {
    let mut content = slice.content.clone();
    let mut open_start = slice.open_start;
    let mut open_end = slice.open_end;
    while open_start > 0 && open_end > 0 && content.child_count() == 1 {
        let Some(only) = content.first_child() else {
            break;
        };
        if only.is_leaf() {
            break;
        }
        content = only.content().clone();
        open_start -= 1;
        open_end -= 1;
    }
    Slice::new(content, open_start, open_end)
}

/// Where closed `content` can go at or around `pos`: `pos` itself when its
/// parent accepts the content, otherwise before or after the nearest
/// ancestor whose parent does.
pub(crate) fn find_insert_point(doc: &Node, pos: usize, content: &Fragment) -> usize {
    let Some(first) = content.first_child() else {
        return pos;
    };
    let Ok(rpos) = doc.resolve(pos) else {
        return pos;
    };
    for depth in (0..=rpos.depth).rev() {
        if !rpos.node(depth).kind().allows(first.kind()) {
            continue;
        }
        if depth == rpos.depth {
            return pos;
        }
        return if pos == rpos.start(depth + 1) {
            rpos.before(depth + 1)
        } else {
            rpos.after(depth + 1)
        };
    }
    pos
}

fn text_neighbour(doc: &Node, pos: usize, author: &str) -> Option<TrackedAttrs> {
    let rpos = doc.resolve(pos).ok()?;
    neighbour_annotation(rpos.node_before(), MarkKind::TrackedInsert, author)
        .or_else(|| neighbour_annotation(rpos.node_after(), MarkKind::TrackedInsert, author))
}

/// The open nodes along one edge of `slice`, outermost first.
fn open_edge(slice: &Slice, open: usize, at_start: bool) -> Option<Vec<Node>> {
    let mut chain = Vec::with_capacity(open);
    let mut content = slice.content.clone();
    for _ in 0..open {
        let node = if at_start {
            content.first_child()
        } else {
            content.last_child()
        }?
        .clone();
        content = node.content().clone();
        chain.push(node);
    }
    Some(chain)
}

/// An open slice that joins the nodes around `from` to the nodes around
/// `to`, one open level at a time.
struct Crossing {
    from: ResolvedPos,
    to: ResolvedPos,
    /// Depth of the ancestor shared by `from` and `to` that holds the
    /// slice's top-level content.
    depth: usize,
    left: Vec<Node>,
    right: Vec<Node>,
}

/// Whether `slice` continues the nodes at `from` on its left edge and the
/// nodes at `to` on its right edge, where the two sides have no parent in
/// common below the slice's own level.
fn crossing(rfrom: &ResolvedPos, rto: &ResolvedPos, slice: &Slice) -> Option<Crossing> {
    let (open_start, open_end) = (slice.open_start, slice.open_end);
    if open_start == 0 || open_end == 0 || slice.content.child_count() < 2 {
        return None;
    }
    if open_start > rfrom.depth || open_end > rto.depth || rfrom.same_parent(rto) {
        return None;
    }
    let depth = rfrom.depth - open_start;
    if rto.depth - open_end != depth || rfrom.shared_depth(rto.pos) != depth {
        return None;
    }
    let left = open_edge(slice, open_start, true)?;
    let right = open_edge(slice, open_end, false)?;
    let fits = |rpos: &ResolvedPos, edge: &[Node]| {
        edge.iter()
            .enumerate()
            .all(|(level, node)| rpos.node(depth + level + 1).kind().compatible_content(node.kind()))
    };
    (fits(rfrom, &left) && fits(rto, &right)).then(|| Crossing {
        from: rfrom.clone(),
        to: rto.clone(),
        depth,
        left,
        right,
    })
}

fn insert_closed(steps: &mut Vec<ChangeStep>, pos: usize, content: Fragment) {
    if content.child_count() > 0 {
        steps.push(ChangeStep::InsertSlice {
            pos,
            slice: Slice::closed(content),
            split: None,
        });
    }
}

/// Merge a crossing slice piecewise into the nodes it continues. The
/// innermost open node on each edge gives up its content to the node at
/// `from` (or `to`); the closed siblings at every other level are inserted
/// next to the matching ancestor; the closed top-level middle goes after
/// the left edge. Steps are emitted in position order.
fn plan_crossing(
    doc: &Node,
    slice: &Slice,
    crossing: &Crossing,
    move_id: Option<&str>,
    ctx: &mut TrackContext,
    steps: &mut Vec<ChangeStep>,
) {
    let author = ctx.author_id.clone();
    let (rfrom, rto, depth) = (&crossing.from, &crossing.to, crossing.depth);
    let inner = crossing.left.len() - 1;
    for (level, node) in crossing.left.iter().enumerate().rev() {
        if level == inner {
            let neighbour = text_neighbour(doc, rfrom.pos, &author);
            let content = tag_fragment(node.content(), 0, 0, None, neighbour, ctx);
            if content.size() > 0 {
                steps.push(ChangeStep::MergeFragment { pos: rfrom.pos, content });
            }
            continue;
        }
        let rest = node.content().cut_by_index(1, node.child_count());
        let rest = tag_fragment(&rest, 0, 0, move_id, None, ctx);
        insert_closed(steps, rfrom.after(depth + level + 2), rest);
    }

    let count = slice.content.child_count();
    let middle = tag_fragment(&slice.content.cut_by_index(1, count - 1), 0, 0, move_id, None, ctx);
    insert_closed(steps, rfrom.after(depth + 1), middle);

    let inner = crossing.right.len() - 1;
    for (level, node) in crossing.right.iter().enumerate() {
        if level == inner {
            let neighbour = text_neighbour(doc, rto.pos, &author);
            let content = tag_fragment(node.content(), 0, 0, None, neighbour, ctx);
            if content.size() > 0 {
                steps.push(ChangeStep::MergeFragment { pos: rto.pos, content });
            }
            continue;
        }
        let rest = node.content().cut_by_index(0, node.child_count().saturating_sub(1));
        let rest = tag_fragment(&rest, 0, 0, move_id, None, ctx);
        insert_closed(steps, rto.before(depth + level + 2), rest);
    }
}

/// Plan the insertion of `slice`, which replaced `[from, to)`, at `from`.
///
/// Positions refer to `doc`, the document with the deleted content still in
/// place. Open slices crossing from one block into another are merged
/// piecewise into both sides at every open level; open slices inside one
/// block split it; anything else is closed and inserted whole at the
/// nearest valid point.
pub(crate) fn plan_insertion(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Slice,
    move_id: Option<&str>,
    ctx: &mut TrackContext,
    steps: &mut Vec<ChangeStep>,
) -> TrackResult<()> {
    if slice.content.size() == 0 {
        return Ok(());
    }
    let author = ctx.author_id.clone();
    let slice = flatten(slice);

    if slice.open_start == 0 && slice.open_end == 0 {
        let neighbour = text_neighbour(doc, from, &author);
        let content = tag_fragment(&slice.content, 0, 0, move_id, neighbour, ctx);
        let pos = find_insert_point(doc, from, &content);
        steps.push(ChangeStep::InsertSlice {
            pos,
            slice: Slice::closed(content),
            split: None,
        });
        return Ok(());
    }

    let rfrom = doc.resolve(from)?;
    let rto = doc.resolve(to)?;

    if let Some(crossing) = crossing(&rfrom, &rto, &slice) {
        plan_crossing(doc, &slice, &crossing, move_id, ctx, steps);
        return Ok(());
    }

    if slice.open_start == slice.open_end
        && slice.open_start <= rfrom.depth
        && rfrom.same_parent(&rto)
    {
        let content = tag_fragment(
            &slice.content,
            slice.open_start,
            slice.open_end,
            move_id,
            None,
            ctx,
        );
        steps.push(ChangeStep::InsertSlice {
            pos: from,
            slice: Slice::new(content, slice.open_start, slice.open_end),
            split: Some(ctx.new_id()),
        });
        return Ok(());
    }

    let content = tag_fragment(&slice.content, 0, 0, move_id, None, ctx);
    let pos = find_insert_point(doc, from, &content);
    steps.push(ChangeStep::InsertSlice {
        pos,
        slice: Slice::closed(content),
        split: None,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{tracking_mark, with_node_annotations};
    use redline_document::builders::*;

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "t", 5)
    }

    #[test]
    fn test_partial_block_overlap_only_tags_text() {
        let d = doc(vec![p("old"), p("bye")]);
        let mut steps = Vec::new();
        plan_deletion(&d, 2, 7, None, &mut ctx(), &mut steps);
        assert_eq!(steps.len(), 2);
        match (&steps[0], &steps[1]) {
            (
                ChangeStep::DeleteText {
                    from: 2,
                    to: 4,
                    attrs: Some(a),
                },
                ChangeStep::DeleteText {
                    from: 6,
                    to: 7,
                    attrs: Some(b),
                },
            ) => assert_ne!(a.id(), b.id()),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_own_insert_is_removed_physically() {
        let mut ctx = ctx();
        let ins = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let d = doc(vec![p_with(vec![
            text("a"),
            text("bc").with_marks(vec![tracking_mark(MarkKind::TrackedInsert, &ins)]),
        ])]);
        let mut steps = Vec::new();
        plan_deletion(&d, 2, 4, None, &mut ctx, &mut steps);
        assert_eq!(
            steps,
            vec![ChangeStep::DeleteText {
                from: 2,
                to: 4,
                attrs: None
            }]
        );
    }

    #[test]
    fn test_whole_node_tagged_once() {
        let mut ctx = ctx();
        let d = doc(vec![p("a"), blockquote(vec![p("b")]), p("c")]);
        let mut steps = Vec::new();
        plan_deletion(&d, 3, 8, Some("m"), &mut ctx, &mut steps);
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            ChangeStep::DeleteNode {
                pos: 3,
                size: 5,
                attrs: Some(a),
            } => assert_eq!(a.move_node_id(), Some("m")),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    fn node_deletions(steps: &[ChangeStep]) -> Vec<usize> {
        steps
            .iter()
            .filter_map(|step| match step {
                ChangeStep::DeleteNode { pos, .. } => Some(*pos),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_overlap_prefers_whole_node_deletion() {
        let d = doc(vec![
            p("ab"),
            blockquote(vec![p("c")]),
            section(vec![section_title("t"), p("d")]),
        ]);
        let mut pos = 0;
        for block in d.content().iter() {
            let end = pos + block.node_size();

            // Both boundary tokens covered: one deletion of the whole node.
            let mut steps = Vec::new();
            plan_deletion(&d, pos, end, None, &mut ctx(), &mut steps);
            assert_eq!(steps.len(), 1, "block at {}", pos);
            assert!(matches!(
                &steps[0],
                ChangeStep::DeleteNode { pos: at, size, attrs: Some(_) }
                    if *at == pos && *size == block.node_size()
            ));

            // Only one boundary token covered: the node itself survives.
            for (from, to) in [(pos, end - 1), (pos + 1, end)] {
                let mut steps = Vec::new();
                plan_deletion(&d, from, to, None, &mut ctx(), &mut steps);
                assert!(!steps.is_empty());
                assert!(!node_deletions(&steps).contains(&pos), "{}..{}", from, to);
            }
            pos = end;
        }
    }

    #[test]
    fn test_full_overlap_with_open_excerpt_still_deletes_node() {
        let d = doc(vec![p("ab"), p("cd"), p("ef")]);
        let slice = Slice::new(Fragment::from_vec(vec![p("x"), p("y")]), 1, 1);
        let mut steps = Vec::new();
        let mut ctx = ctx();
        plan_deletion(&d, 4, 8, None, &mut ctx, &mut steps);
        plan_insertion(&d, 4, 8, &slice, None, &mut ctx, &mut steps).unwrap();
        assert_eq!(node_deletions(&steps), vec![4]);
        assert!(!steps
            .iter()
            .any(|step| matches!(step, ChangeStep::MergeFragment { .. })));
    }

    #[test]
    fn test_already_deleted_content_is_skipped() {
        let mut ctx = ctx();
        let del = TrackedAttrs::new(&mut ctx, Operation::Delete);
        let d = doc(vec![with_node_annotations(&p("x"), &[del])]);
        let mut steps = Vec::new();
        plan_deletion(&d, 0, 3, None, &mut ctx, &mut steps);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_find_insert_point_for_blocks() {
        let d = doc(vec![p("ab"), p("cd")]);
        let content = Fragment::from_node(p("x"));
        assert_eq!(find_insert_point(&d, 2, &content), 4);
        assert_eq!(find_insert_point(&d, 1, &content), 0);
        assert_eq!(find_insert_point(&d, 4, &content), 4);
        let inline = Fragment::from_node(text("x"));
        assert_eq!(find_insert_point(&d, 2, &inline), 2);
    }

    #[test]
    fn test_open_slice_within_block_splits() {
        let d = doc(vec![p("abcd")]);
        let slice = Slice::new(Fragment::from_vec(vec![p(""), p("")]), 1, 1);
        let mut steps = Vec::new();
        plan_insertion(&d, 3, 3, &slice, None, &mut ctx(), &mut steps).unwrap();
        assert!(matches!(
            &steps[0],
            ChangeStep::InsertSlice {
                pos: 3,
                split: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_open_slice_across_blocks_merges() {
        let d = doc(vec![p("old"), p("bye")]);
        let slice = Slice::new(Fragment::from_vec(vec![p("x"), p("mid"), p("y")]), 1, 1);
        let mut steps = Vec::new();
        plan_insertion(&d, 2, 7, &slice, None, &mut ctx(), &mut steps).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], ChangeStep::MergeFragment { pos: 2, .. }));
        assert!(matches!(&steps[1], ChangeStep::InsertSlice { pos: 5, split: None, .. }));
        assert!(matches!(&steps[2], ChangeStep::MergeFragment { pos: 7, .. }));
    }

    #[test]
    fn test_open_slice_across_sections_merges_at_every_level() {
        let d = doc(vec![
            section(vec![section_title("t1"), p("alpha")]),
            section(vec![section_title("t2"), p("beta")]),
        ]);
        let slice = Slice::new(
            Fragment::from_vec(vec![
                section(vec![p("X")]),
                section(vec![section_title("n"), p("Y")]),
            ]),
            2,
            2,
        );
        let mut steps = Vec::new();
        plan_insertion(&d, 8, 23, &slice, None, &mut ctx(), &mut steps).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], ChangeStep::MergeFragment { pos: 8, .. }));
        match &steps[1] {
            ChangeStep::InsertSlice { pos: 18, slice, split: None } => {
                assert_eq!(slice.content.child(0).kind(), NodeKind::SectionTitle);
            }
            other => panic!("unexpected plan {:?}", other),
        }
        assert!(matches!(&steps[2], ChangeStep::MergeFragment { pos: 23, .. }));
    }

    #[test]
    fn test_single_block_copy_is_flattened_to_text() {
        let d = doc(vec![p("ab")]);
        let slice = Slice::new(Fragment::from_node(p("x")), 1, 1);
        let mut steps = Vec::new();
        plan_insertion(&d, 2, 2, &slice, None, &mut ctx(), &mut steps).unwrap();
        match &steps[0] {
            ChangeStep::InsertSlice { pos: 2, slice, split: None } => {
                assert!(slice.content.child(0).is_text());
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }
}
