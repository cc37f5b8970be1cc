use crate::annotation::{
    is_own_insert, mark_annotation, node_annotations, tracking_mark, with_node_annotations,
    Operation, TrackedAttrs,
};
use crate::context::TrackContext;
use redline_document::mark::remove_kind;
use redline_document::{Fragment, Mark, MarkKind, Node, TRACKED_ATTR};
use std::collections::HashMap;

/// Tag content about to be inserted.
///
/// Nodes on an open edge only contribute their content (their markup merges
/// into the surrounding document), so the tagging descends into them.
/// Complete blocks get a node-level `insert` annotation, or a `move`
/// annotation when `move_id` is set; text gets a `tracked_insert` mark shared
/// by all runs under the same parent. `text_attrs` seeds that shared
/// annotation, e.g. with the neighbouring run's so typing coalesces.
pub(crate) fn tag_fragment(
    fragment: &Fragment,
    open_start: usize,
    open_end: usize,
    move_id: Option<&str>,
    text_attrs: Option<TrackedAttrs>,
    ctx: &mut TrackContext,
) -> Fragment {
    let mut group = text_attrs;
    let last = fragment.child_count().saturating_sub(1);
    let mut children = Vec::with_capacity(fragment.child_count());
    for (index, child) in fragment.iter().enumerate() {
        let open_left = index == 0 && open_start > 0;
        let open_right = index == last && open_end > 0;
        if open_left || open_right {
            let inner = tag_fragment(
                child.content(),
                if open_left { open_start - 1 } else { 0 },
                if open_right { open_end - 1 } else { 0 },
                move_id,
                None,
                ctx,
            );
            children.push(child.copy(inner));
        } else {
            children.push(tag_node(child, move_id, &mut group, ctx));
        }
    }
    Fragment::from_vec(children)
}

fn tag_node(
    node: &Node,
    move_id: Option<&str>,
    group: &mut Option<TrackedAttrs>,
    ctx: &mut TrackContext,
) -> Node {
    if node.is_text() {
        let marks = remove_kind(node.marks(), MarkKind::TrackedDelete);
        if is_own_insert(node, &ctx.author_id) {
            return node.with_marks(marks);
        }
        let attrs = match group {
            Some(attrs) => attrs.clone(),
            None => {
                let attrs = TrackedAttrs::new(ctx, Operation::Insert);
                *group = Some(attrs.clone());
                attrs
            }
        };
        let mark = tracking_mark(MarkKind::TrackedInsert, &attrs);
        return node.with_marks(mark.add_to_set(&remove_kind(&marks, MarkKind::TrackedInsert)));
    }

    if let Some(move_id) = move_id {
        let refreshed = refresh_ids(node, ctx);
        let annotation = TrackedAttrs::new(ctx, Operation::Move).with_move_node_id(move_id);
        return with_node_annotations(&refreshed, &[annotation]);
    }
    if is_own_insert(node, &ctx.author_id) {
        return node.clone();
    }
    let refreshed = refresh_ids(node, ctx);
    with_node_annotations(&refreshed, &[TrackedAttrs::new(ctx, Operation::Insert)])
}

/// Give every annotation below `node` a fresh id, keeping runs that shared
/// an id together. Used when content is copied so the copy never collides
/// with the original.
pub(crate) fn refresh_ids(node: &Node, ctx: &mut TrackContext) -> Node {
    let mut renamed = HashMap::new();
    refresh_children(node, ctx, &mut renamed)
}

fn refresh_children(
    node: &Node,
    ctx: &mut TrackContext,
    renamed: &mut HashMap<String, String>,
) -> Node {
    if node.is_text() || node.child_count() == 0 {
        return node.clone();
    }
    let children: Vec<Node> = node
        .content()
        .iter()
        .map(|child| {
            let child = refresh_own(child, ctx, renamed);
            refresh_children(&child, ctx, renamed)
        })
        .collect();
    node.copy(Fragment::from_vec(children))
}

fn fresh(
    attrs: &TrackedAttrs,
    ctx: &mut TrackContext,
    renamed: &mut HashMap<String, String>,
) -> TrackedAttrs {
    let id = renamed
        .entry(attrs.id().to_string())
        .or_insert_with(|| ctx.new_id())
        .clone();
    TrackedAttrs {
        id: Some(id),
        ..attrs.clone()
    }
}

/// `attrs` under a new id, timestamps and everything else kept.
pub(crate) fn fresh_copy(attrs: &TrackedAttrs, ctx: &mut TrackContext) -> TrackedAttrs {
    TrackedAttrs {
        id: Some(ctx.new_id()),
        ..attrs.clone()
    }
}

fn refresh_own(node: &Node, ctx: &mut TrackContext, renamed: &mut HashMap<String, String>) -> Node {
    let marks: Vec<Mark> = node
        .marks()
        .iter()
        .map(|mark| match mark_annotation(mark) {
            Some(attrs) => {
                let mut mark = mark.clone();
                mark.attrs
                    .insert(TRACKED_ATTR.to_string(), fresh(&attrs, ctx, renamed).to_value());
                mark
            }
            None => mark.clone(),
        })
        .collect();
    let node = node.with_marks(marks);
    if node.is_text() {
        return node;
    }
    let annotations = node_annotations(&node);
    if annotations.is_empty() {
        return node;
    }
    let refreshed: Vec<TrackedAttrs> = annotations
        .iter()
        .map(|a| fresh(a, ctx, renamed))
        .collect();
    with_node_annotations(&node, &refreshed)
}
