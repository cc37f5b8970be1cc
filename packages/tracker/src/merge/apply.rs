use super::tag::fresh_copy;
use super::ChangeStep;
use crate::annotation::{is_own_insert, node_annotations, tracking_mark, Operation, TrackedAttrs};
use crate::context::TrackContext;
use crate::error::TrackResult;
use crate::store::{add_node_annotation, node_at, set_node_annotations};
use redline_document::{Attrs, MarkKind, Slice, TRACKED_ATTR};
use redline_transform::Transform;
use serde_json::Value;
use tracing::{debug, trace};

/// Apply planned steps to `tr`. Step positions refer to the document as it
/// was before the first of them, so each is mapped through everything
/// applied since.
pub(crate) fn apply_change_steps(
    tr: &mut Transform,
    steps: Vec<ChangeStep>,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let base = tr.steps().len();
    for step in steps {
        let mapping = tr.mapping().slice(base);
        match step {
            ChangeStep::DeleteText { from, to, attrs } => {
                let from = mapping.map(from, 1);
                let to = mapping.map(to, -1);
                if from >= to {
                    continue;
                }
                match attrs {
                    Some(attrs) => {
                        tr.add_mark(from, to, tracking_mark(MarkKind::TrackedDelete, &attrs))?;
                    }
                    None => {
                        tr.delete(from, to)?;
                    }
                }
            }
            ChangeStep::DeleteNode { pos, size, attrs } => {
                let mapped = mapping.map_result(pos, 1);
                if mapped.deleted_after() {
                    trace!(pos, "node already removed");
                    continue;
                }
                match attrs {
                    Some(attrs) => add_node_annotation(tr, mapped.pos, attrs)?,
                    None => {
                        tr.delete(mapped.pos, mapped.pos + size)?;
                    }
                }
            }
            ChangeStep::MergeFragment { pos, content } => {
                let pos = mapping.map(pos, -1);
                tr.insert(pos, content)?;
            }
            ChangeStep::InsertSlice { pos, slice, split } => {
                let pos = mapping.map(pos, -1);
                tr.replace(pos, pos, slice.clone())?;
                if let Some(split_id) = split {
                    stamp_split(tr, pos, &slice, &split_id, ctx)?;
                }
            }
        }
    }
    Ok(())
}

/// Link both halves of every node split by inserting the open `slice` at
/// `pos`. The first half gets a `reference` to the split, the second half a
/// `node_split`. A half the author inserted themselves stays a plain insert.
fn stamp_split(
    tr: &mut Transform,
    pos: usize,
    slice: &Slice,
    split_id: &str,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let left = tr.doc().resolve(pos)?;
    let right = tr.doc().resolve(pos + slice.size())?;
    let levels = slice.open_start.min(left.depth).min(right.depth);
    debug!(pos, levels, split_id, "stamping split");

    for level in 0..levels {
        let left_node = left.node(left.depth - level).clone();
        let left_pos = left.before(left.depth - level);
        let right_pos = right.before(right.depth - level);

        if is_own_insert(&left_node, &ctx.author_id) {
            let inherited: Vec<TrackedAttrs> = node_annotations(&left_node)
                .iter()
                .filter(|a| !a.is_operation(Operation::Reference))
                .map(|a| fresh_copy(a, ctx))
                .collect();
            set_node_annotations(tr, right_pos, &inherited)?;
            continue;
        }

        let reference = TrackedAttrs::new(ctx, Operation::Reference).with_move_node_id(split_id);
        add_node_annotation(tr, left_pos, reference)?;
        let split = TrackedAttrs::new(ctx, Operation::NodeSplit).with_move_node_id(split_id);
        set_node_annotations(tr, right_pos, &[split])?;
    }
    Ok(())
}

/// Set the plain (non-tracking) attributes of the node at `pos` to `attrs`,
/// one attribute step per changed key. Keys missing from `attrs` are
/// cleared; the annotation list is left alone.
pub(crate) fn set_plain_attrs(tr: &mut Transform, pos: usize, attrs: &Attrs) -> TrackResult<()> {
    let node = node_at(tr, pos)?;
    for (key, value) in attrs {
        if key == TRACKED_ATTR || node.attr(key) == Some(value) {
            continue;
        }
        tr.set_node_attribute(pos, key.clone(), value.clone())?;
    }
    for key in node.attrs().keys() {
        if key != TRACKED_ATTR && !attrs.contains_key(key) {
            tr.set_node_attribute(pos, key.clone(), Value::Null)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{text_annotation, with_node_annotations};
    use crate::merge::{plan_deletion, plan_insertion};
    use redline_document::builders::*;
    use redline_document::{Fragment, Node};

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "t", 5)
    }

    fn run(d: &Node, from: usize, to: usize, slice: &Slice, ctx: &mut TrackContext) -> Transform {
        let mut steps = Vec::new();
        plan_deletion(d, from, to, None, ctx, &mut steps);
        plan_insertion(d, from, to, slice, None, ctx, &mut steps).unwrap();
        let mut tr = Transform::new(d.clone());
        apply_change_steps(&mut tr, steps, ctx).unwrap();
        tr
    }

    #[test]
    fn test_replace_text_keeps_deleted_text_visible() {
        let mut ctx = ctx();
        let d = doc(vec![p("abcd")]);
        let slice = Slice::closed(Fragment::from_node(text("X")));
        let tr = run(&d, 2, 4, &slice, &mut ctx);
        let para = tr.doc().child(0);
        assert_eq!(para.text_content(), "aXbcd");
        assert!(text_annotation(para.child(1), MarkKind::TrackedInsert).is_some());
        assert!(text_annotation(para.child(2), MarkKind::TrackedDelete).is_some());
    }

    #[test]
    fn test_cross_block_replacement_keeps_both_blocks() {
        let mut ctx = ctx();
        let d = doc(vec![p("old"), p("bye")]);
        let slice = Slice::closed(Fragment::from_node(text("X")));
        let tr = run(&d, 2, 7, &slice, &mut ctx);
        assert_eq!(tr.doc().child_count(), 2);
        assert_eq!(tr.doc().child(0).text_content(), "oXld");
        assert_eq!(tr.doc().child(1).text_content(), "bye");
    }

    #[test]
    fn test_split_links_both_halves() {
        let mut ctx = ctx();
        let d = doc(vec![p("abcd")]);
        let slice = Slice::new(Fragment::from_vec(vec![p(""), p("")]), 1, 1);
        let tr = run(&d, 3, 3, &slice, &mut ctx);
        let left = node_annotations(tr.doc().child(0));
        let right = node_annotations(tr.doc().child(1));
        assert_eq!(tr.doc().child(0).text_content(), "ab");
        assert_eq!(tr.doc().child(1).text_content(), "cd");
        assert!(left[0].is_operation(Operation::Reference));
        assert!(right[0].is_operation(Operation::NodeSplit));
        assert_eq!(left[0].move_node_id(), right[0].move_node_id());
    }

    #[test]
    fn test_split_of_own_insert_stays_an_insert() {
        let mut ctx = ctx();
        let insert = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let d = doc(vec![with_node_annotations(&p("abcd"), &[insert.clone()])]);
        let slice = Slice::new(Fragment::from_vec(vec![p(""), p("")]), 1, 1);
        let tr = run(&d, 3, 3, &slice, &mut ctx);
        let right = node_annotations(tr.doc().child(1));
        assert_eq!(right.len(), 1);
        assert!(right[0].is_operation(Operation::Insert));
        assert_ne!(right[0].id(), insert.id());
        assert_eq!(node_annotations(tr.doc().child(0)), vec![insert]);
    }

    #[test]
    fn test_set_plain_attrs_clears_missing_keys() {
        let d = doc(vec![heading_level(2, "t")]);
        let mut tr = Transform::new(d);
        let mut attrs = Attrs::new();
        attrs.insert("level".to_string(), Value::from(3));
        set_plain_attrs(&mut tr, 0, &attrs).unwrap();
        assert_eq!(tr.doc().child(0).attr("level"), Some(&Value::from(3)));
    }
}
