use super::HostStep;
use crate::annotation::{is_own_insert, node_annotations, plain_attrs, Operation, TrackedAttrs};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::merge::set_plain_attrs;
use crate::store::{node_at, set_node_annotations};
use redline_document::{Attrs, Node};
use redline_transform::{AttrStep, Transform};
use tracing::trace;

pub(super) fn track_attr_step(
    tr: &mut Transform,
    host: &HostStep,
    step: &AttrStep,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let old_node = host
        .before()
        .node_at(step.pos)
        .cloned()
        .ok_or(TrackError::NoNodeAt(step.pos))?;
    let mapped = host.mapping_after(tr).map_result(step.pos, 1);
    if mapped.deleted_after() {
        trace!(pos = step.pos, "attribute target removed by a later step");
        return Ok(());
    }
    let new_attrs = plain_attrs(node_at(tr, mapped.pos)?.attrs());
    track_attr_change(tr, mapped.pos, &old_node, &new_attrs, ctx)
}

/// Record that the node at `pos`, formerly `old_node`, now has the plain
/// attributes `new_attrs`.
///
/// One pending attribute change per node: its `oldAttrs` keep the values
/// from before the first unreviewed change, and the change disappears once
/// the attributes are back to those values.
pub(super) fn track_attr_change(
    tr: &mut Transform,
    pos: usize,
    old_node: &Node,
    new_attrs: &Attrs,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    if is_own_insert(old_node, &ctx.author_id) {
        return set_plain_attrs(tr, pos, new_attrs);
    }
    let mut annotations = node_annotations(&node_at(tr, pos)?);
    if annotations.is_empty() {
        annotations = node_annotations(old_node);
    }
    let existing = annotations
        .iter()
        .find(|a| a.is_operation(Operation::SetAttributes) && a.is_pending())
        .cloned();
    let baseline = existing
        .as_ref()
        .and_then(|a| a.old_attrs.clone())
        .unwrap_or_else(|| plain_attrs(old_node.attrs()));

    let mut kept: Vec<TrackedAttrs> = annotations
        .into_iter()
        .filter(|a| !(a.is_operation(Operation::SetAttributes) && a.is_pending()))
        .collect();
    if *new_attrs != baseline {
        let mut change = TrackedAttrs::new(ctx, Operation::SetAttributes).with_old_attrs(baseline);
        if let Some(existing) = existing {
            change.id = existing.id;
            change.created_at = existing.created_at;
        }
        kept.push(change);
    }
    set_plain_attrs(tr, pos, new_attrs)?;
    set_node_annotations(tr, pos, &kept)
}

#[cfg(test)]
mod tests {
    use crate::annotation::{node_annotations, Operation};
    use crate::config::TrackConfig;
    use crate::context::TrackContext;
    use crate::track::track;
    use redline_document::builders::*;
    use redline_transform::Transform;
    use serde_json::{json, Value};

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "a", 50)
    }

    #[test]
    fn test_attribute_change_records_old_value() {
        let mut ctx = ctx();
        let start = doc(vec![heading_level(1, "t")]);
        let mut tr = Transform::new(start);
        tr.set_node_attribute(0, "level", json!(2)).unwrap();
        let tracked = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
        let node = tracked.doc().child(0);
        assert_eq!(node.attr("level"), Some(&json!(2)));
        let change = &node_annotations(node)[0];
        assert!(change.is_operation(Operation::SetAttributes));
        assert_eq!(
            change.old_attrs.as_ref().and_then(|a| a.get("level")),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn test_changing_back_removes_the_change() {
        let mut ctx = ctx();
        let config = TrackConfig::new("alice");
        let mut tr = Transform::new(doc(vec![heading_level(1, "t")]));
        tr.set_node_attribute(0, "level", json!(2)).unwrap();
        let first = track(&tr, &config, &mut ctx).unwrap();
        let id = node_annotations(first.doc().child(0))[0].id().to_string();

        let mut tr = Transform::new(first.doc().clone());
        tr.set_node_attribute(0, "level", json!(3)).unwrap();
        let second = track(&tr, &config, &mut ctx).unwrap();
        let change = &node_annotations(second.doc().child(0))[0];
        assert_eq!(change.id(), id);
        assert_eq!(
            change.old_attrs.as_ref().and_then(|a| a.get("level")),
            Some(&Value::from(1))
        );

        let mut tr = Transform::new(second.doc().clone());
        tr.set_node_attribute(0, "level", json!(1)).unwrap();
        let third = track(&tr, &config, &mut ctx).unwrap();
        assert!(node_annotations(third.doc().child(0)).is_empty());
    }
}
