use super::shadow::{append_entry, detach, ShadowEntry, ShadowHistory};
use crate::annotation::{node_annotations, Operation, Status, TrackedAttrs};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::store::set_node_annotations;
use redline_document::hash::fragment_hash;
use redline_document::{Fragment, Node, NodeKind};
use redline_transform::Transform;
use tracing::{debug, instrument};

/// The pending structural change shared by every top node of `old`, when the
/// author restructures content they already restructured.
fn shared_structure(old: &Fragment, author: &str) -> Option<String> {
    let mut shared: Option<String> = None;
    for node in old.iter() {
        let id = node_annotations(node)
            .into_iter()
            .find(|a| a.is_own_pending(author, Operation::Structure))
            .and_then(|a| a.move_node_id)?;
        match &shared {
            Some(existing) if *existing != id => return None,
            _ => shared = Some(id),
        }
    }
    shared
}

/// Positions of block nodes lying wholly inside `[from, to)`.
fn contained_blocks(doc: &Node, from: usize, to: usize) -> Vec<(usize, Node)> {
    let mut found = Vec::new();
    doc.nodes_between(
        from,
        to,
        &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
            if node.kind() == NodeKind::ShadowHistory || !node.is_block() {
                return false;
            }
            if pos >= from && pos + node.node_size() <= to {
                found.push((pos, node.clone()));
            }
            true
        },
    );
    found
}

/// Stamp every block in `[from, to)` with a fresh `structure` annotation for
/// `target` (id, action), replacing earlier ones; `None` only strips them.
pub(crate) fn stamp_structure(
    tr: &mut Transform,
    from: usize,
    to: usize,
    target: Option<(&str, &str)>,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    for (pos, node) in contained_blocks(tr.doc(), from, to) {
        let mut annotations: Vec<TrackedAttrs> = node_annotations(&node)
            .into_iter()
            .filter(|a| !a.is_operation(Operation::Structure))
            .collect();
        if let Some((id, action)) = target {
            annotations.push(
                TrackedAttrs::new(ctx, Operation::Structure)
                    .with_move_node_id(id)
                    .with_action(action),
            );
        }
        set_node_annotations(tr, pos, &annotations)?;
    }
    Ok(())
}

/// Move the `structure` annotations of change `id` in `[from, to)` over to
/// `target`, keeping their annotation ids, or strip them when `None`.
pub(crate) fn restamp_structure(
    tr: &mut Transform,
    from: usize,
    to: usize,
    id: &str,
    target: Option<(&str, &str)>,
) -> TrackResult<()> {
    for (pos, node) in contained_blocks(tr.doc(), from, to) {
        let annotations = node_annotations(&node);
        if !annotations
            .iter()
            .any(|a| a.is_operation(Operation::Structure) && a.move_node_id() == Some(id))
        {
            continue;
        }
        let updated: Vec<TrackedAttrs> = annotations
            .into_iter()
            .filter_map(|a| {
                if !a.is_operation(Operation::Structure) || a.move_node_id() != Some(id) {
                    return Some(a);
                }
                let (parent, action) = target?;
                let mut moved = a.with_move_node_id(parent).with_action(action);
                // The parent change is still undecided.
                moved.status = Some(Status::Pending);
                moved.status_update_at = Some(0);
                moved.reviewed_by_id = None;
                Some(moved)
            })
            .collect();
        set_node_annotations(tr, pos, &updated)?;
    }
    Ok(())
}

/// Record that `[from, to)` of the current document replaced the blocks
/// `old` as one structural change named `action`.
///
/// Repeated restructuring of the same content by the same author extends
/// the history instead of nesting: the same action reuses the change, a
/// different one becomes a child of it, and restoring the content of the
/// previous state collapses the change into its parent.
#[instrument(level = "debug", skip(tr, old, ctx))]
pub(crate) fn link_structure(
    tr: &mut Transform,
    from: usize,
    to: usize,
    old: &Fragment,
    action: &str,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let author = ctx.author_id.clone();
    let history = ShadowHistory::load(tr.doc());
    let mut parents = Vec::new();

    if let Some(previous) = shared_structure(old, &author) {
        let entry = history
            .get(&previous)
            .ok_or_else(|| TrackError::MissingShadowEntry(previous.clone()))?;
        let current = tr.doc().slice(from, to)?.content;
        if fragment_hash(&current) == fragment_hash(&entry.content) {
            debug!(id = %previous, "structure restored, collapsing");
            let parent = history
                .parent(&previous)
                .map(|p| (p.move_node_id.clone(), p.action.clone()));
            restamp_structure(
                tr,
                from,
                to,
                &previous,
                parent.as_ref().map(|(id, action)| (id.as_str(), action.as_str())),
            )?;
            return detach(tr, &history, &previous);
        }
        if entry.action == action {
            return stamp_structure(tr, from, to, Some((previous.as_str(), action)), ctx);
        }
        parents.push(previous);
    }

    let id = ctx.new_id();
    stamp_structure(tr, from, to, Some((id.as_str(), action)), ctx)?;
    append_entry(
        tr,
        &ShadowEntry {
            move_node_id: id,
            parents,
            action: action.to_string(),
            created_at: ctx.now(),
            content: old.clone(),
        },
    )
}

/// Link a whole edit tagged with a structure action: the top-level blocks
/// that differ between `before` and the current document form the change.
pub(crate) fn link_edit(
    before: &Node,
    tr: &mut Transform,
    action: &str,
    ctx: &mut TrackContext,
) -> TrackResult<()> {
    let old: Vec<Node> = top_level(before);
    let new: Vec<Node> = top_level(tr.doc());

    let start = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let room = old.len().min(new.len()) - start;
    let tail = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();
    let changed_old = &old[start..old.len() - tail];
    let changed_new = &new[start..new.len() - tail];
    if changed_old.is_empty() && changed_new.is_empty() {
        return Ok(());
    }

    let from: usize = new[..start].iter().map(Node::node_size).sum();
    let to = from + changed_new.iter().map(Node::node_size).sum::<usize>();
    link_structure(
        tr,
        from,
        to,
        &Fragment::from_vec(changed_old.to_vec()),
        action,
        ctx,
    )
}

fn top_level(doc: &Node) -> Vec<Node> {
    doc.content()
        .iter()
        .filter(|n| n.kind() != NodeKind::ShadowHistory)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_document::builders::*;

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "s", 20)
    }

    fn structure_ids(node: &Node) -> Vec<String> {
        node_annotations(node)
            .into_iter()
            .filter(|a| a.is_operation(Operation::Structure))
            .filter_map(|a| a.move_node_id)
            .collect()
    }

    #[test]
    fn test_convert_records_snapshot() {
        let mut ctx = ctx();
        let before = doc(vec![p("a"), p("b")]);
        let mut tr = Transform::new(before.clone());
        tr.set_node_markup(3, Some(NodeKind::Heading), None).unwrap();
        link_edit(&before, &mut tr, "convert_to_heading", &mut ctx).unwrap();

        let history = ShadowHistory::load(tr.doc());
        assert_eq!(history.len(), 1);
        let id = structure_ids(tr.doc().child(1));
        assert_eq!(id.len(), 1);
        let entry = history.get(&id[0]).unwrap();
        assert_eq!(entry.content, Fragment::from_node(p("b")));
        assert!(structure_ids(tr.doc().child(0)).is_empty());
    }

    #[test]
    fn test_second_action_becomes_child() {
        let mut ctx = ctx();
        let before = doc(vec![p("a")]);
        let mut tr = Transform::new(before.clone());
        tr.set_node_markup(0, Some(NodeKind::Heading), None).unwrap();
        link_edit(&before, &mut tr, "convert_to_heading", &mut ctx).unwrap();
        let first = structure_ids(tr.doc().child(0))[0].clone();

        let before = tr.doc().clone();
        let mut tr = Transform::new(before.clone());
        let quote = Node::element(NodeKind::Blockquote, vec![p("a")]);
        tr.replace_with(0, 3, Fragment::from_node(quote)).unwrap();
        link_edit(&before, &mut tr, "wrap_in_blockquote", &mut ctx).unwrap();

        let history = ShadowHistory::load(tr.doc());
        let second = structure_ids(tr.doc().child(0))[0].clone();
        assert_ne!(first, second);
        assert_eq!(history.get(&second).unwrap().parents, vec![first]);
    }

    #[test]
    fn test_restoring_content_collapses_change() {
        let mut ctx = ctx();
        let before = doc(vec![p("a")]);
        let mut tr = Transform::new(before.clone());
        tr.set_node_markup(0, Some(NodeKind::Heading), None).unwrap();
        link_edit(&before, &mut tr, "convert_to_heading", &mut ctx).unwrap();

        let converted = tr.doc().clone();
        let mut tr = Transform::new(converted.clone());
        tr.set_node_markup(0, Some(NodeKind::Paragraph), None).unwrap();
        link_edit(&converted, &mut tr, "convert_to_paragraph", &mut ctx).unwrap();

        assert!(ShadowHistory::load(tr.doc()).is_empty());
        assert_eq!(tr.doc().child_count(), 1);
        assert!(structure_ids(tr.doc().child(0)).is_empty());
    }

    #[test]
    fn test_missing_entry_is_an_error() {
        let mut ctx = ctx();
        let orphan = TrackedAttrs::new(&mut ctx, Operation::Structure)
            .with_move_node_id("gone")
            .with_action("convert_to_heading");
        let annotated = crate::annotation::with_node_annotations(&p("a"), &[orphan]);
        let mut tr = Transform::new(doc(vec![heading("a")]));
        let result = link_structure(
            &mut tr,
            0,
            3,
            &Fragment::from_node(annotated),
            "convert_to_paragraph",
            &mut ctx,
        );
        assert_eq!(result, Err(TrackError::MissingShadowEntry("gone".to_string())));
    }
}
