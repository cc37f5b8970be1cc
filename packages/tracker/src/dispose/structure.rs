use crate::annotation::{node_annotations, Operation, Status};
use crate::changes::Change;
use crate::error::{TrackError, TrackResult};
use crate::structure::{container, detach, remove_entries, restamp_structure, ShadowHistory};
use redline_document::{Node, NodeKind, Slice};
use redline_transform::Transform;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// End of the document content before the history container.
fn content_end(doc: &Node) -> usize {
    container(doc)
        .map(|(pos, _)| pos)
        .unwrap_or_else(|| doc.content().size())
}

fn structure_ids(node: &Node) -> Vec<String> {
    node_annotations(node)
        .into_iter()
        .filter(|a| a.is_operation(Operation::Structure))
        .filter_map(|a| a.move_node_id)
        .collect()
}

/// Outermost blocks stamped with one of `ids`, as `(from, to)` ranges.
fn stamped_blocks(doc: &Node, ids: &BTreeSet<String>) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    doc.nodes_between(
        0,
        content_end(doc),
        &mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
            if node.kind() == NodeKind::ShadowHistory || !node.is_block() {
                return false;
            }
            if structure_ids(node).iter().any(|id| ids.contains(id)) {
                found.push((pos, pos + node.node_size()));
                return false;
            }
            true
        },
    );
    found
}

/// Structure ids in `[from, to)` with no entry in `history`.
fn stale_ids(doc: &Node, from: usize, to: usize, history: &ShadowHistory) -> BTreeSet<String> {
    let mut stale = BTreeSet::new();
    doc.nodes_between(
        from,
        to,
        &mut |node: &Node, _pos: usize, _parent: Option<&Node>, _index: usize| {
            stale.extend(
                structure_ids(node)
                    .into_iter()
                    .filter(|id| !history.contains(id)),
            );
            node.is_block()
        },
    );
    stale
}

/// Decide structural changes one conversion at a time, newest first, so a
/// later conversion is undone before the one it was built on.
pub(super) fn apply_structure(tr: &mut Transform, changes: &[&Change]) -> TrackResult<()> {
    let history = ShadowHistory::load(tr.doc());
    let mut groups: Vec<(String, Status, i64)> = Vec::new();
    for change in changes {
        let (Some(id), Some(status)) = (change.data.move_node_id(), change.status()) else {
            continue;
        };
        if groups.iter().any(|(group, _, _)| group == id) {
            continue;
        }
        let created = history
            .get(id)
            .map(|e| e.created_at)
            .or(change.data.created_at)
            .unwrap_or_default();
        groups.push((id.to_string(), status, created));
    }
    groups.sort_by(|a, b| b.2.cmp(&a.2));

    let mut undone: BTreeSet<String> = BTreeSet::new();
    for (id, status, _) in groups {
        if undone.contains(&id) {
            continue;
        }
        let history = ShadowHistory::load(tr.doc());
        match status {
            Status::Accepted => accept(tr, &history, &id)?,
            Status::Rejected => undone.extend(reject(tr, &history, &id)?),
            Status::Pending => {}
        }
    }
    Ok(())
}

/// Keep the converted content. Blocks stamped with `id` pass to the
/// conversion it was built on, if that one is still undecided.
fn accept(tr: &mut Transform, history: &ShadowHistory, id: &str) -> TrackResult<()> {
    let parent = history
        .parent(id)
        .map(|p| (p.move_node_id.clone(), p.action.clone()));
    let end = content_end(tr.doc());
    restamp_structure(
        tr,
        0,
        end,
        id,
        parent.as_ref().map(|(m, a)| (m.as_str(), a.as_str())),
    )?;
    if history.contains(id) {
        detach(tr, history, id)?;
    }
    debug!(id, "structural change accepted");
    Ok(())
}

/// Put back the content recorded before conversion `id`, dropping it and
/// every conversion built on it. Returns the ids dropped.
fn reject(tr: &mut Transform, history: &ShadowHistory, id: &str) -> TrackResult<BTreeSet<String>> {
    let entry = history
        .get(id)
        .ok_or_else(|| TrackError::MissingShadowEntry(id.to_string()))?;
    let mut ids = history.descendants(id);
    ids.insert(id.to_string());

    let blocks = stamped_blocks(tr.doc(), &ids);
    let restored = match (blocks.first(), blocks.last()) {
        (Some(&(from, _)), Some(&(_, to))) => {
            tr.replace(from, to, Slice::closed(entry.content.clone()))?;
            Some((from, from + entry.content.size()))
        }
        _ => {
            warn!(id, "converted content is gone, dropping its history");
            None
        }
    };
    let parent = entry.parents.first().cloned();
    remove_entries(tr, &ids)?;

    // Restored blocks may name a conversion that was decided since.
    if let Some((from, to)) = restored {
        let fresh = ShadowHistory::load(tr.doc());
        let target = parent
            .as_deref()
            .and_then(|p| fresh.get(p))
            .map(|p| (p.move_node_id.clone(), p.action.clone()));
        for stale in stale_ids(tr.doc(), from, to, &fresh) {
            restamp_structure(
                tr,
                from,
                to,
                &stale,
                target.as_ref().map(|(m, a)| (m.as_str(), a.as_str())),
            )?;
        }
    }
    debug!(id, dropped = ids.len(), "structural change rejected");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use crate::annotation::{node_annotations, Status};
    use crate::changes::discover;
    use crate::config::TrackConfig;
    use crate::context::TrackContext;
    use crate::dispose::set_status;
    use crate::structure::ShadowHistory;
    use crate::track::track;
    use redline_document::builders::*;
    use redline_document::{Node, NodeKind};
    use redline_transform::Transform;

    fn converted() -> (Node, TrackContext) {
        let mut ctx = TrackContext::deterministic("alice", "c", 300);
        let mut tr = Transform::new(doc(vec![p("a"), p("b")]));
        tr.set_node_markup(3, Some(NodeKind::Heading), None).unwrap();
        let out = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
        (out.doc().clone(), ctx)
    }

    fn decide(doc: &Node, status: Status, ctx: &TrackContext) -> Node {
        let changes = discover(doc);
        let ids: Vec<&str> = changes.flatten().into_iter().map(|c| c.id.as_str()).collect();
        set_status(doc, &changes, &ids, status, ctx).unwrap().doc().clone()
    }

    #[test]
    fn test_conversion_is_recorded() {
        let (edited, _) = converted();
        assert_eq!(edited.child(1).kind(), NodeKind::Heading);
        assert_eq!(ShadowHistory::load(&edited).len(), 1);
        assert_eq!(discover(&edited).all().len(), 1);
    }

    #[test]
    fn test_reject_restores_snapshot() {
        let (edited, ctx) = converted();
        let rejected = decide(&edited, Status::Rejected, &ctx);
        assert_eq!(rejected, doc(vec![p("a"), p("b")]));
    }

    #[test]
    fn test_accept_keeps_conversion_and_drops_history() {
        let (edited, ctx) = converted();
        let accepted = decide(&edited, Status::Accepted, &ctx);
        assert_eq!(accepted.child_count(), 2);
        assert_eq!(accepted.child(1).kind(), NodeKind::Heading);
        assert!(node_annotations(accepted.child(1)).is_empty());
        assert!(ShadowHistory::load(&accepted).is_empty());
    }
}
