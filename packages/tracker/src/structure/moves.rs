use crate::annotation::{is_own_insert, node_annotations, Operation};
use crate::context::TrackContext;
use redline_document::hash::fragment_hash;
use redline_document::{Fragment, Node, Slice};
use redline_transform::{Step, Transform};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Replace steps of one edit recognised as a block move: the step at an
/// origin index removes content that the step at a destination index
/// inserts again. Both map to the same move id.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MovePlan {
    pub origins: HashMap<usize, String>,
    pub destinations: HashMap<usize, String>,
}

impl MovePlan {
    pub fn origin(&self, index: usize) -> Option<&str> {
        self.origins.get(&index).map(String::as_str)
    }

    pub fn destination(&self, index: usize) -> Option<&str> {
        self.destinations.get(&index).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty() && self.destinations.is_empty()
    }
}

fn closed_blocks(slice: &Slice) -> Option<&Fragment> {
    let closed = slice.open_start == 0 && slice.open_end == 0;
    if !closed || slice.content.child_count() == 0 || slice.content.iter().any(|n| !n.is_block()) {
        return None;
    }
    Some(&slice.content)
}

/// A move of content the author already moved keeps its first id.
fn previous_move(content: &Fragment, author: &str) -> Option<String> {
    let mut shared: Option<String> = None;
    for node in content.iter() {
        let id = node_annotations(node)
            .into_iter()
            .find(|a| a.is_own_pending(author, Operation::Move))
            .and_then(|a| a.move_node_id)?;
        match &shared {
            Some(existing) if *existing != id => return None,
            _ => shared = Some(id),
        }
    }
    shared
}

fn is_unreviewed_insert(node: &Node, author: &str) -> bool {
    is_own_insert(node, author)
        && !node_annotations(node)
            .iter()
            .any(|a| a.is_operation(Operation::Move))
}

/// Pair the block deletions and insertions of `tr` that carry the same
/// content.
pub(crate) fn pair_moves(tr: &Transform, ctx: &mut TrackContext) -> MovePlan {
    let author = ctx.author_id.clone();
    let mut removed: Vec<(usize, Fragment)> = Vec::new();
    let mut inserted: Vec<(usize, u32)> = Vec::new();

    for (index, step) in tr.steps().iter().enumerate() {
        let Step::Replace(replace) = step else {
            continue;
        };
        if replace.from < replace.to {
            if let Ok(slice) = tr.docs()[index].slice(replace.from, replace.to) {
                if let Some(content) = closed_blocks(&slice) {
                    removed.push((index, content.clone()));
                }
            }
        }
        if let Some(content) = closed_blocks(&replace.slice) {
            inserted.push((index, fragment_hash(content)));
        }
    }

    let mut plan = MovePlan::default();
    let mut used: HashSet<usize> = HashSet::new();
    for (origin, content) in removed {
        // Removing an unreviewed insertion just takes it back.
        if content.iter().any(|n| is_unreviewed_insert(n, &author)) {
            continue;
        }
        let hash = fragment_hash(&content);
        let Some(&(destination, _)) = inserted
            .iter()
            .find(|(index, h)| *index != origin && *h == hash && !used.contains(index))
        else {
            continue;
        };
        used.insert(destination);
        let id = match previous_move(&content, &author) {
            Some(id) => id,
            None => {
                let id = ctx.new_id();
                plan.origins.insert(origin, id.clone());
                id
            }
        };
        debug!(origin, destination, id = %id, "paired move");
        plan.destinations.insert(destination, id);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{with_node_annotations, TrackedAttrs};
    use redline_document::builders::*;

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "m", 0)
    }

    #[test]
    fn test_delete_then_insert_same_block_is_a_move() {
        let mut tr = Transform::new(doc(vec![p("a"), p("b"), p("c")]));
        tr.delete(0, 3).unwrap();
        tr.insert(6, Fragment::from_node(p("a"))).unwrap();
        let plan = pair_moves(&tr, &mut ctx());
        assert_eq!(plan.origin(0), Some("m-1"));
        assert_eq!(plan.destination(1), Some("m-1"));
    }

    #[test]
    fn test_different_content_is_not_paired() {
        let mut tr = Transform::new(doc(vec![p("a"), p("b")]));
        tr.delete(0, 3).unwrap();
        tr.insert(3, Fragment::from_node(p("z"))).unwrap();
        assert!(pair_moves(&tr, &mut ctx()).is_empty());
    }

    #[test]
    fn test_moving_an_own_move_keeps_its_id() {
        let mut ctx = ctx();
        let moved = TrackedAttrs::new(&mut ctx, Operation::Move).with_move_node_id("first");
        let start = doc(vec![with_node_annotations(&p("a"), &[moved]), p("b")]);
        let mut tr = Transform::new(start);
        tr.delete(0, 3).unwrap();
        tr.insert(3, Fragment::from_node(p("a"))).unwrap();
        let plan = pair_moves(&tr, &mut ctx);
        assert_eq!(plan.origin(0), None);
        assert_eq!(plan.destination(1), Some("first"));
    }
}
