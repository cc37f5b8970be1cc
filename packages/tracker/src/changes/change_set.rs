//! # Change collection
//!
//! The immutable, queryable set of logical changes in a document.
//!
//! ## Design
//!
//! - `all` keeps every record discovery produced, including incomplete
//!   ones and duplicate ids, so repair can see them
//! - `tree` holds only valid changes, grouped by containment: a node change
//!   owns the changes nested inside its span that were decided at the same
//!   time as it
//! - A collection is never patched; rediscover after every edit

use super::change::Change;
use crate::annotation::Status;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    all: Vec<Change>,
    tree: Vec<Change>,
}

impl ChangeSet {
    pub fn new(all: Vec<Change>) -> Self {
        let tree = group(valid(&all));
        Self { all, tree }
    }

    /// Every discovered record, valid or not, in document order.
    pub fn all(&self) -> &[Change] {
        &self.all
    }

    /// Valid changes grouped into trees.
    pub fn changes(&self) -> &[Change] {
        &self.tree
    }

    /// Valid changes, each parent followed by its children.
    pub fn flatten(&self) -> Vec<&Change> {
        let mut flat = Vec::new();
        for change in &self.tree {
            flat.push(change);
            flat.extend(change.children());
        }
        flat
    }

    pub fn get(&self, id: &str) -> Option<&Change> {
        self.flatten().into_iter().find(|c| c.id == id)
    }

    fn with_status(&self, status: Status) -> Vec<&Change> {
        self.flatten()
            .into_iter()
            .filter(|c| c.status() == Some(status))
            .collect()
    }

    pub fn pending(&self) -> Vec<&Change> {
        self.with_status(Status::Pending)
    }

    pub fn accepted(&self) -> Vec<&Change> {
        self.with_status(Status::Accepted)
    }

    pub fn rejected(&self) -> Vec<&Change> {
        self.with_status(Status::Rejected)
    }

    pub fn text_changes(&self) -> Vec<&Change> {
        self.flatten()
            .into_iter()
            .filter(|c| c.is_text_change())
            .collect()
    }

    pub fn node_changes(&self) -> Vec<&Change> {
        self.flatten()
            .into_iter()
            .filter(|c| c.is_node_change())
            .collect()
    }

    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.all
            .iter()
            .filter(|c| !c.id.is_empty())
            .any(|c| !seen.insert(c.id.as_str()))
    }

    pub fn has_incomplete_changes(&self) -> bool {
        self.all.iter().any(|c| !c.data.is_complete())
    }

    /// Whether repair has anything to do.
    pub fn is_malformed(&self) -> bool {
        self.has_incomplete_changes() || self.has_duplicate_ids()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Number of valid changes, children included.
    pub fn len(&self) -> usize {
        self.flatten().len()
    }
}

/// Complete changes whose id appears for the first time.
fn valid(all: &[Change]) -> Vec<Change> {
    let mut seen = HashSet::new();
    all.iter()
        .filter(|c| c.data.is_complete() && seen.insert(c.id.clone()))
        .cloned()
        .collect()
}

fn group(changes: Vec<Change>) -> Vec<Change> {
    let mut tree = Vec::new();
    let mut current: Option<Change> = None;

    for change in changes {
        if let Some(parent) = current.as_mut() {
            let same_span = change.from == parent.from && change.to == parent.to;
            let nested = change.from < parent.to
                && !(same_span && change.is_settled())
                && change.data.status_update_at == parent.data.status_update_at;
            if nested {
                parent.push_child(change);
                continue;
            }
        }
        if let Some(parent) = current.take() {
            tree.push(parent);
        }
        if change.is_node_change() {
            current = Some(change);
        } else {
            tree.push(change);
        }
    }
    if let Some(parent) = current {
        tree.push(parent);
    }
    tree
}
