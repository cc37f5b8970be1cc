//! Shadow history: prior versions of structurally changed content.
//!
//! Entries live in a `shadow_history` container at the end of the document,
//! one `shadow_entry` per structural change, holding the content as it was
//! before that change. Entries form a DAG through their `parents` ids; the
//! graph is rebuilt from the document on every load and never holds node
//! references.

use crate::error::TrackResult;
use redline_document::{Attrs, Fragment, Node, NodeKind};
use redline_transform::Transform;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowEntry {
    pub move_node_id: String,
    pub parents: Vec<String>,
    pub action: String,
    pub created_at: i64,
    pub content: Fragment,
}

impl ShadowEntry {
    pub fn to_node(&self) -> Node {
        let mut attrs = Attrs::new();
        attrs.insert("moveNodeId".to_string(), Value::from(self.move_node_id.clone()));
        attrs.insert(
            "parents".to_string(),
            Value::Array(self.parents.iter().cloned().map(Value::from).collect()),
        );
        attrs.insert("action".to_string(), Value::from(self.action.clone()));
        attrs.insert("createdAt".to_string(), Value::from(self.created_at));
        Node::new(NodeKind::ShadowEntry, attrs, self.content.clone(), vec![])
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.kind() != NodeKind::ShadowEntry {
            return None;
        }
        let move_node_id = node.attr("moveNodeId")?.as_str()?.to_string();
        let parents = node
            .attr("parents")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            move_node_id,
            parents,
            action: node
                .attr("action")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: node.attr("createdAt").and_then(Value::as_i64).unwrap_or(0),
            content: node.content().clone(),
        })
    }
}

/// The history DAG as loaded from a document.
#[derive(Debug, Clone, Default)]
pub struct ShadowHistory {
    entries: BTreeMap<String, ShadowEntry>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl ShadowHistory {
    pub fn load(doc: &Node) -> Self {
        let mut history = Self::default();
        let Some((_, container)) = container(doc) else {
            return history;
        };
        for node in container.content().iter() {
            let Some(entry) = ShadowEntry::from_node(node) else {
                warn!(kind = node.kind().name(), "ignoring malformed shadow entry");
                continue;
            };
            for parent in &entry.parents {
                history
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .insert(entry.move_node_id.clone());
            }
            history.entries.insert(entry.move_node_id.clone(), entry);
        }
        history
    }

    pub fn get(&self, id: &str) -> Option<&ShadowEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// First parent of `id`, the state its change was made on.
    pub fn parent(&self, id: &str) -> Option<&ShadowEntry> {
        let entry = self.entries.get(id)?;
        entry.parents.first().and_then(|p| self.entries.get(p))
    }

    pub fn children(&self, id: &str) -> Vec<&str> {
        self.children
            .get(id)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every entry reachable through child links, excluding `id`.
    pub fn descendants(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.children(id).into_iter().collect();
        while let Some(next) = queue.pop_front() {
            if found.insert(next.to_string()) {
                queue.extend(self.children(next));
            }
        }
        found
    }

    /// Ancestors of `id`, nearest first.
    pub fn lineage(&self, id: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = self
            .entries
            .get(id)
            .map(|e| e.parents.iter().cloned().collect())
            .unwrap_or_default();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get(&next) {
                queue.extend(entry.parents.iter().cloned());
            }
            out.push(next);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Position and node of the history container, if the document has one.
pub(crate) fn container(doc: &Node) -> Option<(usize, &Node)> {
    let mut pos = 0;
    for child in doc.content().iter() {
        if child.kind() == NodeKind::ShadowHistory {
            return Some((pos, child));
        }
        pos += child.node_size();
    }
    None
}

fn entry_positions(doc: &Node) -> Vec<(usize, String)> {
    let Some((start, node)) = container(doc) else {
        return Vec::new();
    };
    let mut pos = start + 1;
    let mut out = Vec::new();
    for child in node.content().iter() {
        if let Some(id) = child.attr("moveNodeId").and_then(Value::as_str) {
            out.push((pos, id.to_string()));
        }
        pos += child.node_size();
    }
    out
}

pub(crate) fn append_entry(tr: &mut Transform, entry: &ShadowEntry) -> TrackResult<()> {
    debug!(id = %entry.move_node_id, parents = ?entry.parents, "recording shadow entry");
    let node = entry.to_node();
    let target = container(tr.doc()).map(|(pos, c)| pos + c.node_size() - 1);
    match target {
        Some(pos) => {
            tr.insert(pos, Fragment::from_node(node))?;
        }
        None => {
            let end = tr.doc().content().size();
            let history = Node::element(NodeKind::ShadowHistory, vec![node]);
            tr.insert(end, Fragment::from_node(history))?;
        }
    }
    Ok(())
}

/// Remove the entries `ids`, and the container once it is empty.
pub(crate) fn remove_entries(tr: &mut Transform, ids: &BTreeSet<String>) -> TrackResult<()> {
    let positions = entry_positions(tr.doc());
    let doomed: Vec<usize> = positions
        .iter()
        .filter(|(_, id)| ids.contains(id))
        .map(|(pos, _)| *pos)
        .collect();
    if doomed.is_empty() {
        return Ok(());
    }
    if doomed.len() == positions.len() {
        if let Some((pos, node)) = container(tr.doc()) {
            let size = node.node_size();
            tr.delete(pos, pos + size)?;
        }
        return Ok(());
    }
    for pos in doomed.into_iter().rev() {
        let size = tr
            .doc()
            .node_at(pos)
            .map(Node::node_size)
            .unwrap_or_default();
        tr.delete(pos, pos + size)?;
    }
    Ok(())
}

pub(crate) fn set_parents(tr: &mut Transform, id: &str, parents: &[String]) -> TrackResult<()> {
    let Some((pos, _)) = entry_positions(tr.doc())
        .into_iter()
        .find(|(_, entry)| entry == id)
    else {
        return Ok(());
    };
    let value = Value::Array(parents.iter().cloned().map(Value::from).collect());
    tr.set_node_attribute(pos, "parents", value)?;
    Ok(())
}

/// Drop entry `id` from the history, handing its children over to its own
/// parents.
pub(crate) fn detach(tr: &mut Transform, history: &ShadowHistory, id: &str) -> TrackResult<()> {
    let inherited = history
        .get(id)
        .map(|e| e.parents.clone())
        .unwrap_or_default();
    for child in history.children(id) {
        let Some(entry) = history.get(child) else {
            continue;
        };
        let mut parents: Vec<String> = Vec::new();
        for parent in &entry.parents {
            let replacement = if parent == id {
                inherited.clone()
            } else {
                vec![parent.clone()]
            };
            for p in replacement {
                if !parents.contains(&p) {
                    parents.push(p);
                }
            }
        }
        set_parents(tr, child, &parents)?;
    }
    remove_entries(tr, &BTreeSet::from([id.to_string()]))
}
