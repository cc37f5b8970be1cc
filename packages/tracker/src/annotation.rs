//! # Change annotations
//!
//! The record attached to a node, text run or formatting mark to say it is
//! part of a tracked change.
//!
//! ## Storage
//!
//! - Block and inline nodes keep a JSON array of annotations in the
//!   `dataTracked` attribute
//! - Text runs carry a `tracked_insert` or `tracked_delete` mark whose
//!   `dataTracked` attribute is a single annotation
//! - Formatting marks whose addition or removal is tracked carry a single
//!   annotation in their own `dataTracked` attribute
//!
//! Every field is optional on the wire so that malformed annotations can
//! still be read and handed to repair.

use crate::context::TrackContext;
use redline_document::mark::find_mark;
use redline_document::{Attrs, Mark, MarkKind, Node, TRACKED_ATTR};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Delete,
    SetAttributes,
    /// The tail of a node that was split off into a new sibling
    NodeSplit,
    /// Placed on the origin of a split, linking it to the split-off node
    Reference,
    WrapWithNode,
    Structure,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapDirection {
    Wrap,
    Unwrap,
}

/// One change annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "authorID", default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(rename = "reviewedByID", default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,

    /// When the change was accepted or rejected; `0` while pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_update_at: Option<i64>,

    /// Attribute values before a `set_attributes` change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_attrs: Option<Attrs>,

    /// Links the parts of a split, wrap, move or structural change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_node_id: Option<String>,

    /// Structural action tag, e.g. `convert_to_section`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<WrapDirection>,
}

impl TrackedAttrs {
    /// A fresh pending annotation by the context's author.
    pub fn new(ctx: &mut TrackContext, operation: Operation) -> Self {
        let now = ctx.now();
        Self {
            id: Some(ctx.new_id()),
            author_id: Some(ctx.author_id.clone()),
            reviewed_by_id: None,
            operation: Some(operation),
            status: Some(Status::Pending),
            created_at: Some(now),
            updated_at: Some(now),
            status_update_at: Some(0),
            old_attrs: None,
            move_node_id: None,
            action: None,
            direction: None,
        }
    }

    pub fn with_move_node_id(mut self, move_node_id: impl Into<String>) -> Self {
        self.move_node_id = Some(move_node_id.into());
        self
    }

    pub fn with_old_attrs(mut self, old_attrs: Attrs) -> Self {
        self.old_attrs = Some(old_attrs);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_direction(mut self, direction: WrapDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// The id, or an empty string when missing.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn move_node_id(&self) -> Option<&str> {
        self.move_node_id.as_deref()
    }

    pub fn is_operation(&self, operation: Operation) -> bool {
        self.operation == Some(operation)
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(Status::Pending)
    }

    pub fn is_by(&self, author: &str) -> bool {
        self.author_id.as_deref() == Some(author)
    }

    /// Pending and created by `author`: content the author may still change
    /// freely.
    pub fn is_own_pending(&self, author: &str, operation: Operation) -> bool {
        self.is_operation(operation) && self.is_pending() && self.is_by(author)
    }

    /// Whether the fields a given operation needs are present.
    pub fn has_operation_fields(&self) -> bool {
        match self.operation {
            None => false,
            Some(Operation::Insert) | Some(Operation::Delete) => true,
            Some(Operation::SetAttributes) => self.old_attrs.is_some(),
            Some(Operation::NodeSplit) | Some(Operation::Reference) | Some(Operation::Move) => {
                self.move_node_id.is_some()
            }
            Some(Operation::WrapWithNode) => {
                self.move_node_id.is_some() && self.direction.is_some()
            }
            Some(Operation::Structure) => self.move_node_id.is_some() && self.action.is_some(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.id().is_empty()
            && self.author_id.is_some()
            && self.status.is_some()
            && self.created_at.is_some()
            && self.updated_at.is_some()
            && self.status_update_at.is_some()
            && self.has_operation_fields()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(attrs) => Some(attrs),
            Err(err) => {
                warn!(%err, "ignoring unreadable change annotation");
                None
            }
        }
    }
}

/// Annotations stored on a (non-text) node.
pub fn node_annotations(node: &Node) -> Vec<TrackedAttrs> {
    match node.attr(TRACKED_ATTR) {
        Some(Value::Array(items)) => items.iter().filter_map(TrackedAttrs::from_value).collect(),
        Some(value @ Value::Object(_)) => TrackedAttrs::from_value(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// The attribute value for a list of annotations; `Null` removes the attribute.
pub fn annotations_value(annotations: &[TrackedAttrs]) -> Value {
    if annotations.is_empty() {
        Value::Null
    } else {
        Value::Array(annotations.iter().map(TrackedAttrs::to_value).collect())
    }
}

pub fn with_node_annotations(node: &Node, annotations: &[TrackedAttrs]) -> Node {
    node.with_attr(TRACKED_ATTR, annotations_value(annotations))
}

/// Node attributes without the annotation list.
pub fn plain_attrs(attrs: &Attrs) -> Attrs {
    let mut attrs = attrs.clone();
    attrs.remove(TRACKED_ATTR);
    attrs
}

pub fn tracking_mark(kind: MarkKind, attrs: &TrackedAttrs) -> Mark {
    let mut mark_attrs = Attrs::new();
    mark_attrs.insert(TRACKED_ATTR.to_string(), attrs.to_value());
    Mark::with_attrs(kind, mark_attrs)
}

/// The annotation carried by a single mark, tracking or formatting.
pub fn mark_annotation(mark: &Mark) -> Option<TrackedAttrs> {
    mark.attr(TRACKED_ATTR).and_then(TrackedAttrs::from_value)
}

/// A formatting mark carrying an annotation.
pub fn annotated_mark(mark: &Mark, attrs: &TrackedAttrs) -> Mark {
    let mut mark = plain_mark(mark);
    mark.attrs.insert(TRACKED_ATTR.to_string(), attrs.to_value());
    mark
}

pub fn plain_mark(mark: &Mark) -> Mark {
    let mut mark = mark.clone();
    mark.attrs.remove(TRACKED_ATTR);
    mark
}

/// Annotation of a text run's `tracked_insert` or `tracked_delete` mark.
pub fn text_annotation(node: &Node, kind: MarkKind) -> Option<TrackedAttrs> {
    find_mark(node.marks(), kind).and_then(mark_annotation)
}

/// Whether the node itself (not its ancestors) is a pending insertion or
/// move destination by `author`.
pub fn is_own_insert(node: &Node, author: &str) -> bool {
    if node.is_text() {
        return text_annotation(node, MarkKind::TrackedInsert)
            .map(|a| a.is_own_pending(author, Operation::Insert))
            .unwrap_or(false);
    }
    node_annotations(node).iter().any(|a| {
        a.is_own_pending(author, Operation::Insert) || a.is_own_pending(author, Operation::Move)
    })
}

/// Whether the node is already marked as deleted and still pending.
pub fn is_pending_delete(node: &Node) -> bool {
    if node.is_text() {
        return text_annotation(node, MarkKind::TrackedDelete)
            .map(|a| a.is_pending())
            .unwrap_or(false);
    }
    node_annotations(node)
        .iter()
        .any(|a| a.is_operation(Operation::Delete) && a.is_pending())
}

/// Whether `pos` sits inside (or on) content the author inserted and has not
/// had reviewed yet, checking every ancestor.
pub fn inside_own_insert(doc: &Node, pos: usize, author: &str) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    (1..=rpos.depth).any(|depth| is_own_insert(rpos.node(depth), author))
}

/// Whether any annotation inside `node` (not on it) is still pending.
pub fn has_pending_descendants(node: &Node) -> bool {
    let mut found = false;
    node.descendants(&mut |child: &Node, _pos: usize, _parent: Option<&Node>, _index: usize| {
        if found {
            return false;
        }
        let pending_marks = child
            .marks()
            .iter()
            .filter_map(mark_annotation)
            .any(|a| a.is_pending());
        let pending_node = !child.is_text() && node_annotations(child).iter().any(|a| a.is_pending());
        found = pending_marks || pending_node;
        !found
    });
    found
}
