use crate::annotation::{Operation, Status, TrackedAttrs};
use redline_document::{Attrs, Mark, MarkKind, NodeKind};
use serde::Serialize;

/// Where an annotation lives in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    /// A `tracked_insert` / `tracked_delete` mark on text
    TextMark(MarkKind),
    /// A formatting mark on text carrying its own annotation
    FormatMark(MarkKind),
    /// The node's `dataTracked` attribute list
    Node,
    /// A node mark carrying an annotation
    NodeMark(MarkKind),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    Text {
        text: String,
    },
    Node {
        node_kind: NodeKind,
        attrs: Attrs,
        children: Vec<Change>,
    },
    NodeAttr {
        node_kind: NodeKind,
        old_attrs: Attrs,
        new_attrs: Attrs,
    },
    Mark {
        mark: Mark,
        node_mark: bool,
    },
}

/// A logical change derived from one annotation (or, for text, from a run of
/// adjacent text carrying the same annotation id).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub data: TrackedAttrs,
    pub kind: ChangeKind,
    pub source: AnnotationSource,
}

impl Change {
    pub fn operation(&self) -> Option<Operation> {
        self.data.operation
    }

    pub fn status(&self) -> Option<Status> {
        self.data.status
    }

    pub fn is_pending(&self) -> bool {
        self.data.is_pending()
    }

    /// Decided, and not a deletion.
    pub fn is_settled(&self) -> bool {
        !self.is_pending() && !self.data.is_operation(Operation::Delete)
    }

    pub fn is_text_change(&self) -> bool {
        matches!(self.kind, ChangeKind::Text { .. })
    }

    pub fn is_node_change(&self) -> bool {
        matches!(self.kind, ChangeKind::Node { .. })
    }

    pub fn is_node_attr_change(&self) -> bool {
        matches!(self.kind, ChangeKind::NodeAttr { .. })
    }

    pub fn is_mark_change(&self) -> bool {
        matches!(self.kind, ChangeKind::Mark { .. })
    }

    pub fn children(&self) -> &[Change] {
        match &self.kind {
            ChangeKind::Node { children, .. } => children,
            _ => &[],
        }
    }

    pub(crate) fn push_child(&mut self, child: Change) {
        if let ChangeKind::Node { children, .. } = &mut self.kind {
            children.push(child);
        }
    }
}
