//! # Node and mark kinds
//!
//! The document schema is closed: every node kind knows where it may appear
//! and what it may contain. Validation is deliberately shallow (child kinds
//! only, no cardinality) since the tracker must be able to hold content in
//! intermediate states, e.g. a list whose last item was deleted but not yet
//! accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Doc,
    Section,
    SectionTitle,
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Image,
    HardBreak,
    Text,
    /// Hidden container for prior versions of structurally changed content.
    ShadowHistory,
    ShadowEntry,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Section => "section",
            NodeKind::SectionTitle => "section_title",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Blockquote => "blockquote",
            NodeKind::BulletList => "bullet_list",
            NodeKind::ListItem => "list_item",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table_row",
            NodeKind::TableCell => "table_cell",
            NodeKind::Image => "image",
            NodeKind::HardBreak => "hard_break",
            NodeKind::Text => "text",
            NodeKind::ShadowHistory => "shadow_history",
            NodeKind::ShadowEntry => "shadow_entry",
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::HardBreak | NodeKind::Image)
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline()
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeKind::Text)
    }

    /// Blocks whose content is inline.
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::SectionTitle
        )
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::HardBreak | NodeKind::Image)
    }

    /// Nodes that ordinary content flows around but never through.
    pub fn is_isolating(&self) -> bool {
        matches!(
            self,
            NodeKind::TableCell | NodeKind::ShadowHistory | NodeKind::ShadowEntry
        )
    }

    fn is_flow_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Section
                | NodeKind::Paragraph
                | NodeKind::Heading
                | NodeKind::Blockquote
                | NodeKind::BulletList
                | NodeKind::Table
        )
    }

    /// Whether `child` may appear directly inside a node of this kind.
    pub fn allows(&self, child: NodeKind) -> bool {
        match self {
            NodeKind::Doc => child.is_flow_block() || child == NodeKind::ShadowHistory,
            NodeKind::Section => child.is_flow_block() || child == NodeKind::SectionTitle,
            NodeKind::SectionTitle | NodeKind::Paragraph | NodeKind::Heading => child.is_inline(),
            NodeKind::Blockquote | NodeKind::ListItem => {
                matches!(
                    child,
                    NodeKind::Paragraph
                        | NodeKind::Heading
                        | NodeKind::Blockquote
                        | NodeKind::BulletList
                )
            }
            NodeKind::BulletList => child == NodeKind::ListItem,
            NodeKind::Table => child == NodeKind::TableRow,
            NodeKind::TableRow => child == NodeKind::TableCell,
            NodeKind::TableCell => matches!(child, NodeKind::Paragraph | NodeKind::BulletList),
            NodeKind::ShadowHistory => child == NodeKind::ShadowEntry,
            NodeKind::ShadowEntry => {
                child.is_block()
                    && !matches!(
                        child,
                        NodeKind::Doc | NodeKind::ShadowHistory | NodeKind::ShadowEntry
                    )
            }
            NodeKind::Image | NodeKind::HardBreak | NodeKind::Text => false,
        }
    }

    /// Whether content of `other` can be joined onto a node of this kind.
    pub fn compatible_content(&self, other: NodeKind) -> bool {
        *self == other || (self.is_textblock() && other.is_textblock())
    }

    /// Whether marks may be placed on inline children of this kind.
    pub fn allows_marks(&self) -> bool {
        self.is_textblock()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mark kinds, in rank order. Mark sets are kept sorted by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    TrackedInsert,
    TrackedDelete,
    Link,
    Bold,
    Italic,
    Underline,
    Code,
}

impl MarkKind {
    pub fn name(&self) -> &'static str {
        match self {
            MarkKind::TrackedInsert => "tracked_insert",
            MarkKind::TrackedDelete => "tracked_delete",
            MarkKind::Link => "link",
            MarkKind::Bold => "bold",
            MarkKind::Italic => "italic",
            MarkKind::Underline => "underline",
            MarkKind::Code => "code",
        }
    }

    /// Marks that carry change annotations rather than formatting.
    pub fn is_tracking(&self) -> bool {
        matches!(self, MarkKind::TrackedInsert | MarkKind::TrackedDelete)
    }
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
