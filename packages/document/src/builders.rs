//! Shorthand constructors for building documents in code and tests.

use crate::fragment::Fragment;
use crate::mark::{Attrs, Mark};
use crate::node::Node;
use crate::schema::{MarkKind, NodeKind};
use serde_json::json;

pub fn doc(children: Vec<Node>) -> Node {
    Node::element(NodeKind::Doc, children)
}

pub fn section(children: Vec<Node>) -> Node {
    Node::element(NodeKind::Section, children)
}

pub fn section_title(s: &str) -> Node {
    Node::element(NodeKind::SectionTitle, vec![text(s)])
}

pub fn p(s: &str) -> Node {
    p_with(vec![text(s)])
}

/// Paragraph with arbitrary inline children.
pub fn p_with(children: Vec<Node>) -> Node {
    Node::element(NodeKind::Paragraph, children)
}

pub fn heading(s: &str) -> Node {
    heading_level(1, s)
}

pub fn heading_level(level: u8, s: &str) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert("level".into(), json!(level));
    Node::new(
        NodeKind::Heading,
        attrs,
        Fragment::from_node(text(s)),
        Vec::new(),
    )
}

pub fn blockquote(children: Vec<Node>) -> Node {
    Node::element(NodeKind::Blockquote, children)
}

pub fn bullet_list(children: Vec<Node>) -> Node {
    Node::element(NodeKind::BulletList, children)
}

pub fn list_item(children: Vec<Node>) -> Node {
    Node::element(NodeKind::ListItem, children)
}

pub fn table(rows: Vec<Node>) -> Node {
    Node::element(NodeKind::Table, rows)
}

pub fn table_row(cells: Vec<Node>) -> Node {
    Node::element(NodeKind::TableRow, cells)
}

pub fn table_cell(children: Vec<Node>) -> Node {
    Node::element(NodeKind::TableCell, children)
}

pub fn text(s: &str) -> Node {
    Node::text(s, Vec::new())
}

pub fn marked(s: &str, kinds: &[MarkKind]) -> Node {
    let marks = kinds
        .iter()
        .fold(Vec::new(), |set, kind| Mark::new(*kind).add_to_set(&set));
    Node::text(s, marks)
}

pub fn hard_break() -> Node {
    Node::element(NodeKind::HardBreak, Vec::new())
}

pub fn image(src: &str) -> Node {
    Node::element(NodeKind::Image, Vec::new()).with_attr("src", json!(src))
}
