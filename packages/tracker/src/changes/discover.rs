//! Derive the change collection from a document.

use super::change::{AnnotationSource, Change, ChangeKind};
use super::change_set::ChangeSet;
use crate::annotation::{mark_annotation, node_annotations, plain_attrs, plain_mark, Operation};
use redline_document::{Mark, Node, NodeKind};
use std::collections::HashMap;
use tracing::instrument;

/// Scan the document and build a fresh change collection.
///
/// Pure: the collection is always rebuilt from scratch, never patched.
#[instrument(level = "debug", skip_all)]
pub fn discover(doc: &Node) -> ChangeSet {
    ChangeSet::new(collect(doc))
}

/// Whether the text run at `pos` with `marks` continues the run recorded as
/// `last`. Runs with identical mark sets stay apart so that genuine
/// duplicates reach repair.
fn extends_run(last_to: usize, last_marks: &[Mark], pos: usize, marks: &[Mark]) -> bool {
    last_to == pos && !Mark::same_set(last_marks, marks)
}

/// Every annotation in document order, one record per annotation, with
/// adjacent text runs of the same id stitched together.
fn collect(doc: &Node) -> Vec<Change> {
    let mut changes: Vec<Change> = Vec::new();
    // id -> (index of the record, marks of the last run)
    let mut runs: HashMap<String, (usize, Vec<Mark>)> = HashMap::new();

    doc.descendants(&mut |node: &Node, pos: usize, _parent: Option<&Node>, _index: usize| {
        if node.kind() == NodeKind::ShadowHistory {
            return false;
        }
        let end = pos + node.node_size();

        if node.is_text() {
            let text = node.text_str().unwrap_or_default();
            for mark in node.marks() {
                let Some(data) = mark_annotation(mark) else {
                    continue;
                };
                let id = data.id().to_string();
                if let Some((index, last_marks)) = runs.get_mut(&id) {
                    let record = &mut changes[*index];
                    if extends_run(record.to, last_marks, pos, node.marks()) {
                        record.to = end;
                        if let ChangeKind::Text { text: joined } = &mut record.kind {
                            joined.push_str(text);
                        }
                        *last_marks = node.marks().to_vec();
                        continue;
                    }
                }
                let (kind, source) = if mark.kind.is_tracking() {
                    (
                        ChangeKind::Text {
                            text: text.to_string(),
                        },
                        AnnotationSource::TextMark(mark.kind),
                    )
                } else {
                    (
                        ChangeKind::Mark {
                            mark: plain_mark(mark),
                            node_mark: false,
                        },
                        AnnotationSource::FormatMark(mark.kind),
                    )
                };
                runs.insert(id.clone(), (changes.len(), node.marks().to_vec()));
                changes.push(Change {
                    id,
                    from: pos,
                    to: end,
                    data,
                    kind,
                    source,
                });
            }
            return false;
        }

        for data in node_annotations(node) {
            let kind = match data.operation {
                // Linkage only; resolved together with its split
                Some(Operation::Reference) => continue,
                Some(Operation::SetAttributes) => ChangeKind::NodeAttr {
                    node_kind: node.kind(),
                    old_attrs: data.old_attrs.clone().unwrap_or_default(),
                    new_attrs: plain_attrs(node.attrs()),
                },
                _ => ChangeKind::Node {
                    node_kind: node.kind(),
                    attrs: plain_attrs(node.attrs()),
                    children: Vec::new(),
                },
            };
            changes.push(Change {
                id: data.id().to_string(),
                from: pos,
                to: end,
                data,
                kind,
                source: AnnotationSource::Node,
            });
        }
        for mark in node.marks() {
            if let Some(data) = mark_annotation(mark) {
                changes.push(Change {
                    id: data.id().to_string(),
                    from: pos,
                    to: end,
                    data,
                    kind: ChangeKind::Mark {
                        mark: plain_mark(mark),
                        node_mark: true,
                    },
                    source: AnnotationSource::NodeMark(mark.kind),
                });
            }
        }
        true
    });

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{
        annotated_mark, tracking_mark, with_node_annotations, TrackedAttrs,
    };
    use crate::context::TrackContext;
    use pretty_assertions::assert_eq;
    use redline_document::builders::*;
    use redline_document::MarkKind;

    fn ctx() -> TrackContext {
        TrackContext::deterministic("alice", "c", 10)
    }

    #[test]
    fn test_discovers_text_and_node_changes() {
        let mut ctx = ctx();
        let ins = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let del = TrackedAttrs::new(&mut ctx, Operation::Delete);
        let d = doc(vec![
            p_with(vec![
                text("a"),
                text("bc").with_marks(vec![tracking_mark(MarkKind::TrackedInsert, &ins)]),
            ]),
            with_node_annotations(&p("gone"), &[del]),
        ]);

        let changes = collect(&d);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].id, "c-1");
        assert_eq!((changes[0].from, changes[0].to), (2, 4));
        assert_eq!(
            changes[0].kind,
            ChangeKind::Text {
                text: "bc".to_string()
            }
        );
        assert_eq!((changes[1].from, changes[1].to), (5, 11));
        assert!(changes[1].is_node_change());
    }

    #[test]
    fn test_runs_split_by_style_are_stitched() {
        let mut ctx = ctx();
        let ins = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let mark = tracking_mark(MarkKind::TrackedInsert, &ins);
        let d = doc(vec![p_with(vec![
            text("ab").with_marks(vec![mark.clone()]),
            text("cd").with_marks(vec![mark.clone(), redline_document::Mark::new(MarkKind::Bold)]),
        ])]);

        let changes = collect(&d);
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].from, changes[0].to), (1, 5));
        assert_eq!(
            changes[0].kind,
            ChangeKind::Text {
                text: "abcd".to_string()
            }
        );
    }

    #[test]
    fn test_separated_runs_with_same_id_are_duplicates() {
        let mut ctx = ctx();
        let ins = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let mark = tracking_mark(MarkKind::TrackedInsert, &ins);
        let d = doc(vec![
            p_with(vec![text("ab").with_marks(vec![mark.clone()])]),
            p_with(vec![text("cd").with_marks(vec![mark])]),
        ]);

        let changes = collect(&d);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].id, changes[1].id);
    }

    #[test]
    fn test_attribute_and_mark_changes() {
        let mut ctx = ctx();
        let attrs = TrackedAttrs::new(&mut ctx, Operation::SetAttributes)
            .with_old_attrs(redline_document::Attrs::from([(
                "level".to_string(),
                serde_json::json!(1),
            )]));
        let bold = TrackedAttrs::new(&mut ctx, Operation::Insert);
        let d = doc(vec![
            with_node_annotations(&heading_level(2, "t"), &[attrs]),
            p_with(vec![text("b").with_marks(vec![annotated_mark(
                &redline_document::Mark::new(MarkKind::Bold),
                &bold,
            )])]),
        ]);

        let changes = collect(&d);
        assert_eq!(changes.len(), 2);
        match &changes[0].kind {
            ChangeKind::NodeAttr {
                old_attrs,
                new_attrs,
                ..
            } => {
                assert_eq!(old_attrs["level"], serde_json::json!(1));
                assert_eq!(new_attrs["level"], serde_json::json!(2));
            }
            other => panic!("expected attribute change, got {:?}", other),
        }
        assert_eq!(changes[1].source, AnnotationSource::FormatMark(MarkKind::Bold));
        assert!(changes[1].is_mark_change());
    }

    #[test]
    fn test_shadow_history_is_skipped() {
        let mut ctx = ctx();
        let del = TrackedAttrs::new(&mut ctx, Operation::Delete);
        let hidden = redline_document::Node::element(
            NodeKind::ShadowHistory,
            vec![redline_document::Node::element(
                NodeKind::ShadowEntry,
                vec![with_node_annotations(&p("old"), &[del])],
            )],
        );
        let d = doc(vec![p("x"), hidden]);
        assert!(collect(&d).is_empty());
    }
}
