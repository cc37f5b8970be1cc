//! Integration tests for recording edits as tracked changes
//!
//! This tests:
//! - Discovery is a pure function of the document
//! - Partial cross-block deletions keep both blocks
//! - Block moves are paired under one id
//! - Own unreviewed insertions are edited in place
//! - Tracking modes and skip metadata
//! - Steps that cannot be tracked stay in the edit untracked

use pretty_assertions::assert_eq;
use redline_document::builders::*;
use redline_document::{Fragment, Node, NodeKind};
use redline_tracker::annotation::node_annotations;
use redline_tracker::{
    discover, Operation, TrackConfig, TrackContext, TrackError, TrackedDocument, TrackingStatus,
    MAX_TRACKED_STEPS,
};
use redline_transform::Transform;
use serde_json::json;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("redline_tracker=debug")
        .with_test_writer()
        .try_init();
}

fn document(start: Node) -> TrackedDocument {
    init_logging();
    let ctx = TrackContext::deterministic("alice", "t", 1_000);
    TrackedDocument::with_context(start, TrackConfig::new("alice"), ctx).unwrap()
}

#[test]
fn test_discovery_is_idempotent() {
    let mut d = document(doc(vec![p("hello"), p("world")]));
    d.edit(|tr| tr.insert_text(3, "XY").map(|_| ())).unwrap();
    d.edit(|tr| tr.delete(10, 12).map(|_| ())).unwrap();

    let first = discover(d.doc());
    let second = discover(d.doc());
    assert_eq!(first, second);
    assert_eq!(&first, d.changes());
    assert_eq!(first.len(), 2);
}

#[test]
fn test_cross_block_deletion_keeps_both_blocks() {
    let mut d = document(doc(vec![p("old"), p("bye")]));
    d.edit(|tr| tr.delete(2, 7).map(|_| ())).unwrap();

    let tracked = d.doc();
    assert_eq!(tracked.child_count(), 2);
    assert_eq!(tracked.child(0).text_content(), "old");
    assert_eq!(tracked.child(1).text_content(), "bye");
    let deletions: Vec<_> = d
        .changes()
        .text_changes()
        .into_iter()
        .filter(|c| c.data.is_operation(Operation::Delete))
        .collect();
    assert_eq!(deletions.len(), 2);
    assert!(d.changes().node_changes().is_empty());
}

#[test]
fn test_block_move_is_paired() {
    let mut d = document(doc(vec![p("a"), p("b")]));
    d.edit(|tr| {
        tr.delete(3, 6)?;
        tr.insert(0, Fragment::from_node(p("b")))?;
        Ok(())
    })
    .unwrap();

    let tracked = d.doc();
    assert_eq!(tracked.child_count(), 3);
    let destination = &node_annotations(tracked.child(0))[0];
    let origin = &node_annotations(tracked.child(2))[0];
    assert!(destination.is_operation(Operation::Move));
    assert!(origin.is_operation(Operation::Delete));
    assert!(destination.move_node_id().is_some());
    assert_eq!(destination.move_node_id(), origin.move_node_id());
}

#[test]
fn test_deleting_own_insert_removes_it() {
    let mut d = document(doc(vec![p("abc")]));
    d.edit(|tr| tr.insert_text(2, "X").map(|_| ())).unwrap();
    d.edit(|tr| tr.delete(2, 3).map(|_| ())).unwrap();
    assert_eq!(d.doc(), &doc(vec![p("abc")]));
    assert!(d.changes().is_empty());
}

#[test]
fn test_deleting_another_authors_insert_is_tracked() {
    let mut d = document(doc(vec![p("abc")]));
    d.edit(|tr| tr.insert_text(2, "X").map(|_| ())).unwrap();
    d.set_author("bob");
    d.edit(|tr| tr.delete(2, 3).map(|_| ())).unwrap();
    assert_eq!(d.doc().child(0).text_content(), "aXbc");
    assert_eq!(d.changes().len(), 2);
}

#[test]
fn test_wrap_is_annotated_on_the_wrapper() {
    let mut d = document(doc(vec![p("a")]));
    d.edit(|tr| {
        let range = {
            let from = tr.doc().resolve(1)?;
            let to = tr.doc().resolve(2)?;
            from.block_range(&to)
        };
        if let Some(range) = range {
            tr.wrap(&range, &[blockquote(vec![])])?;
        }
        Ok(())
    })
    .unwrap();

    let wrapper = d.doc().child(0);
    assert_eq!(wrapper.kind(), NodeKind::Blockquote);
    let annotation = &node_annotations(wrapper)[0];
    assert!(annotation.is_operation(Operation::WrapWithNode));
}

#[test]
fn test_view_only_refuses_edits() {
    let start = doc(vec![p("abc")]);
    let mut d = document(start.clone());
    d.set_tracking_status(TrackingStatus::ViewOnly);
    let result = d.edit(|tr| tr.insert_text(2, "X").map(|_| ()));
    assert_eq!(result, Err(TrackError::ReadOnly));
    assert_eq!(d.doc(), &start);
}

#[test]
fn test_skip_meta_passes_edit_through() {
    let config = TrackConfig::new("alice").skip_meta("remote");
    let ctx = TrackContext::deterministic("alice", "t", 0);
    let mut d = TrackedDocument::with_context(doc(vec![p("abc")]), config, ctx).unwrap();

    let mut tr = d.transform();
    tr.insert_text(2, "X").unwrap();
    tr.set_meta("remote", json!(true));
    d.apply(&tr).unwrap();
    assert_eq!(d.doc(), &doc(vec![p("aXbc")]));
    assert!(d.changes().is_empty());
}

#[test]
fn test_untouched_transform_is_returned_as_is() {
    let start = doc(vec![p("abc")]);
    let tr = Transform::new(start.clone());
    let mut ctx = TrackContext::deterministic("alice", "t", 0);
    let out = redline_tracker::track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
    assert_eq!(out.doc(), &start);
    assert!(out.steps().is_empty());
}

#[test]
fn test_long_edit_leaves_earliest_steps_untracked() {
    let mut d = document(doc(vec![p("a")]));
    let extra = 3;
    d.edit(|tr| {
        for offset in 0..MAX_TRACKED_STEPS + extra {
            tr.insert_text(2 + offset, "x")?;
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(d.doc().child(0).text_content().len(), 1 + MAX_TRACKED_STEPS + extra);
    assert!(d
        .changes()
        .all()
        .iter()
        .all(|c| c.data.is_operation(Operation::Insert)));

    // Only the tracked insertions are taken back.
    d.reject_all().unwrap();
    assert_eq!(d.doc(), &doc(vec![p("axxx")]));
}

#[test]
fn test_step_whose_range_was_deleted_later_is_skipped() {
    let mut d = document(doc(vec![p("abc")]));
    d.edit(|tr| {
        tr.insert_text(2, "XY")?;
        tr.delete(1, 5)?;
        Ok(())
    })
    .unwrap();

    // The deletion is tracked over the inserted text, which itself is not.
    assert_eq!(d.doc().child(0).text_content(), "aXYbc");
    assert_eq!(d.changes().len(), 1);
    assert!(d.changes().all()[0].data.is_operation(Operation::Delete));

    let mut rejected = d.clone();
    rejected.reject_all().unwrap();
    assert_eq!(rejected.doc(), &doc(vec![p("aXYbc")]));
    d.accept_all().unwrap();
    assert_eq!(d.doc(), &doc(vec![p("c")]));
}
