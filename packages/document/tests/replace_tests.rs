//! Integration tests for open-slice replacement

use pretty_assertions::assert_eq;
use redline_document::builders::*;
use redline_document::{Fragment, ReplaceError, Slice};

#[test]
fn test_delete_across_paragraphs_joins_them() {
    let d = doc(vec![p("abc"), p("def")]);
    let result = d.replace(2, 7, &Slice::empty()).unwrap();
    assert_eq!(result, doc(vec![p("aef")]));
}

#[test]
fn test_open_slice_splits_paragraph() {
    let d = doc(vec![p("abcd")]);
    let split = Slice::new(Fragment::from_vec(vec![p(""), p("")]), 1, 1);
    let result = d.replace(3, 3, &split).unwrap();
    assert_eq!(result, doc(vec![p("ab"), p("cd")]));
}

#[test]
fn test_replace_with_own_slice_is_identity() {
    let d = doc(vec![p("abc"), p("def")]);
    let slice = d.slice(2, 7).unwrap();
    assert_eq!(slice.content.child(1).text_content(), "d");
    let result = d.replace(2, 7, &slice).unwrap();
    assert_eq!(result, d);
}

#[test]
fn test_flat_insert_inside_nested_block() {
    let d = doc(vec![section(vec![p("ab")])]);
    let result = d
        .replace(3, 3, &Slice::closed(Fragment::from_node(text("X"))))
        .unwrap();
    assert_eq!(result, doc(vec![section(vec![p("aXb")])]));
}

#[test]
fn test_text_at_top_level_is_rejected() {
    let d = doc(vec![p("a")]);
    let err = d
        .replace(0, 0, &Slice::closed(Fragment::from_node(text("x"))))
        .unwrap_err();
    assert!(matches!(err, ReplaceError::InvalidContent { .. }));
}

#[test]
fn test_mismatched_depths_are_rejected() {
    let d = doc(vec![p("ab"), bullet_list(vec![list_item(vec![p("cd")])])]);
    let err = d.replace(2, 8, &Slice::empty()).unwrap_err();
    assert_eq!(err, ReplaceError::InconsistentOpenDepths);
}

#[test]
fn test_out_of_range_position() {
    let d = doc(vec![p("a")]);
    assert!(matches!(
        d.replace(0, 10, &Slice::empty()),
        Err(ReplaceError::PositionOutOfRange { .. })
    ));
}
