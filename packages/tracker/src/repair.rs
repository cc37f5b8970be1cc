//! Bring malformed annotations back into shape.
//!
//! Documents arrive from storage, other clients and older versions of the
//! tracker. An annotation that cannot say what it records is dropped; one
//! that only lacks bookkeeping gets it filled in, and an id already used
//! elsewhere in the document is replaced by a fresh one.

use crate::annotation::{node_annotations, Operation, Status, TrackedAttrs};
use crate::changes::{AnnotationSource, Change, ChangeSet};
use crate::context::TrackContext;
use crate::error::TrackResult;
use crate::store::{node_at, rewrite_annotation, set_node_annotations};
use redline_document::Node;
use redline_transform::Transform;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, warn};

/// What repair does with one annotation.
#[derive(Debug, Clone, PartialEq)]
enum Fix {
    Keep,
    Drop,
    Replace(TrackedAttrs),
}

/// The fixed annotation for `change`, given the ids already in use.
fn fix(change: &Change, seen: &mut HashSet<String>, ctx: &mut TrackContext) -> Fix {
    let data = &change.data;
    if !data.has_operation_fields() {
        warn!(id = %change.id, operation = ?data.operation, "annotation without operation data dropped");
        return Fix::Drop;
    }
    let mut fixed = data.clone();
    if change.id.is_empty() || seen.contains(&change.id) {
        fixed.id = Some(ctx.new_id());
    }
    let now = ctx.now();
    fixed.author_id.get_or_insert_with(|| ctx.author_id.clone());
    fixed.status.get_or_insert(Status::Pending);
    let created = *fixed.created_at.get_or_insert(now);
    fixed.updated_at.get_or_insert(created);
    fixed.status_update_at.get_or_insert(0);
    seen.insert(fixed.id().to_string());
    if fixed == *data {
        Fix::Keep
    } else {
        debug!(id = %change.id, fixed = %fixed.id(), "annotation repaired");
        Fix::Replace(fixed)
    }
}

/// A transform repairing every malformed annotation in `doc`, or `None`
/// when `changes` (discovered from `doc`) shows nothing to repair.
#[instrument(level = "debug", skip_all)]
pub fn repair(
    doc: &Node,
    changes: &ChangeSet,
    ctx: &mut TrackContext,
) -> TrackResult<Option<Transform>> {
    if !changes.is_malformed() {
        return Ok(None);
    }
    let mut tr = Transform::new(doc.clone());
    let mut seen = HashSet::new();
    // Node annotation lists are rewritten whole, one node at a time.
    let mut node_fixes: BTreeMap<usize, Vec<Fix>> = BTreeMap::new();

    for change in changes.all() {
        let outcome = fix(change, &mut seen, ctx);
        if change.source == AnnotationSource::Node {
            node_fixes.entry(change.from).or_default().push(outcome);
            continue;
        }
        match outcome {
            Fix::Keep => {}
            Fix::Drop => {
                rewrite_annotation(&mut tr, change.source, change.from, change.to, &change.id, None)?
            }
            Fix::Replace(fixed) => rewrite_annotation(
                &mut tr,
                change.source,
                change.from,
                change.to,
                &change.id,
                Some(&fixed),
            )?,
        }
    }

    for (pos, fixes) in node_fixes {
        if fixes.iter().all(|f| *f == Fix::Keep) {
            continue;
        }
        let mut fixes = fixes.into_iter();
        let mut rebuilt = Vec::new();
        for annotation in node_annotations(&node_at(&tr, pos)?) {
            // Linkage annotations never become changes and are kept as is.
            if annotation.is_operation(Operation::Reference) {
                rebuilt.push(annotation);
                continue;
            }
            match fixes.next() {
                Some(Fix::Keep) | None => rebuilt.push(annotation),
                Some(Fix::Replace(fixed)) => rebuilt.push(fixed),
                Some(Fix::Drop) => {}
            }
        }
        set_node_annotations(&mut tr, pos, &rebuilt)?;
    }
    Ok(Some(tr))
}
