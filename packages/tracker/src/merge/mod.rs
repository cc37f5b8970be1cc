//! # Merge/split engine
//!
//! Turns a raw deletion plus replacement slice into annotated content
//! without destroying structure that only partially overlaps the edit.
//!
//! ## Design
//!
//! Two phases, so tree walks never observe their own mutations:
//!
//! 1. [`plan_deletion`] and [`plan_insertion`] walk an immutable snapshot and
//!    emit [`ChangeStep`]s whose positions refer to that snapshot
//! 2. [`apply_change_steps`] applies them in order, mapping every position
//!    forward through the steps already applied
//!
//! Text the author inserted and nobody has reviewed yet is removed
//! physically; everything else is tagged as deleted and stays visible.

mod apply;
mod plan;
mod tag;

pub(crate) use apply::{apply_change_steps, set_plain_attrs};
pub(crate) use plan::{plan_deletion, plan_insertion};

use crate::annotation::TrackedAttrs;
use redline_document::{Fragment, Slice};

/// A primitive edit produced by the planner.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChangeStep {
    /// Tag text as deleted, or remove it when `attrs` is `None`.
    DeleteText {
        from: usize,
        to: usize,
        attrs: Option<TrackedAttrs>,
    },
    /// Tag a whole node as deleted, or remove it when `attrs` is `None`.
    DeleteNode {
        pos: usize,
        size: usize,
        attrs: Option<TrackedAttrs>,
    },
    /// Splice already-tagged inline content into an existing textblock.
    MergeFragment { pos: usize, content: Fragment },
    /// Insert tagged content. With `split` set, the slice is open and splits
    /// the surrounding nodes; both halves get linked under that id.
    InsertSlice {
        pos: usize,
        slice: Slice,
        split: Option<String>,
    },
}
