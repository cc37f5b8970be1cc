//! # Redline tracker
//!
//! Track changes for redline documents: every edit is recorded as pending,
//! attributable annotations instead of being applied outright, and each
//! change can later be accepted or rejected on its own.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ host edit: Transform of raw steps           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ track: undo each step, redo it annotated    │
//! │  - merge: deletion / insertion planning     │
//! │  - structure: moves, splits, conversions    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ changes: discover the logical change set    │
//! │ repair: fix malformed annotations           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ dispose: accept / reject, apply decisions   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The document is the source of truth**: annotations live in node
//!    attributes and marks; the change set is always rediscovered
//! 2. **Nothing is lost while pending**: deleted content stays visible,
//!    replaced structure is kept in the shadow history
//! 3. **Own unreviewed work is free**: an author editing their own pending
//!    insertion changes it in place
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redline_tracker::{Status, TrackConfig, TrackedDocument};
//!
//! let mut document = TrackedDocument::new(doc, TrackConfig::new("alice"))?;
//! document.edit(|tr| tr.insert_text(2, "new").map(|_| ()))?;
//!
//! let id = document.changes().pending()[0].id.clone();
//! document.set_change_status(&[id.as_str()], Status::Accepted)?;
//! ```

pub mod annotation;
pub mod changes;
pub mod config;
pub mod context;
pub mod dispose;
pub mod document;
pub mod error;
mod merge;
pub mod repair;
mod store;
pub mod structure;
pub mod track;

pub use annotation::{Operation, Status, TrackedAttrs, WrapDirection};
pub use changes::{discover, AnnotationSource, Change, ChangeKind, ChangeSet};
pub use config::{TrackConfig, TrackingStatus};
pub use context::TrackContext;
pub use dispose::{apply_changes, set_status};
pub use document::TrackedDocument;
pub use error::{TrackError, TrackResult};
pub use repair::repair;
pub use structure::{ShadowEntry, ShadowHistory};
pub use track::{track, MAX_TRACKED_STEPS, STRUCTURE_ACTION_META};
