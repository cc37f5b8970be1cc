//! Error types for the change tracker

use redline_document::ReplaceError;
use redline_transform::StepError;
use thiserror::Error;

pub type TrackResult<T> = Result<T, TrackError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("Document is read-only")]
    ReadOnly,

    /// A structural change refers to a history entry that does not exist.
    /// The document is corrupt; this is never an ordinary editing race.
    #[error("Shadow history has no entry for move node {0}")]
    MissingShadowEntry(String),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Replace error: {0}")]
    Replace(#[from] ReplaceError),

    #[error("No node at position {0}")]
    NoNodeAt(usize),
}
