use thiserror::Error;

pub type ReplaceResult<T> = Result<T, ReplaceError>;

/// Failure modes of position resolution and structural replacement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplaceError {
    #[error("Position {pos} out of range (size {size})")]
    PositionOutOfRange { pos: usize, size: usize },

    #[error("Inserted content deeper than insertion position")]
    SliceTooDeep,

    #[error("Inconsistent open depths")]
    InconsistentOpenDepths,

    #[error("Cannot join {sub} onto {main}")]
    CannotJoin { main: String, sub: String },

    #[error("Invalid content for node {kind}")]
    InvalidContent { kind: String },

    #[error("Removing non-flat range")]
    NonFlatRange,

    #[error("No node at position {0}")]
    NoNodeAt(usize),
}

impl ReplaceError {
    pub fn out_of_range(pos: usize, size: usize) -> Self {
        Self::PositionOutOfRange { pos, size }
    }

    pub fn invalid_content(kind: impl Into<String>) -> Self {
        Self::InvalidContent { kind: kind.into() }
    }
}
