//! Logical changes derived from annotations.

mod change;
mod change_set;
mod discover;

pub use change::{AnnotationSource, Change, ChangeKind};
pub use change_set::ChangeSet;
pub use discover::discover;

