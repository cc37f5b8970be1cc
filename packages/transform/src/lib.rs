//! # Redline transforms
//!
//! Steps, position mappings and the [`Transform`] that strings them together
//! into an edit. The change tracker consumes a finished transform and
//! appends steps of its own.

pub mod step;
pub mod step_map;
pub mod structure;
pub mod transform;

pub use step::{
    content_between, AddMarkStep, AddNodeMarkStep, AttrStep, RemoveMarkStep, RemoveNodeMarkStep,
    ReplaceAroundStep, ReplaceStep, Step, StepError, StepResult,
};
pub use step_map::{MapRange, MapResult, Mapping, StepMap};
pub use structure::{block_range_at, can_join, can_split, lift_target};
pub use transform::Transform;
