//! # Structural changes
//!
//! Changes that rearrange blocks rather than edit their content: moves
//! (a removal paired with an insertion of the same content) and
//! conversions such as wrapping, lifting or changing a node's kind.
//!
//! Conversions are stamped with a `structure` annotation whose
//! `moveNodeId` keys an entry in the [`ShadowHistory`]. Rejecting one puts
//! the recorded content back; nested conversions chain through entry
//! parents so they can be undone one at a time.

mod link;
mod moves;
mod shadow;

pub(crate) use link::{link_edit, link_structure, restamp_structure};
pub(crate) use moves::{pair_moves, MovePlan};
pub use shadow::{ShadowEntry, ShadowHistory};
pub(crate) use shadow::{container, detach, remove_entries};
