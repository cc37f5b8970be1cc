//! # Redline document model
//!
//! An immutable, schema-checked document tree addressed by integer
//! positions. Everything the change tracker reads or rewrites goes through
//! the types here: [`Node`], [`Fragment`], [`Slice`] and [`ResolvedPos`].

pub mod builders;
pub mod error;
pub mod fragment;
pub mod hash;
pub mod mark;
pub mod node;
pub mod replace;
pub mod resolved;
pub mod schema;
pub mod slice;

pub use error::{ReplaceError, ReplaceResult};
pub use fragment::Fragment;
pub use hash::{content_hash, strip_tracking, TRACKED_ATTR};
pub use mark::{Attrs, Mark};
pub use node::Node;
pub use resolved::{NodeRange, ResolvedPos};
pub use schema::{MarkKind, NodeKind};
pub use slice::Slice;
