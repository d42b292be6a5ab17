//! Storage paths for permission tracking.
//!
//! A [`Place`] names a storage location: a root variable followed by a chain
//! of projections (`.field`, `[_]`, `*`, and the subslices introduced by an
//! explicit split). Places are plain values compared structurally; the
//! [`PlaceTable`] arena hands out stable [`PlaceId`]s so the permission store
//! and loan table can key on a small copyable handle.
//!
//! # Aliasing model
//!
//! [`conflicts`] is a deliberate over-approximation:
//! - distinct fields of the same parent never alias (field-sensitive)
//! - unresolved indices of the same array always alias (index-insensitive)
//! - subslices only stop aliasing once a split has introduced them

mod place;
mod table;

pub use place::{Place, PlaceDisplay, Projection, conflicts, is_prefix};
pub use table::{PlaceId, PlaceTable};
