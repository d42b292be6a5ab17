//! Arena of interned places.

use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

use crate::place::Place;

/// Stable handle for an interned [`Place`].
pub type PlaceId = Idx<Place>;

/// Interns places so structurally equal places share one [`PlaceId`].
///
/// Places are never removed: a retired path keeps its id so diagnostics can
/// still name it.
#[derive(Debug, Default)]
pub struct PlaceTable {
    places: Arena<Place>,
    ids: FxHashMap<Place, PlaceId>,
}

impl PlaceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `place`, allocating one on first sight.
    pub fn intern(&mut self, place: &Place) -> PlaceId {
        if let Some(&id) = self.ids.get(place) {
            return id;
        }
        let id = self.places.alloc(place.clone());
        self.ids.insert(place.clone(), id);
        id
    }

    /// Returns the id of an already interned place.
    #[must_use]
    pub fn get(&self, place: &Place) -> Option<PlaceId> {
        self.ids.get(place).copied()
    }

    /// Returns the place behind `id`.
    #[must_use]
    pub fn lookup(&self, id: PlaceId) -> &Place {
        &self.places[id]
    }

    /// Number of distinct places seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.places.len()
    }

    /// Returns `true` if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}
