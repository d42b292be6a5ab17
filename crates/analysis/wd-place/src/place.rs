//! Place values and the structural conflict relation.

use std::fmt;

use serde::{Deserialize, Serialize};
use wd_intern::{Interner, Symbol};

/// One step from a place to a location nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Named field of a struct (`p.name`).
    Field(Symbol),
    /// Element of an array or slice at an index the checker cannot resolve.
    ///
    /// Every `Index` of the same array is the same location as far as the
    /// checker is concerned.
    Index,
    /// Dereference of a pointer-like value (`*p`).
    Deref,
    /// Half-open element range `[from, to)` of an array, `to = None` meaning
    /// "to the end". Only meaningful after a split registered the range.
    Subslice {
        /// First element of the range.
        from: u64,
        /// One past the last element, or `None` for an open end.
        to: Option<u64>,
    },
}

impl Projection {
    /// Returns `true` if the two projections, applied to the same parent,
    /// can never reach overlapping storage.
    #[must_use]
    pub fn is_disjoint_from(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Field(a), Self::Field(b)) => a != b,
            (
                Self::Subslice { from: a_from, to: a_to },
                Self::Subslice { from: b_from, to: b_to },
            ) => {
                let a_before_b = a_to.is_some_and(|end| end <= *b_from);
                let b_before_a = b_to.is_some_and(|end| end <= *a_from);
                a_before_b || b_before_a
            }
            // Indices collapse onto each other and onto any subslice.
            _ => false,
        }
    }
}

/// A storage location: a root variable plus a projection chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    /// Root variable name.
    pub root: Symbol,
    /// Projections applied to the root, outermost first.
    pub projection: Vec<Projection>,
}

impl Place {
    /// Creates the place naming a whole variable.
    #[must_use]
    pub fn root(root: Symbol) -> Self {
        Self {
            root,
            projection: Vec::new(),
        }
    }

    /// Returns a new place with `elem` appended.
    #[must_use]
    pub fn project(&self, elem: Projection) -> Self {
        let mut projection = Vec::with_capacity(self.projection.len() + 1);
        projection.extend_from_slice(&self.projection);
        projection.push(elem);
        Self {
            root: self.root,
            projection,
        }
    }

    /// `self.name`
    #[must_use]
    pub fn field(&self, name: Symbol) -> Self {
        self.project(Projection::Field(name))
    }

    /// `self[_]`
    #[must_use]
    pub fn index(&self) -> Self {
        self.project(Projection::Index)
    }

    /// `*self`
    #[must_use]
    pub fn deref(&self) -> Self {
        self.project(Projection::Deref)
    }

    /// `self[from..to]`
    #[must_use]
    pub fn subslice(&self, from: u64, to: Option<u64>) -> Self {
        self.project(Projection::Subslice { from, to })
    }

    /// The two halves a split at `boundary` produces: `self[..boundary]` and
    /// `self[boundary..]`.
    ///
    /// This only builds the paths. They stay aliased with everything until
    /// the checker has registered the split.
    #[must_use]
    pub fn split_halves(&self, boundary: u64) -> (Self, Self) {
        (
            self.subslice(0, Some(boundary)),
            self.subslice(boundary, None),
        )
    }

    /// Returns `true` for a bare variable with no projections.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.projection.is_empty()
    }

    /// Every strict prefix of this place, innermost (longest) first.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> + '_ {
        (0..self.projection.len()).rev().map(|len| Self {
            root: self.root,
            projection: self.projection[..len].to_vec(),
        })
    }

    /// Each subslice projection in this place together with the array it was
    /// taken from, outermost first.
    pub fn subslices(&self) -> impl Iterator<Item = (Self, u64, Option<u64>)> + '_ {
        self.projection
            .iter()
            .enumerate()
            .filter_map(|(idx, elem)| match elem {
                Projection::Subslice { from, to } => Some((
                    Self {
                        root: self.root,
                        projection: self.projection[..idx].to_vec(),
                    },
                    *from,
                    *to,
                )),
                _ => None,
            })
    }

    /// Renders the place with names resolved through `interner`.
    #[must_use]
    pub fn display<'a>(&'a self, interner: &'a Interner) -> PlaceDisplay<'a> {
        PlaceDisplay {
            place: self,
            interner,
        }
    }
}

/// Returns `true` if `prefix` equals `place` or is one of its ancestors.
#[must_use]
pub fn is_prefix(prefix: &Place, place: &Place) -> bool {
    prefix.root == place.root && place.projection.starts_with(&prefix.projection)
}

/// Returns `true` if the two places may name overlapping storage.
///
/// Walks the shared part of both projection chains; the places are apart as
/// soon as one pair of projections is provably disjoint. Running out of
/// projections on either side means one place contains the other.
///
/// # Examples
///
/// ```rust
/// use wd_intern::Interner;
/// use wd_place::{Place, conflicts};
///
/// let interner = Interner::new();
/// let a = Place::root(interner.intern("a"));
/// let ax = a.field(interner.intern("x"));
/// let ay = a.field(interner.intern("y"));
///
/// assert!(conflicts(&a, &ax));
/// assert!(!conflicts(&ax, &ay));
/// assert!(conflicts(&a.index(), &a.index()));
/// ```
#[must_use]
pub fn conflicts(a: &Place, b: &Place) -> bool {
    if a.root != b.root {
        return false;
    }

    !a.projection
        .iter()
        .zip(&b.projection)
        .any(|(left, right)| left.is_disjoint_from(right))
}

/// [`Place`] paired with an interner for display.
pub struct PlaceDisplay<'a> {
    place: &'a Place,
    interner: &'a Interner,
}

impl fmt::Display for PlaceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = self.interner.resolve(&self.place.root);
        let mut bare_deref = false;

        for elem in &self.place.projection {
            if bare_deref {
                rendered = format!("({rendered})");
                bare_deref = false;
            }
            match elem {
                Projection::Field(name) => {
                    rendered.push('.');
                    rendered.push_str(&self.interner.resolve(name));
                }
                Projection::Index => rendered.push_str("[_]"),
                Projection::Deref => {
                    rendered.insert(0, '*');
                    bare_deref = true;
                }
                Projection::Subslice { from, to } => {
                    let from = if *from == 0 {
                        String::new()
                    } else {
                        from.to_string()
                    };
                    let to = to.map(|to| to.to_string()).unwrap_or_default();
                    rendered.push_str(&format!("[{from}..{to}]"));
                }
            }
        }

        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Interner, Place) {
        let interner = Interner::new();
        let a = Place::root(interner.intern("a"));
        (interner, a)
    }

    #[test]
    fn test_project_is_structural() {
        let (interner, a) = setup();
        let x = interner.intern("x");
        assert_eq!(a.field(x), a.field(x));
        assert_ne!(a.field(x), a.index());
    }

    #[test]
    fn test_prefix_conflicts() {
        let (interner, a) = setup();
        let ax = a.field(interner.intern("x"));
        assert!(is_prefix(&a, &ax));
        assert!(!is_prefix(&ax, &a));
        assert!(conflicts(&a, &ax));
        assert!(conflicts(&ax, &a));
        assert!(conflicts(&ax, &ax));
    }

    #[test]
    fn test_field_sensitivity() {
        let (interner, a) = setup();
        let ax = a.field(interner.intern("x"));
        let ay = a.field(interner.intern("y"));
        assert!(!conflicts(&ax, &ay));
        assert!(!conflicts(&ax.deref(), &ay.index()));
    }

    #[test]
    fn test_different_roots_never_conflict() {
        let (interner, a) = setup();
        let b = Place::root(interner.intern("b"));
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_indices_collapse() {
        let (_interner, arr) = setup();
        assert!(conflicts(&arr.index(), &arr.index()));
        assert!(conflicts(&arr, &arr.index()));
    }

    #[test]
    fn test_split_halves_are_disjoint() {
        let (_interner, arr) = setup();
        let (left, right) = arr.split_halves(2);
        assert!(!conflicts(&left, &right));
        assert!(!conflicts(&left.index(), &right.index()));
        assert!(conflicts(&arr.index(), &left.index()));
        assert!(conflicts(&arr, &right));
    }

    #[test]
    fn test_overlapping_subslices_conflict() {
        let (_interner, arr) = setup();
        assert!(conflicts(&arr.subslice(0, Some(3)), &arr.subslice(2, None)));
        assert!(!conflicts(&arr.subslice(0, Some(0)), &arr.subslice(0, None)));
    }

    #[test]
    fn test_ancestors_and_subslices() {
        let (interner, a) = setup();
        let x = interner.intern("x");
        let place = a.field(x).subslice(1, Some(4)).index();

        let ancestors: Vec<_> = place.ancestors().collect();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[2], a);
        assert_eq!(ancestors[0], a.field(x).subslice(1, Some(4)));

        let subslices: Vec<_> = place.subslices().collect();
        assert_eq!(subslices, vec![(a.field(x), 1, Some(4))]);
    }

    #[test]
    fn test_display() {
        let (interner, a) = setup();
        let x = interner.intern("x");
        assert_eq!(a.field(x).index().display(&interner).to_string(), "a.x[_]");
        assert_eq!(a.deref().display(&interner).to_string(), "*a");
        assert_eq!(a.deref().field(x).display(&interner).to_string(), "(*a).x");
        assert_eq!(a.subslice(0, Some(2)).display(&interner).to_string(), "a[..2]");
        assert_eq!(a.subslice(2, None).display(&interner).to_string(), "a[2..]");
    }
}
