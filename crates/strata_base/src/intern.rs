//! Atom interning for O(1) identifier equality comparison.
//!
//! Atoms are lightweight integer handles that point to interned strings.
//! By storing each unique identifier exactly once and comparing integer
//! handles, equality of identifiers becomes equality of handles rather
//! than a string comparison.
//!
//! ## Example
//!
//! ```
//! use strata_base::{AtomTable, Atom};
//!
//! let mut atoms = AtomTable::new();
//!
//! let a1 = atoms.intern("hello");
//! let a2 = atoms.intern("hello");  // Same string
//! let a3 = atoms.intern("world");  // Different string
//!
//! // Same strings produce same atoms (O(1) comparison)
//! assert_eq!(a1, a2);
//! assert_ne!(a1, a3);
//!
//! // Resolve back to strings when needed
//! assert_eq!(atoms.resolve(a1), "hello");
//! ```
//!
//! ## Use cases
//!
//! - **Identifiers**: compared during name resolution and scope lookup
//! - **Keywords**: compared during lexing
//! - **Struct/enum/function names**: compared when building the type table

use std::collections::HashMap;

/// A lightweight handle to an interned identifier string.
///
/// Atoms are `Copy` and compare in O(1) time regardless of string length.
/// Use [`AtomTable::resolve`] to retrieve the original string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Atom(u32);

impl Atom {
    /// The empty string atom, always at index 0.
    pub const EMPTY: Atom = Atom(0);

    /// Returns the internal index of this atom.
    ///
    /// Useful for dense storage (e.g., indexing into a `Vec` instead of a `HashMap`).
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Atom {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// The atom table: interns identifier strings to unique integer handles,
/// scoped to a single compiler instance.
///
/// Each unique string is stored exactly once. Interning the same string
/// twice returns the same atom, enabling fast equality checks by comparing
/// integers instead of bytes.
pub struct AtomTable {
    map: HashMap<String, Atom>,
    vec: Vec<String>,
}

impl AtomTable {
    /// Creates an atom table with only the empty string pre-interned.
    pub fn new() -> Self {
        let mut atoms = AtomTable {
            map: HashMap::new(),
            vec: Vec::new(),
        };
        atoms.vec.push(String::new());
        atoms
    }

    /// Interns a string, returning its atom.
    ///
    /// Returns the existing atom if the string was already interned.
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(&atom) = self.map.get(s) {
            return atom;
        }
        let atom = Atom(self.vec.len() as u32);
        self.vec.push(s.to_string());
        self.map.insert(s.to_string(), atom);
        atom
    }

    /// Returns the string for the given atom.
    ///
    /// # Panics
    ///
    /// Panics if `atom` was not created by this table.
    pub fn resolve(&self, atom: Atom) -> &str {
        &self.vec[atom.0 as usize]
    }

    /// Looks up an existing interned string without creating a new entry.
    ///
    /// Returns `None` if the string has not been interned.
    pub fn lookup(&self, s: &str) -> Option<Atom> {
        self.map.get(s).copied()
    }

    /// Returns the number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Returns `true` if no strings have been interned (only the empty string is present).
    pub fn is_empty(&self) -> bool {
        self.vec.len() <= 1
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience trait for comparing an [`Atom`] to a string literal.
///
/// Avoids the need to call `atoms.resolve(atom) == "..."` repeatedly.
pub trait AtomEq {
    /// Returns `true` if this atom resolves to the given string.
    fn is(&self, atoms: &AtomTable, s: &str) -> bool;
}

impl AtomEq for Atom {
    #[inline]
    fn is(&self, atoms: &AtomTable, s: &str) -> bool {
        atoms.resolve(*self) == s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_atom_for_same_string() {
        let mut atoms = AtomTable::new();
        let a1 = atoms.intern("hello");
        let a2 = atoms.intern("hello");
        assert_eq!(a1, a2);
    }

    #[test]
    fn intern_returns_different_atoms_for_different_strings() {
        let mut atoms = AtomTable::new();
        let a1 = atoms.intern("hello");
        let a2 = atoms.intern("world");
        assert_ne!(a1, a2);
    }

    #[test]
    fn resolve_returns_original_string() {
        let mut atoms = AtomTable::new();
        let a = atoms.intern("test");
        assert_eq!(atoms.resolve(a), "test");
    }

    #[test]
    fn empty_atom_resolves_to_empty_string() {
        let atoms = AtomTable::new();
        assert_eq!(atoms.resolve(Atom::EMPTY), "");
    }

    #[test]
    fn atoms_are_copy() {
        let mut atoms = AtomTable::new();
        let a1 = atoms.intern("copy_test");
        let a2 = a1;
        assert_eq!(a1, a2);
        assert_eq!(atoms.resolve(a1), atoms.resolve(a2));
    }

    #[test]
    fn atom_equality_is_fast() {
        let mut atoms = AtomTable::new();
        let a1 = atoms.intern("a_very_long_identifier_that_would_be_slow_to_compare");
        let a2 = atoms.intern("a_very_long_identifier_that_would_be_slow_to_compare");
        assert_eq!(a1, a2);
    }

    #[test]
    fn len_tracks_interned_count() {
        let mut atoms = AtomTable::new();
        assert_eq!(atoms.len(), 1);
        atoms.intern("first");
        assert_eq!(atoms.len(), 2);
        atoms.intern("second");
        assert_eq!(atoms.len(), 3);
        atoms.intern("first");
        assert_eq!(atoms.len(), 3);
    }

    #[test]
    fn is_empty_after_new() {
        let atoms = AtomTable::new();
        assert!(atoms.is_empty());
    }

    #[test]
    fn not_empty_after_intern() {
        let mut atoms = AtomTable::new();
        atoms.intern("something");
        assert!(!atoms.is_empty());
    }

    #[test]
    fn atom_index_matches_position() {
        let mut atoms = AtomTable::new();
        let a1 = atoms.intern("first");
        let a2 = atoms.intern("second");
        assert_eq!(a1.index(), 1);
        assert_eq!(a2.index(), 2);
    }

    #[test]
    fn atom_is_matches_interned_string() {
        let mut atoms = AtomTable::new();
        let a = atoms.intern("test");
        assert!(a.is(&atoms, "test"));
    }

    #[test]
    fn atom_is_rejects_different_string() {
        let mut atoms = AtomTable::new();
        let a = atoms.intern("hello");
        assert!(!a.is(&atoms, "world"));
    }

    #[test]
    fn atom_is_case_sensitive() {
        let mut atoms = AtomTable::new();
        let a = atoms.intern("Test");
        assert!(!a.is(&atoms, "test"));
        assert!(a.is(&atoms, "Test"));
    }

    #[test]
    fn atom_empty_is_empty_string() {
        let atoms = AtomTable::new();
        assert!(Atom::EMPTY.is(&atoms, ""));
    }
}
