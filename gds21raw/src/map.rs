//!
//! # Name-Keyed Raw-Cell Map
//!

// Std-Lib
use std::any::Any;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::rc::Rc;

// Local Imports
use crate::cell::RawCellRef;

///
/// # Raw Cell Map
///
/// Mapping from structure name to [RawCellRef].
/// Serves both as the whole-file structure index produced by [crate::read_rawcells],
/// and as the accumulator for dependency queries.
///
/// Keys are unique. Iteration runs in name order,
/// which carries no meaning beyond keeping reports reproducible.
///
#[derive(Debug, Default, Clone)]
pub struct RawCellMap(BTreeMap<String, RawCellRef>);

impl RawCellMap {
    /// Create a new and empty [RawCellMap]
    pub fn new() -> Self {
        Self::default()
    }
    /// Insert `cell` under `name`, returning any cell it replaces
    pub fn insert(&mut self, name: impl Into<String>, cell: RawCellRef) -> Option<RawCellRef> {
        self.0.insert(name.into(), cell)
    }
    /// Get the cell named `name`
    pub fn get(&self, name: &str) -> Option<&RawCellRef> {
        self.0.get(name)
    }
    /// Remove and return the cell named `name`
    pub fn remove(&mut self, name: &str) -> Option<RawCellRef> {
        self.0.remove(name)
    }
    /// Boolean indication of whether `name` is a key
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
    /// Boolean indication of whether `name` maps to exactly `cell`, by address
    pub fn maps_to(&self, name: &str, cell: &RawCellRef) -> bool {
        self.0.get(name) == Some(cell)
    }
    /// Number of cells
    pub fn len(&self) -> usize {
        self.0.len()
    }
    /// Boolean indication of emptiness
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Iterator over names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
    /// Iterator over cells
    pub fn cells(&self) -> impl Iterator<Item = &RawCellRef> {
        self.0.values()
    }
    /// Iterator over (name, cell) pairs
    pub fn iter(&self) -> btree_map::Iter<'_, String, RawCellRef> {
        self.0.iter()
    }
    /// Host-side handles of every cell which has one. Each is a new reference.
    pub fn owners(&self) -> Vec<Rc<dyn Any>> {
        self.cells().filter_map(|c| c.borrow().owner()).collect()
    }
    /// Clear every cell, then empty the map.
    /// Releases all source uses and breaks any dependency cycles.
    pub fn clear_all(&mut self) {
        for cell in self.0.values() {
            cell.borrow_mut().clear();
        }
        self.0.clear();
    }
}
impl<'m> IntoIterator for &'m RawCellMap {
    type Item = (&'m String, &'m RawCellRef);
    type IntoIter = btree_map::Iter<'m, String, RawCellRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Dependency, RawCell};

    #[test]
    fn keyed_by_name() {
        let a = RawCellRef::new(RawCell::new("a").unwrap());
        let a2 = RawCellRef::new(RawCell::new("a").unwrap());
        let mut map = RawCellMap::new();
        assert!(map.insert("a", a.clone()).is_none());
        assert!(map.maps_to("a", &a));
        assert!(!map.maps_to("a", &a2));
        // Re-inserting replaces, rather than duplicates
        assert_eq!(map.insert("a", a2.clone()), Some(a));
        assert_eq!(map.len(), 1);
        assert!(map.maps_to("a", &a2));
        assert!(map.contains("a"));
        assert!(!map.contains("b"));
    }
    #[test]
    fn clear_all_breaks_cycles() {
        let a = RawCellRef::new(RawCell::new("a").unwrap());
        let b = RawCellRef::new(RawCell::new("b").unwrap());
        a.borrow_mut().add_dependency(Dependency::Resolved(b.clone()));
        b.borrow_mut().add_dependency(Dependency::Resolved(a.clone()));
        let mut map = RawCellMap::new();
        map.insert("a", a.clone());
        map.insert("b", b.clone());
        assert_eq!(a.ref_count(), 3);

        map.clear_all();
        assert!(map.is_empty());
        assert!(a.borrow().dependencies().is_empty());
        assert_eq!(a.ref_count(), 1);
    }
    #[test]
    fn owners() {
        let a = RawCellRef::new(RawCell::new("a").unwrap());
        let b = RawCellRef::new(RawCell::new("b").unwrap());
        let host: Rc<dyn Any> = Rc::new("host-a");
        a.borrow_mut().set_owner(host.clone());
        let mut map = RawCellMap::new();
        map.insert("a", a);
        map.insert("b", b);
        let owners = map.owners();
        assert_eq!(owners.len(), 1);
        assert!(Rc::ptr_eq(&owners[0], &host));
    }
}
