//!
//! # Raw Cells
//!
//! Structure definitions whose bytes are loaded lazily,
//! and the dependency graph between them.
//!

// Std-Lib
use std::any::Any;
use std::cell::RefCell;
use std::convert::TryFrom;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;

// Crates.io
use by_address::ByAddress;

// Local Imports
use crate::error::*;
use crate::map::RawCellMap;
use crate::source::SharedSource;

///
/// # Raw Cell Data
///
/// Either a location in a [SharedSource], or an owned copy of the cell's bytes.
/// Conversion from the former to the latter happens at most once, via [RawCell::materialize].
///
#[derive(Debug)]
pub enum RawData {
    /// Not yet read. Holds one use of `source`.
    Source { source: SharedSource, offset: u64 },
    /// Materialized bytes, exactly the cell's serialized record sequence
    Bytes(Vec<u8>),
}

///
/// # Dependency Slot
///
/// Loading happens in two phases: each reference is first recorded by name,
/// and rewritten to point at its target once every structure in the file is known.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Unresolved(String),
    Resolved(RawCellRef),
}
impl Dependency {
    /// Get our resolved target, if we have one
    pub fn resolved(&self) -> Option<&RawCellRef> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Unresolved(_) => None,
        }
    }
    /// Name of the referenced structure
    pub fn name(&self) -> String {
        match self {
            Self::Unresolved(name) => name.clone(),
            Self::Resolved(r) => r.name(),
        }
    }
}

///
/// # Raw Cell
///
/// A GDSII structure definition, stored as its raw serialized bytes rather than decoded elements.
/// Raw cells are principally produced by [crate::read_rawcells], and can be copied
/// byte-for-byte into new GDSII streams via [RawCell::write_out] without decoding their geometry.
///
pub struct RawCell {
    /// Structure name
    pub(crate) name: String,
    /// Serialized size in bytes, including the `BGNSTR` and `ENDSTR` records
    pub(crate) size: u64,
    /// Location or content of our bytes
    pub(crate) data: RawData,
    /// Structures we instantiate
    pub(crate) dependencies: Vec<Dependency>,
    /// Path of the file we were loaded from, if any
    pub(crate) origin: Option<PathBuf>,
    /// Opaque host-side handle
    owner: Option<Rc<dyn Any>>,
}
impl RawCell {
    /// Create a new, empty, and materialized [RawCell] named `name`
    pub fn new(name: impl Into<String>) -> GdsRawResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GdsRawError::EmptyName);
        }
        Ok(Self {
            name,
            size: 0,
            data: RawData::Bytes(Vec::new()),
            dependencies: Vec::new(),
            origin: None,
            owner: None,
        })
    }
    /// Create an unnamed, unmaterialized [RawCell] at `offset` in `source`.
    /// Takes over `source`'s use.
    pub(crate) fn deferred(source: SharedSource, offset: u64, size: u64) -> Self {
        Self {
            name: String::new(),
            size,
            data: RawData::Source { source, offset },
            dependencies: Vec::new(),
            origin: None,
            owner: None,
        }
    }
    /// Structure name
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Serialized size, in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
    /// Path of the source file, if loaded from one
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
    /// Our dependency slots
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
    /// Append a dependency slot
    pub fn add_dependency(&mut self, dep: Dependency) {
        self.dependencies.push(dep)
    }
    /// Boolean indication of whether our bytes are held in memory
    pub fn is_materialized(&self) -> bool {
        matches!(self.data, RawData::Bytes(_))
    }
    /// Our bytes, if materialized
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            RawData::Bytes(b) => Some(b),
            RawData::Source { .. } => None,
        }
    }
    /// Our shared source, if not yet materialized
    pub fn source(&self) -> Option<&SharedSource> {
        match &self.data {
            RawData::Source { source, .. } => Some(source),
            RawData::Bytes(_) => None,
        }
    }
    /// Host-side handle. Cloning it out adds a reference.
    pub fn owner(&self) -> Option<Rc<dyn Any>> {
        self.owner.clone()
    }
    /// Set the host-side handle
    pub fn set_owner(&mut self, owner: Rc<dyn Any>) {
        self.owner = Some(owner)
    }
    /// Release everything we hold: name, source use or bytes, and dependencies.
    /// Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.name.clear();
        self.origin = None;
        self.size = 0;
        // Dropping a [RawData::Source] releases its use
        self.data = RawData::Bytes(Vec::new());
        self.dependencies.clear();
    }
    /// Read our bytes from our [SharedSource] into an owned buffer.
    ///
    /// No-op if already materialized. The source use is released whether or not the read succeeds;
    /// on failure we are left materialized and empty, with zero size.
    pub fn materialize(&mut self) -> GdsRawResult<()> {
        if self.is_materialized() {
            return Ok(());
        }
        let expected = self.size;
        let (source, offset) = match std::mem::replace(&mut self.data, RawData::Bytes(Vec::new())) {
            RawData::Source { source, offset } => (source, offset),
            bytes => {
                self.data = bytes;
                return Ok(());
            }
        };
        let len = match usize::try_from(expected) {
            Ok(len) => len,
            Err(_) => {
                source.release();
                self.size = 0;
                return Err(GdsRawError::SourceRead {
                    expected,
                    found: 0,
                    err: None,
                });
            }
        };
        let mut bytes = vec![0; len];
        let result = source.read_at(&mut bytes, offset);
        source.release();
        let err = match result {
            Ok(found) if found == len => {
                self.data = RawData::Bytes(bytes);
                return Ok(());
            }
            Ok(found) => GdsRawError::SourceRead {
                expected,
                found: found as u64,
                err: None,
            },
            Err(e) => GdsRawError::SourceRead {
                expected,
                found: 0,
                err: Some(e),
            },
        };
        self.size = 0;
        Err(err)
    }
    /// Write our exact serialized bytes to `dest`, materializing first if necessary.
    /// If materialization fails, nothing is written.
    pub fn write_out(&mut self, dest: &mut impl Write) -> GdsRawResult<()> {
        self.materialize()?;
        if let RawData::Bytes(bytes) = &self.data {
            dest.write_all(bytes)?;
        }
        Ok(())
    }
    /// Collect our resolved dependencies into `acc`, keyed by name.
    ///
    /// If `recursive`, each dependency's own dependencies are collected as well.
    /// Each dependency is inserted *before* recursing into it,
    /// so a cell already on the current path is never re-entered, and cyclic graphs terminate.
    pub fn get_dependencies(&self, recursive: bool, acc: &mut RawCellMap) {
        for dep in self.dependencies.iter().filter_map(Dependency::resolved) {
            let name = dep.name();
            if recursive && !acc.maps_to(&name, dep) {
                acc.insert(name, dep.clone());
                dep.borrow().get_dependencies(true, acc);
            } else {
                acc.insert(name, dep.clone());
            }
        }
    }
}
impl std::fmt::Display for RawCell {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "RawCell '{}' with {} bytes and {} dependencies",
            self.name,
            self.size,
            self.dependencies.len()
        )
    }
}
impl std::fmt::Debug for RawCell {
    /// Dependencies are listed by name, as the graph may be cyclic
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let deps: Vec<String> = self.dependencies.iter().map(Dependency::name).collect();
        f.debug_struct("RawCell")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("data", &self.data)
            .field("origin", &self.origin)
            .field("dependencies", &deps)
            .finish()
    }
}

///
/// # Raw Cell Reference
///
/// Shared pointer to a [RawCell].
/// Equality and hashing are *by address*: two references are equal only if they point to the same cell,
/// regardless of its content.
///
/// Cyclic dependency graphs hold their cells in reference-cycles,
/// which [RawCell::clear] (or [RawCellMap::clear_all]) breaks.
///
pub struct RawCellRef(ByAddress<Rc<RefCell<RawCell>>>);

impl RawCellRef {
    /// Create a new [RawCellRef], taking ownership of `cell`
    pub fn new(cell: RawCell) -> Self {
        Self(ByAddress(Rc::new(RefCell::new(cell))))
    }
    /// Clone of the referenced cell's name
    pub fn name(&self) -> String {
        self.borrow().name.clone()
    }
    /// Number of references to the cell, including this one
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
    /// Collect our dependencies into a new [RawCellMap]
    pub fn dependencies(&self, recursive: bool) -> RawCellMap {
        let mut acc = RawCellMap::new();
        self.borrow().get_dependencies(recursive, &mut acc);
        acc
    }
}
impl Deref for RawCellRef {
    type Target = RefCell<RawCell>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<RawCell> for RawCellRef {
    fn from(cell: RawCell) -> Self {
        Self::new(cell)
    }
}
impl Clone for RawCellRef {
    fn clone(&self) -> Self {
        Self(ByAddress::clone(&self.0))
    }
}
impl PartialEq for RawCellRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}
impl Eq for RawCellRef {}
impl Hash for RawCellRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}
impl std::fmt::Debug for RawCellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.try_borrow() {
            Ok(cell) => write!(f, "RawCellRef({:?})", cell.name),
            Err(_) => write!(f, "RawCellRef(<borrowed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::TrackedStream;
    use std::io::Cursor;

    /// Create a named [RawCellRef] depending on each of `deps`
    fn cell(name: &str, deps: &[&RawCellRef]) -> RawCellRef {
        let mut c = RawCell::new(name).unwrap();
        for dep in deps {
            c.add_dependency(Dependency::Resolved((*dep).clone()));
        }
        RawCellRef::new(c)
    }
    fn sorted_names(map: &RawCellMap) -> Vec<String> {
        let mut names: Vec<String> = map.names().map(String::from).collect();
        names.sort();
        names
    }

    #[test]
    fn empty_name() {
        assert!(matches!(RawCell::new(""), Err(GdsRawError::EmptyName)));
    }
    #[test]
    fn display() {
        let c = RawCell::new("inv").unwrap();
        assert_eq!(c.to_string(), "RawCell 'inv' with 0 bytes and 0 dependencies");
    }
    #[test]
    fn direct_and_recursive_dependencies() {
        let leaf = cell("leaf", &[]);
        let mid = cell("mid", &[&leaf]);
        let top = cell("top", &[&mid, &leaf]);

        let direct = top.dependencies(false);
        assert_eq!(sorted_names(&direct), vec!["leaf", "mid"]);
        let direct = mid.dependencies(false);
        assert_eq!(sorted_names(&direct), vec!["leaf"]);

        let all = top.dependencies(true);
        assert_eq!(sorted_names(&all), vec!["leaf", "mid"]);
        assert!(all.maps_to("leaf", &leaf));
    }
    #[test]
    fn mutual_cycle_terminates() {
        let a = RawCellRef::new(RawCell::new("A").unwrap());
        let b = cell("B", &[&a]);
        a.borrow_mut().add_dependency(Dependency::Resolved(b.clone()));

        let deps = a.dependencies(true);
        assert_eq!(sorted_names(&deps), vec!["A", "B"]);
        assert!(deps.maps_to("A", &a));
        assert!(deps.maps_to("B", &b));

        // Break the reference-cycle
        a.borrow_mut().clear();
        b.borrow_mut().clear();
    }
    #[test]
    fn self_reference_terminates() {
        let a = RawCellRef::new(RawCell::new("A").unwrap());
        a.borrow_mut().add_dependency(Dependency::Resolved(a.clone()));
        let deps = a.dependencies(true);
        assert_eq!(sorted_names(&deps), vec!["A"]);
        a.borrow_mut().clear();
    }
    #[test]
    fn same_name_distinct_cells_are_not_equal() {
        let x1 = cell("x", &[]);
        let x2 = cell("x", &[]);
        assert_ne!(x1, x2);
        assert_eq!(x1, x1.clone());
    }
    #[test]
    fn materialize_and_write_out() -> GdsRawResult<()> {
        let bytes: Vec<u8> = (0u8..32).collect();
        let src = SharedSource::new(Cursor::new(bytes.clone()));
        let mut c = RawCell::deferred(src.acquire(), 8, 12);
        assert!(!c.is_materialized());
        assert_eq!(src.uses(), 2);

        let mut out = Vec::new();
        c.write_out(&mut out)?;
        assert_eq!(out, &bytes[8..20]);
        assert!(c.is_materialized());
        assert_eq!(src.uses(), 1);

        // Again, now from memory
        let mut out = Vec::new();
        c.write_out(&mut out)?;
        assert_eq!(out, &bytes[8..20]);
        Ok(())
    }
    #[test]
    fn short_read_degrades() {
        let (stream, closed) = TrackedStream::new(vec![0; 10]);
        let src = SharedSource::new(stream);
        let mut c = RawCell::deferred(src.acquire(), 4, 100);
        src.release();

        match c.materialize() {
            Err(GdsRawError::SourceRead {
                expected: 100,
                found: 6,
                ..
            }) => (),
            other => panic!("expected SourceRead, got {:?}", other),
        }
        // Degraded, but consistent: materialized, empty, and no longer holding the source
        assert!(c.is_materialized());
        assert_eq!(c.size(), 0);
        assert_eq!(c.bytes(), Some(&[][..]));
        assert!(closed.get());

        // Writing now succeeds, with nothing to write
        let mut out = Vec::new();
        assert!(c.write_out(&mut out).is_ok());
        assert!(out.is_empty());
    }
    #[test]
    fn read_failure_releases_source() {
        /// Stream whose every read fails
        struct Unreadable;
        impl std::io::Read for Unreadable {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "unreadable"))
            }
        }
        impl std::io::Seek for Unreadable {
            fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
                Ok(0)
            }
        }
        let src = SharedSource::new(Unreadable);
        let mut c = RawCell::deferred(src.acquire(), 0, 8);
        assert_eq!(src.uses(), 2);
        match c.materialize() {
            Err(GdsRawError::SourceRead {
                expected: 8,
                found: 0,
                err: Some(_),
            }) => (),
            other => panic!("expected SourceRead, got {:?}", other),
        }
        assert_eq!(src.uses(), 1);
        assert!(c.is_materialized());
        assert_eq!(c.size(), 0);
    }
    #[test]
    fn clear_is_idempotent() {
        let (stream, closed) = TrackedStream::new(vec![0; 10]);
        let mut c = RawCell::deferred(SharedSource::new(stream), 0, 4);
        c.name = "c".into();
        c.add_dependency(Dependency::Unresolved("other".into()));
        c.clear();
        assert!(closed.get());
        assert_eq!(c.name(), "");
        assert_eq!(c.size(), 0);
        assert!(c.dependencies().is_empty());
        assert!(c.is_materialized());
        c.clear();
        assert!(c.is_materialized());
    }
    #[test]
    fn owner_handles() {
        let mut c = RawCell::new("c").unwrap();
        assert!(c.owner().is_none());
        let host: Rc<dyn Any> = Rc::new(5_i32);
        c.set_owner(Rc::clone(&host));
        let o = c.owner().unwrap();
        assert_eq!(Rc::strong_count(&host), 3);
        assert_eq!(o.downcast_ref::<i32>(), Some(&5));
    }
}
