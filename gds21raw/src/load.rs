//!
//! # Whole-File Raw-Cell Loading
//!

// Std-Lib
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

// Local Imports
use crate::cell::{Dependency, RawCell, RawCellRef};
use crate::data::GdsRecordType;
use crate::diag::Diagnostics;
use crate::error::*;
use crate::map::RawCellMap;
use crate::read::{GdsRecordReader, READER_BUFSIZE};
use crate::source::SharedSource;

/// Load every structure in the GDSII file at `path` as a [RawCell].
///
/// Returns the name-keyed map of all cells, with dependencies resolved.
/// References to structures absent from the file are dropped and reported as
/// [GdsRawError::MissingReference], alongside the otherwise-complete map.
/// Files which fail to open, or end before their `ENDLIB` record, produce an empty map and an error.
pub fn read_rawcells(path: impl AsRef<Path>, diag: &mut dyn Diagnostics) -> Outcome<RawCellMap> {
    let path = path.as_ref();
    let source = match SharedSource::open(path) {
        Ok(source) => source,
        Err(e) => {
            diag.report("Unable to open input GDSII file.");
            return Outcome::partial(RawCellMap::new(), e);
        }
    };
    RawCellLoader::new(diag).origin(path).load(source)
}

///
/// # Raw Cell Loader
///
/// Two passes over a GDSII stream.
/// The first creates a [RawCell] per structure, recording each `SNAME` reference by name.
/// The second, triggered by `ENDLIB`, rewrites each name into a reference to its target.
///
pub struct RawCellLoader<'d> {
    /// Diagnostics sink
    diag: &'d mut dyn Diagnostics,
    /// Path recorded as each cell's origin
    origin: Option<PathBuf>,
    /// Record buffer capacity
    capacity: usize,
}
impl<'d> RawCellLoader<'d> {
    /// Create a new [RawCellLoader], reporting to `diag`
    pub fn new(diag: &'d mut dyn Diagnostics) -> Self {
        Self {
            diag,
            origin: None,
            capacity: READER_BUFSIZE,
        }
    }
    /// Set the path recorded as each loaded cell's origin
    pub fn origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }
    /// Set the record buffer capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
    /// Load all cells from `source`, starting from its first byte.
    ///
    /// Every cell holds a use of `source`. Our own use is held until resolution completes,
    /// so the stream stays open while cells come and go; it closes here only if no cells were created.
    pub fn load(mut self, source: SharedSource) -> Outcome<RawCellMap> {
        let mut map = RawCellMap::new();
        if let Err(e) = self.scan(&source, &mut map) {
            log::debug!("Raw-cell scan failed: {}", e);
            map.clear_all();
            let name = match &self.origin {
                Some(p) => p.display().to_string(),
                None => "<stream>".to_string(),
            };
            self.diag.report(&format!("Invalid GDSII file {}.", name));
            return Outcome::partial(map, GdsRawError::InvalidFile(self.origin));
        }
        let missing = self.resolve(&map);
        log::debug!(
            "Loaded {} raw cells, {} source uses",
            map.len(),
            source.uses() - 1
        );
        source.release();
        if missing.is_empty() {
            Outcome::ok(map)
        } else {
            Outcome::partial(map, GdsRawError::MissingReference(missing))
        }
    }
    /// First pass. Create a cell per structure and size it, through `ENDLIB`.
    fn scan(&mut self, source: &SharedSource, map: &mut RawCellMap) -> GdsRawResult<()> {
        let mut stream = source.stream();
        stream.seek(SeekFrom::Start(0))?;
        let mut rdr = GdsRecordReader::with_capacity(BufReader::new(&mut *stream), self.capacity);
        // The structure currently open, if any
        let mut current: Option<RawCellRef> = None;
        loop {
            let record = match rdr.read_record()? {
                Some(r) => r,
                None => return Err(GdsRawError::InvalidFile(self.origin.clone())),
            };
            let len = record.total_len();
            match record.rtype() {
                GdsRecordType::EndLib => return Ok(()),
                GdsRecordType::BgnStruct => {
                    let mut cell = RawCell::deferred(source.acquire(), record.start, len);
                    cell.origin = self.origin.clone();
                    current = Some(RawCellRef::new(cell));
                }
                GdsRecordType::StructName => {
                    if let Some(cell) = &current {
                        let name = record.string()?;
                        {
                            let mut c = cell.borrow_mut();
                            c.name = name.clone();
                            c.size += len;
                        }
                        if map.insert(name.clone(), cell.clone()).is_some() {
                            self.diag
                                .report(&format!("Duplicate cell name {}; keeping the last.", name));
                        }
                    }
                }
                GdsRecordType::StructRefName => {
                    if let Some(cell) = &current {
                        let name = record.string()?;
                        let mut c = cell.borrow_mut();
                        c.dependencies.push(Dependency::Unresolved(name));
                        c.size += len;
                    }
                }
                GdsRecordType::EndStruct => {
                    if let Some(cell) = current.take() {
                        cell.borrow_mut().size += len;
                    }
                }
                _ => {
                    if let Some(cell) = &current {
                        cell.borrow_mut().size += len;
                    }
                }
            }
        }
    }
    /// Second pass. Resolve every dependency slot against `map`.
    /// Returns the names of missing targets, which are dropped from their slot-lists.
    fn resolve(&mut self, map: &RawCellMap) -> Vec<String> {
        let mut missing = Vec::new();
        for cell in map.cells() {
            let slots = std::mem::take(&mut cell.borrow_mut().dependencies);
            let mut resolved: Vec<Dependency> = Vec::with_capacity(slots.len());
            for slot in slots {
                let dep = match slot {
                    Dependency::Unresolved(name) => match map.get(&name) {
                        Some(target) => Dependency::Resolved(target.clone()),
                        None => {
                            self.diag
                                .report(&format!("Referenced cell {} not found.", name));
                            missing.push(name);
                            continue;
                        }
                    },
                    dep => dep,
                };
                // Repeated instances of the same cell collapse into one slot
                if !resolved.contains(&dep) {
                    resolved.push(dep);
                }
            }
            cell.borrow_mut().dependencies = resolved;
        }
        missing
    }
}
