//!
//! # Gds21Raw: Lazy GDSII Raw-Cell Loading
//!
//! Many uses of GDSII data never look inside most of its cells:
//! merging libraries, extracting a sub-hierarchy, or copying a handful of cells into a new file.
//! Gds21Raw serves these uses by loading each GDSII structure as a [RawCell]:
//! its name, its byte range in the source file, and the names of the structures it instantiates.
//! Element data is neither decoded nor stored.
//!
//! * [read_rawcells] makes a single pass over a GDSII file, producing a name-keyed [RawCellMap].
//!   References between cells are resolved into a dependency graph of [RawCellRef]s.
//! * Every cell loaded from a file shares one open [SharedSource].
//!   Its bytes are read only when [RawCell::materialize]d, generally on their way out via [RawCell::write_out].
//!   The file is closed when its last cell releases it.
//! * [RawCell::get_dependencies] collects a cell's direct or transitive dependencies, terminating on cyclic graphs.
//! * [PolygonExtractor] re-scans the source for a cell's boundaries and boxes,
//!   optionally expanding the cells it instantiates.
//! * [RawLibraryWriter] writes a set of raw cells into a new GDSII library, byte-for-byte.
//!
//! ## Usage
//!
//! Loading all cells of a file, and copying one and its dependencies into a new library:
//!
//! ```skip
//! use gds21raw::{read_rawcells, write_rawcells, GdsUnits, LogDiagnostics};
//! let cells = read_rawcells("sample.gds", &mut LogDiagnostics).into_result()?;
//! let top = cells.get("top").unwrap();
//! let mut keep = top.dependencies(true);
//! keep.insert("top", top.clone());
//! write_rawcells("top.gds", "toplib", GdsUnits::default(), keep.cells())?;
//! ```
//!
//! Extracting the polygons of a cell, through every level of its hierarchy:
//!
//! ```skip
//! let options = ExtractOptions { depth: ExtractOptions::UNLIMITED, ..Default::default() };
//! let polys = top.get_polygons(options, &mut LogDiagnostics).into_result()?;
//! ```
//!
//! ## Ownership
//!
//! [RawCellRef]s and [SharedSource]s are reference-counted, and neither is `Send`.
//! Cyclic dependency graphs form reference cycles, which persist until broken by
//! [RawCell::clear] or [RawCellMap::clear_all].
//!

pub mod cell;
pub mod data;
pub mod diag;
pub mod error;
pub mod load;
pub mod map;
pub mod polygons;
pub mod read;
pub mod source;
pub mod transform;
pub mod write;

pub use cell::{Dependency, RawCell, RawCellRef, RawData};
pub use data::{GdsDataType, GdsFloat64, GdsRecordHeader, GdsRecordType, GdsUnits};
pub use diag::{Diagnostics, LogDiagnostics, NoDiagnostics, StreamDiagnostics};
pub use error::{GdsRawError, GdsRawResult, Outcome};
pub use load::{read_rawcells, RawCellLoader};
pub use map::RawCellMap;
pub use polygons::{
    ExtractOptions, Extraction, Placement, PolygonExtractor, PolygonVertex, ScanSource,
};
pub use read::{GdsRawRecord, GdsRecordReader};
pub use source::{SharedSource, SourceStream};
pub use transform::Transform;
pub use write::{write_rawcells, GdsRecordWriter, RawLibraryWriter};
