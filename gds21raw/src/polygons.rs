//!
//! # Polygon Extraction
//!
//! Re-scans a raw cell's source stream and gathers the vertices of its boundaries and boxes,
//! optionally expanding the cells it instantiates.
//!

// Std-Lib
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use crate::cell::RawCellRef;
use crate::data::{GdsRecordType, GdsUnits};
use crate::diag::Diagnostics;
use crate::error::*;
use crate::map::RawCellMap;
use crate::read::{GdsRecordReader, READER_BUFSIZE};
use crate::transform::Transform;

/// # Instance Placement Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Placement {
    /// Polygons of instantiated cells are emitted in their own coordinates
    #[default]
    Local,
    /// Polygons of instantiated cells are translated, reflected, magnified and rotated
    /// into the coordinates of the top-level cell. Arrays are repeated over their lattice.
    Transformed,
}

/// # Polygon Extraction Options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Levels of instances to expand. Zero expands none; negative values expand all.
    pub depth: i64,
    /// User unit, in meters. Zero or less uses the file's own user unit.
    pub unit: f64,
    /// Tolerance. Zero or less is replaced by the file's database unit, in the output unit.
    pub tolerance: f64,
    /// Instance placement mode
    pub placement: Placement,
}
impl ExtractOptions {
    /// Depth value expanding every reachable instance
    pub const UNLIMITED: i64 = -1;
}
impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            depth: 0,
            unit: 0.0,
            tolerance: 0.0,
            placement: Placement::Local,
        }
    }
}

/// # Extracted Polygon Vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolygonVertex {
    pub x: i32,
    pub y: i32,
    /// Identifier shared by all vertices of one polygon
    pub polygon_id: i32,
}
impl PolygonVertex {
    /// Array form, `[x, y, polygon_id]`
    pub fn row(&self) -> [i32; 3] {
        [self.x, self.y, self.polygon_id]
    }
}

/// # Polygon Extraction Result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Vertices in stream order
    pub vertices: Vec<PolygonVertex>,
    /// Number of polygons, and the next unused polygon id
    pub polygons: i32,
    /// Effective tolerance, after replacement of non-positive requests
    pub tolerance: f64,
}
impl Extraction {
    /// Vertices as an N x 3 array of `[x, y, polygon_id]` rows
    pub fn rows(&self) -> Vec<[i32; 3]> {
        self.vertices.iter().map(PolygonVertex::row).collect()
    }
    /// Vertices of the polygon with id `id`
    pub fn polygon(&self, id: i32) -> impl Iterator<Item = &PolygonVertex> {
        self.vertices.iter().filter(move |v| v.polygon_id == id)
    }
}

/// # Scannable Source
///
/// Anything which can produce a fresh stream positioned at the start of a GDSII library.
/// Each expansion level re-scans from the start, while its parent's scan remains in progress.
pub trait ScanSource {
    fn open_scan(&self) -> GdsRawResult<Box<dyn Read + '_>>;
}
impl ScanSource for Path {
    fn open_scan(&self) -> GdsRawResult<Box<dyn Read + '_>> {
        match File::open(self) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(err) => Err(GdsRawError::SourceOpen {
                path: self.to_path_buf(),
                err,
            }),
        }
    }
}
impl ScanSource for [u8] {
    fn open_scan(&self) -> GdsRawResult<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self)))
    }
}

impl RawCellRef {
    /// Extract our polygons from our origin file. Shorthand for [PolygonExtractor::extract].
    pub fn get_polygons(
        &self,
        options: ExtractOptions,
        diag: &mut dyn Diagnostics,
    ) -> Outcome<Extraction> {
        PolygonExtractor::new(options, diag).extract(self)
    }
}

/// Scan states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Seeking,
    InTargetStructure,
    InPolygon,
}

/// Attributes of an SREF or AREF element, collected until its ENDEL
#[derive(Debug, Clone)]
struct InstanceRecord {
    name: String,
    array: bool,
    xy: Vec<i32>,
    reflected: bool,
    angle: f64,
    mag: f64,
    cols: i16,
    rows: i16,
}
impl InstanceRecord {
    fn new(array: bool) -> Self {
        Self {
            name: String::new(),
            array,
            xy: Vec::new(),
            reflected: false,
            angle: 0.0,
            mag: 1.0,
            cols: 1,
            rows: 1,
        }
    }
    /// Placement transform of each instance.
    /// Arrays produce one per lattice point, column-major.
    fn transforms(&self) -> Vec<Transform> {
        let (x0, y0) = match self.xy.as_slice() {
            [x, y, ..] => (f64::from(*x), f64::from(*y)),
            _ => (0.0, 0.0),
        };
        let place = |x: f64, y: f64| Transform::placement(x, y, self.reflected, self.angle, self.mag);
        if !self.array || self.xy.len() < 6 {
            return vec![place(x0, y0)];
        }
        // Array XY holds the origin, the origin displaced by `cols` columns, and by `rows` rows
        let cols = self.cols.max(1);
        let rows = self.rows.max(1);
        let colstep = (
            (f64::from(self.xy[2]) - x0) / f64::from(cols),
            (f64::from(self.xy[3]) - y0) / f64::from(cols),
        );
        let rowstep = (
            (f64::from(self.xy[4]) - x0) / f64::from(rows),
            (f64::from(self.xy[5]) - y0) / f64::from(rows),
        );
        let mut rv = Vec::with_capacity(cols as usize * rows as usize);
        for c in 0..cols {
            for r in 0..rows {
                let (c, r) = (f64::from(c), f64::from(r));
                rv.push(place(
                    x0 + c * colstep.0 + r * rowstep.0,
                    y0 + c * colstep.1 + r * rowstep.1,
                ));
            }
        }
        rv
    }
}

/// State shared across every level of one top-level extraction
#[derive(Debug, Default)]
struct ExtractionContext {
    out: Extraction,
    /// Cells currently being expanded, outermost first
    path: Vec<RawCellRef>,
    /// Names of unresolved instances
    missing: Vec<String>,
}

///
/// # Polygon Extractor
///
/// Scans a GDSII stream for a target structure and gathers its polygon vertices,
/// recursing into instantiated structures up to the configured depth.
///
pub struct PolygonExtractor<'d> {
    options: ExtractOptions,
    diag: &'d mut dyn Diagnostics,
    capacity: usize,
}
impl<'d> PolygonExtractor<'d> {
    /// Create a new [PolygonExtractor]
    pub fn new(options: ExtractOptions, diag: &'d mut dyn Diagnostics) -> Self {
        Self {
            options,
            diag,
            capacity: READER_BUFSIZE,
        }
    }
    /// Set the record buffer capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
    /// Extract the polygons of `cell`, reading from the file it was loaded from.
    /// The file is opened once per expanded instance.
    pub fn extract(&mut self, cell: &RawCellRef) -> Outcome<Extraction> {
        let origin: Option<PathBuf> = cell.borrow().origin().map(Path::to_path_buf);
        let origin = match origin {
            Some(p) => p,
            None => {
                self.diag.report("Unable to open input GDSII file.");
                let err = GdsRawError::SourceOpen {
                    path: PathBuf::new(),
                    err: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "cell was not loaded from a file",
                    ),
                };
                return Outcome::partial(Extraction::default(), err);
            }
        };
        // Fail on open before any scanning
        if let Err(err) = File::open(&origin) {
            self.diag.report("Unable to open input GDSII file.");
            return Outcome::partial(
                Extraction::default(),
                GdsRawError::SourceOpen { path: origin, err },
            );
        }
        self.extract_with(origin.as_path(), cell)
    }
    /// Extract the polygons of `cell` from the GDSII library in `reader`.
    /// The stream is read into memory in full, as each expansion level re-scans it.
    pub fn extract_from(&mut self, mut reader: impl Read, cell: &RawCellRef) -> Outcome<Extraction> {
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes) {
            return Outcome::partial(Extraction::default(), e.into());
        }
        self.extract_with(bytes.as_slice(), cell)
    }
    /// Extract the polygons of `cell` from any [ScanSource]
    pub fn extract_with<S: ScanSource + ?Sized>(
        &mut self,
        src: &S,
        cell: &RawCellRef,
    ) -> Outcome<Extraction> {
        let mut ctx = ExtractionContext::default();
        ctx.out.tolerance = self.options.tolerance;
        let depth = self.options.depth;
        let result = self.expand(src, cell, depth, &Transform::identity(), &mut ctx);
        let ExtractionContext { out, missing, .. } = ctx;
        match result {
            Err(e) => Outcome::partial(out, e),
            Ok(()) if !missing.is_empty() => {
                Outcome::partial(out, GdsRawError::MissingReference(missing))
            }
            Ok(()) => Outcome::ok(out),
        }
    }
    /// Expand `cell`, keeping it on the path for the duration
    fn expand<S: ScanSource + ?Sized>(
        &mut self,
        src: &S,
        cell: &RawCellRef,
        depth: i64,
        trans: &Transform,
        ctx: &mut ExtractionContext,
    ) -> GdsRawResult<()> {
        ctx.path.push(cell.clone());
        let result = self.scan(src, cell, depth, trans, ctx);
        ctx.path.pop();
        result
    }
    /// Scan from the start of `src` through the end of `cell`'s structure
    fn scan<S: ScanSource + ?Sized>(
        &mut self,
        src: &S,
        cell: &RawCellRef,
        depth: i64,
        trans: &Transform,
        ctx: &mut ExtractionContext,
    ) -> GdsRawResult<()> {
        let target = cell.name();
        let mut rdr = GdsRecordReader::with_capacity(src.open_scan()?, self.capacity);
        let mut state = ScanState::Seeking;
        let mut factor = 1.0;
        let mut instance: Option<InstanceRecord> = None;
        // Recursive dependencies of `cell`, gathered on first use
        let mut deps: Option<RawCellMap> = None;
        // Whether the open polygon has produced any vertices
        let mut emitted = false;

        loop {
            let record = match rdr.read_record()? {
                Some(r) => r,
                None => return Err(GdsRawError::InvalidFile(None)),
            };
            match record.rtype() {
                GdsRecordType::EndLib => {
                    if state == ScanState::Seeking {
                        self.diag
                            .report(&format!("Cell {} not found in GDSII stream.", target));
                    }
                    return Ok(());
                }
                GdsRecordType::Units => {
                    if let [db_in_user, db_in_meters, ..] = record.f64s()[..] {
                        let units = GdsUnits::new(db_in_user, db_in_meters);
                        factor = if self.options.unit > 0.0 {
                            units.db_in_meters() / self.options.unit
                        } else {
                            units.db_in_user()
                        };
                        if ctx.out.tolerance <= 0.0 {
                            ctx.out.tolerance = factor;
                        }
                    }
                }
                GdsRecordType::StructName => {
                    if state == ScanState::Seeking && record.name_bytes() == target.as_bytes() {
                        log::debug!("Extracting polygons of {} at depth {}", target, depth);
                        state = ScanState::InTargetStructure;
                    }
                }
                GdsRecordType::EndStruct => {
                    if state != ScanState::Seeking {
                        return Ok(());
                    }
                }
                GdsRecordType::Boundary | GdsRecordType::Box => {
                    if state == ScanState::InTargetStructure {
                        state = ScanState::InPolygon;
                        emitted = false;
                    }
                }
                GdsRecordType::StructRef | GdsRecordType::ArrayRef => {
                    if state == ScanState::InTargetStructure {
                        instance = Some(InstanceRecord::new(
                            record.rtype() == GdsRecordType::ArrayRef,
                        ));
                    }
                }
                GdsRecordType::StructRefName => {
                    if let Some(inst) = instance.as_mut() {
                        inst.name = record.string()?;
                    }
                }
                GdsRecordType::Strans => {
                    if let Some(inst) = instance.as_mut() {
                        if let Some(bits) = record.i16s().first() {
                            inst.reflected = (*bits as u16) & 0x8000 != 0;
                        }
                    }
                }
                GdsRecordType::Mag => {
                    if let Some(inst) = instance.as_mut() {
                        if let Some(mag) = record.f64s().first() {
                            inst.mag = *mag;
                        }
                    }
                }
                GdsRecordType::Angle => {
                    if let Some(inst) = instance.as_mut() {
                        if let Some(angle) = record.f64s().first() {
                            inst.angle = *angle;
                        }
                    }
                }
                GdsRecordType::ColRow => {
                    if let Some(inst) = instance.as_mut() {
                        if let [cols, rows, ..] = record.i16s()[..] {
                            inst.cols = cols;
                            inst.rows = rows;
                        }
                    }
                }
                GdsRecordType::Xy => {
                    if let Some(inst) = instance.as_mut() {
                        inst.xy = record.i32s();
                    } else if state == ScanState::InPolygon {
                        let id = ctx.out.polygons;
                        for pair in record.i32s().chunks_exact(2) {
                            let (x, y) = trans.apply(pair[0], pair[1]);
                            ctx.out.vertices.push(PolygonVertex {
                                x: (factor * x) as i32,
                                y: (factor * y) as i32,
                                polygon_id: id,
                            });
                            emitted = true;
                        }
                    }
                }
                GdsRecordType::EndElement => {
                    if state == ScanState::InPolygon {
                        state = ScanState::InTargetStructure;
                        if emitted {
                            ctx.out.polygons += 1;
                        }
                    } else if let Some(inst) = instance.take() {
                        if depth != 0 {
                            let deps = deps.get_or_insert_with(|| cell.dependencies(true));
                            self.instantiate(src, deps, &inst, depth, trans, ctx)?;
                        }
                    }
                }
                _ => (),
            }
        }
    }
    /// Expand instance `inst`, found inside a structure being scanned at `depth`
    fn instantiate<S: ScanSource + ?Sized>(
        &mut self,
        src: &S,
        deps: &RawCellMap,
        inst: &InstanceRecord,
        depth: i64,
        trans: &Transform,
        ctx: &mut ExtractionContext,
    ) -> GdsRawResult<()> {
        let target = match deps.get(&inst.name) {
            Some(t) => t.clone(),
            None => {
                self.diag
                    .report(&format!("Referenced cell {} not found.", inst.name));
                ctx.missing.push(inst.name.clone());
                return Ok(());
            }
        };
        if ctx.path.contains(&target) {
            self.diag.report(&format!(
                "Skipping recursive instance of cell {}.",
                inst.name
            ));
            return Ok(());
        }
        let child_depth = if depth < 0 { depth } else { depth - 1 };
        match self.options.placement {
            Placement::Local => self.expand(src, &target, child_depth, trans, ctx),
            Placement::Transformed => {
                for placement in inst.transforms() {
                    log::debug!("Expanding {} at {:?}", inst.name, placement.b);
                    let t = Transform::cascade(trans, &placement);
                    self.expand(src, &target, child_depth, &t, ctx)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_defaults() {
        let opts = ExtractOptions::default();
        assert_eq!(opts.depth, 0);
        assert_eq!(opts.placement, Placement::Local);
        let opts: ExtractOptions = serde_json::from_str(r#"{"depth": -1, "placement": "Transformed"}"#).unwrap();
        assert_eq!(opts.depth, ExtractOptions::UNLIMITED);
        assert_eq!(opts.unit, 0.0);
        assert_eq!(opts.placement, Placement::Transformed);
    }
    #[test]
    fn array_lattice() {
        let mut inst = InstanceRecord::new(true);
        inst.cols = 2;
        inst.rows = 3;
        inst.xy = vec![10, 20, 30, 20, 10, 50];
        let origins: Vec<[f64; 2]> = inst.transforms().iter().map(|t| t.b).collect();
        assert_eq!(
            origins,
            vec![
                [10., 20.],
                [10., 30.],
                [10., 40.],
                [20., 20.],
                [20., 30.],
                [20., 40.]
            ]
        );
    }
    #[test]
    fn single_instance_transform() {
        let mut inst = InstanceRecord::new(false);
        inst.xy = vec![5, 6];
        inst.angle = 90.;
        let t = inst.transforms();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].apply(1, 0), (5., 7.));
    }
    #[test]
    fn vertex_rows() {
        let v = PolygonVertex {
            x: 1,
            y: -2,
            polygon_id: 3,
        };
        assert_eq!(v.row(), [1, -2, 3]);
    }
}
