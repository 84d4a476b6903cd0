//!
//! # Record Encoding and Raw-Library Writing
//!

// Std-Lib
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

// Crates.io
use byteorder::{BigEndian, WriteBytesExt};
use chrono::{Datelike, NaiveDateTime, SubsecRound, Timelike, Utc};

// Local Imports
use crate::cell::RawCellRef;
use crate::data::*;
use crate::error::*;

/// GDSII version number written in each `HEADER` record
pub const GDS_VERSION: i16 = 600;

///
/// # Gds Record Writer
///
/// Encodes one record per call, header included.
/// Payload words are written big-endian; strings are NUL-padded to even length.
///
pub struct GdsRecordWriter<W: Write> {
    dest: W,
}
impl<W: Write> GdsRecordWriter<W> {
    /// Create a new [GdsRecordWriter] to destination `dest`
    pub fn new(dest: W) -> Self {
        Self { dest }
    }
    /// Reference to the destination
    pub fn get_ref(&self) -> &W {
        &self.dest
    }
    /// Consume the writer, returning its destination
    pub fn into_inner(self) -> W {
        self.dest
    }
    /// Write a record header for a payload of `len` bytes
    fn write_header(&mut self, rtype: GdsRecordType, dtype: GdsDataType, len: usize) -> GdsRawResult<()> {
        // Include the four header bytes in total-length
        match u16::try_from(len + 4) {
            Ok(val) => self.dest.write_u16::<BigEndian>(val)?,
            Err(_) => return Err(GdsRawError::RecordLen(len)),
        };
        self.dest.write_u8(rtype as u8)?;
        self.dest.write_u8(dtype as u8)?;
        Ok(())
    }
    /// Write a payload-free record, e.g. `ENDSTR` or `BOUNDARY`
    pub fn no_data(&mut self, rtype: GdsRecordType) -> GdsRawResult<()> {
        self.write_header(rtype, GdsDataType::NoData, 0)
    }
    /// Write a two-byte bit-array record, e.g. `STRANS`
    pub fn bits(&mut self, rtype: GdsRecordType, bits: u16) -> GdsRawResult<()> {
        self.write_header(rtype, GdsDataType::BitArray, 2)?;
        self.dest.write_u16::<BigEndian>(bits)?;
        Ok(())
    }
    /// Write a record of two-byte integers
    pub fn i16s(&mut self, rtype: GdsRecordType, vals: &[i16]) -> GdsRawResult<()> {
        self.write_header(rtype, GdsDataType::I16, 2 * vals.len())?;
        for val in vals {
            self.dest.write_i16::<BigEndian>(*val)?;
        }
        Ok(())
    }
    /// Write a record of four-byte integers, e.g. `XY`
    pub fn i32s(&mut self, rtype: GdsRecordType, vals: &[i32]) -> GdsRawResult<()> {
        self.write_header(rtype, GdsDataType::I32, 4 * vals.len())?;
        for val in vals {
            self.dest.write_i32::<BigEndian>(*val)?;
        }
        Ok(())
    }
    /// Write a record of eight-byte reals, converted to GDSII's format
    pub fn f64s(&mut self, rtype: GdsRecordType, vals: &[f64]) -> GdsRawResult<()> {
        self.write_header(rtype, GdsDataType::F64, 8 * vals.len())?;
        for val in vals {
            self.dest.write_u64::<BigEndian>(GdsFloat64::encode(*val))?;
        }
        Ok(())
    }
    /// Write a string record, e.g. `STRNAME`
    pub fn string(&mut self, rtype: GdsRecordType, s: &str) -> GdsRawResult<()> {
        // GDSII strings are even-length only
        let len = s.len() + s.len() % 2;
        self.write_header(rtype, GdsDataType::Str, len)?;
        self.dest.write_all(s.as_bytes())?;
        if s.len() % 2 != 0 {
            self.dest.write_u8(0x00)?;
        }
        Ok(())
    }
    /// Write pre-encoded bytes, unmodified
    pub fn raw(&mut self, bytes: &[u8]) -> GdsRawResult<()> {
        self.dest.write_all(bytes)?;
        Ok(())
    }
    /// Flush the destination
    pub fn flush(&mut self) -> GdsRawResult<()> {
        self.dest.flush()?;
        Ok(())
    }
}

/// Encode a modification/access date pair as the twelve integers of `BGNLIB` and `BGNSTR`
pub fn gds_dates(dt: &NaiveDateTime) -> [i16; 12] {
    // GDSII uses 1900 as the base year
    let one = [
        dt.year() as i16 - 1900,
        dt.month() as i16,
        dt.day() as i16,
        dt.hour() as i16,
        dt.minute() as i16,
        dt.second() as i16,
    ];
    let mut rv = [0; 12];
    rv[..6].copy_from_slice(&one);
    rv[6..].copy_from_slice(&one);
    rv
}

///
/// # Raw Library Writer
///
/// Writes a new GDSII library whose structures are the exact bytes of a set of [crate::RawCell]s.
/// Cells not yet materialized are materialized along the way, releasing their sources.
///
pub struct RawLibraryWriter<W: Write> {
    rec: GdsRecordWriter<W>,
    units: GdsUnits,
    dates: NaiveDateTime,
}
impl RawLibraryWriter<BufWriter<File>> {
    /// Create a [RawLibraryWriter] to new file `path`
    pub fn create(path: impl AsRef<Path>) -> GdsRawResult<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(Self::new(file))
    }
}
impl<W: Write> RawLibraryWriter<W> {
    /// Create a [RawLibraryWriter] to `dest`, with default units, dated now
    pub fn new(dest: W) -> Self {
        Self {
            rec: GdsRecordWriter::new(dest),
            units: GdsUnits::default(),
            dates: Utc::now().naive_utc().round_subsecs(0),
        }
    }
    /// Set the library units
    pub fn units(mut self, units: GdsUnits) -> Self {
        self.units = units;
        self
    }
    /// Set the library modification and access dates
    pub fn dates(mut self, dates: NaiveDateTime) -> Self {
        self.dates = dates;
        self
    }
    /// Write library `name` containing each of `cells`, in order. Consumes the writer.
    ///
    /// Stops at the first cell which fails to write, returning its error.
    /// The destination then holds an incomplete library.
    pub fn write<'c>(
        mut self,
        name: &str,
        cells: impl IntoIterator<Item = &'c RawCellRef>,
    ) -> GdsRawResult<W> {
        self.rec.i16s(GdsRecordType::Header, &[GDS_VERSION])?;
        self.rec.i16s(GdsRecordType::BgnLib, &gds_dates(&self.dates))?;
        self.rec.string(GdsRecordType::LibName, name)?;
        self.rec.f64s(
            GdsRecordType::Units,
            &[self.units.db_in_user(), self.units.db_in_meters()],
        )?;
        let mut count = 0;
        for cell in cells {
            let mut cell = cell.borrow_mut();
            cell.write_out(&mut self.rec.dest)?;
            count += 1;
        }
        self.rec.no_data(GdsRecordType::EndLib)?;
        self.rec.flush()?;
        log::debug!("Wrote {} raw cells to library {}", count, name);
        Ok(self.rec.into_inner())
    }
}

/// Write library `name` containing each of `cells` to new file `path`
pub fn write_rawcells<'c>(
    path: impl AsRef<Path>,
    name: &str,
    units: GdsUnits,
    cells: impl IntoIterator<Item = &'c RawCellRef>,
) -> GdsRawResult<()> {
    RawLibraryWriter::create(path)?.units(units).write(name, cells)?;
    Ok(())
}
