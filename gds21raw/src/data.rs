//!
//! # Record-Level Data Tables
//!
//! Numeric record and data-type tags, decoded record headers,
//! GDSII's eight-byte reals, and library units.
//!

// Crates.io
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

///
/// # Gds Record Types
///
/// In the numeric-order specified by GDSII, for automatic [FromPrimitive] conversions.
/// Raw-cell loading passes most of these through untouched;
/// only the structure-framing, reference, and polygon records are interpreted.
///
#[derive(FromPrimitive, Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum GdsRecordType {
    Header = 0x00,
    BgnLib,
    LibName,
    Units,
    EndLib,
    BgnStruct,
    StructName, // STRNAME
    EndStruct,
    Boundary,
    Path,
    StructRef, // SREF
    ArrayRef,  // AREF
    Text,
    Layer,
    DataType,
    Width,
    Xy,
    EndElement,
    StructRefName, // SNAME
    ColRow,
    TextNode,
    Node,
    TextType,
    Presentation,
    Spacing,
    String,
    Strans,
    Mag,
    Angle,
    Uinteger,
    Ustring,
    RefLibs,
    Fonts,
    PathType,
    Generations,
    AttrTable,
    StypTable,
    StrType,
    ElemFlags,
    ElemKey,
    LinkType,
    LinkKeys,
    Nodetype,
    PropAttr,
    PropValue,
    Box,
    BoxType,
    Plex,
    BeginExtn,
    EndExtn,
    TapeNum,
    TapeCode,
    StrClass,
    Reserved,
    Format,
    Mask,
    EndMasks,
    LibDirSize,
    SrfName,
    LibSecur,
}
impl GdsRecordType {
    /// Boolean indication of the two instance-placement records, `SREF` and `AREF`
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::StructRef | Self::ArrayRef)
    }
    /// Boolean indication of closed-polygon elements, `BOUNDARY` and `BOX`
    pub fn is_polygon(&self) -> bool {
        matches!(self, Self::Boundary | Self::Box)
    }
}

/// # Gds DataType Enumeration
/// In order as decoded from the fourth header byte of each record
#[derive(FromPrimitive, Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum GdsDataType {
    NoData = 0,
    BitArray = 1,
    I16 = 2,
    I32 = 3,
    F32 = 4,
    F64 = 5,
    Str = 6,
}
impl GdsDataType {
    /// Width in bytes of each payload element.
    /// Payload words of this width are stored big-endian on the wire.
    pub fn width(&self) -> usize {
        match self {
            Self::BitArray | Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
            Self::NoData | Self::Str => 1,
        }
    }
}

/// # Gds Record Header
/// Decoded contents of a record's four header bytes.
/// Unlike the on-disk length field, `len` here counts *payload* bytes only.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsRecordHeader {
    pub rtype: GdsRecordType,
    pub dtype: GdsDataType,
    pub len: u16,
}
impl GdsRecordHeader {
    /// Total on-disk record size, including the four header bytes
    pub fn total_len(&self) -> u64 {
        u64::from(self.len) + 4
    }
}

/// # Gds Floating Point
///
/// GDSII predates IEEE754, and stores its reals in an excess-64, base-16 format.
/// [GdsFloat64] is not a data-store, just a namespace for conversions to and from `f64`.
///
pub struct GdsFloat64;
impl GdsFloat64 {
    /// Decode GDSII's eight-byte representation, stored as a `u64`, to `f64`
    pub fn decode(val: u64) -> f64 {
        let neg = (val & 0x8000_0000_0000_0000) != 0;
        let exp: i32 = ((val & 0x7F00_0000_0000_0000) >> (8 * 7)) as i32 - 64;
        // Seven-byte mantissa, normalized to the range (1/16, 1)
        let mantissa = (val & 0x00FF_FFFF_FFFF_FFFF) as f64 / 2f64.powi(8 * 7);
        let magnitude = mantissa * 16f64.powi(exp);
        if neg {
            -magnitude
        } else {
            magnitude
        }
    }
    /// Encode `f64` to GDSII's eight bytes, stored as `u64`
    pub fn encode(mut val: f64) -> u64 {
        if val == 0.0 {
            return 0;
        }
        let mut top: u8 = 0;
        if val < 0.0 {
            top = 0x80;
            val = -val;
        }
        let fexp: f64 = 0.25 * val.log2();
        let mut exponent = fexp.ceil() as i32;
        if fexp == fexp.ceil() {
            exponent += 1;
        }
        let mantissa: u64 = (val * 16_f64.powi(14 - exponent)).round() as u64;
        top += (64 + exponent) as u8;
        (u64::from(top) << 56) | (mantissa & 0x00FF_FFFF_FFFF_FFFF)
    }
}

/// # Gds Library Units
///
/// The two reals of a `UNITS` record:
/// the size of a database-unit in user-units, and the size of a database-unit in meters.
///
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct GdsUnits(pub f64, pub f64);
impl GdsUnits {
    /// Create a new [GdsUnits]
    pub fn new(db_in_user: f64, db_in_meters: f64) -> Self {
        Self(db_in_user, db_in_meters)
    }
    /// Database-unit size, in user-units
    pub fn db_in_user(&self) -> f64 {
        self.0
    }
    /// Database-unit size, in meters
    pub fn db_in_meters(&self) -> f64 {
        self.1
    }
}
impl Default for GdsUnits {
    /// DB-Unit = 1nm, User-Unit = 1µm
    fn default() -> Self {
        Self(1e-3, 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn floats() {
        for val in [0.0, 1.0, 1e-11, -0.69, -33.33e-33, 90.0, 2.5] {
            let f = GdsFloat64::encode(val);
            assert_eq!(GdsFloat64::decode(f), val);
        }
        assert_eq!(GdsFloat64::encode(0.0), 0);
    }
    #[test]
    fn record_tags() {
        assert_eq!(GdsRecordType::from_u8(0x05), Some(GdsRecordType::BgnStruct));
        assert_eq!(GdsRecordType::from_u8(0x12), Some(GdsRecordType::StructRefName));
        assert_eq!(GdsRecordType::from_u8(0x2D), Some(GdsRecordType::Box));
        assert_eq!(GdsRecordType::from_u8(0x3B), Some(GdsRecordType::LibSecur));
        assert_eq!(GdsRecordType::from_u8(0x3C), None);
        assert_eq!(GdsDataType::from_u8(7), None);
    }
    #[test]
    fn widths() {
        let hdr = GdsRecordHeader {
            rtype: GdsRecordType::Xy,
            dtype: GdsDataType::I32,
            len: 40,
        };
        assert_eq!(hdr.total_len(), 44);
        assert_eq!(GdsDataType::F64.width(), 8);
        assert_eq!(GdsDataType::BitArray.width(), 2);
        assert_eq!(GdsDataType::Str.width(), 1);
    }
}
