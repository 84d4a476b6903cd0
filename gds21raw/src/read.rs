//!
//! # Record Stream Reading
//!
//! One framed record at a time, from any [Read] source.
//!

// Std-Lib
use std::io::{ErrorKind, Read};

// Crates.io
use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;

// Local Imports
use crate::data::*;
use crate::error::*;

/// Default size (in bytes) of the read buffer.
/// One more than the largest possible record, as its length is a `u16`.
pub const READER_BUFSIZE: usize = 65537;

/// # GdsRecordReader
///
/// Reads one complete record per call to [GdsRecordReader::read_record].
/// Nothing is buffered beyond the current record;
/// the byte offset of each record is tracked by counting, so `R` need not be [std::io::Seek].
pub struct GdsRecordReader<R: Read> {
    /// Byte source
    src: R,
    /// Payload buffer. Its length is the caller-configured capacity.
    buf: Vec<u8>,
    /// Bytes consumed so far
    pos: u64,
}
impl<R: Read> GdsRecordReader<R> {
    /// Create a [GdsRecordReader] with the default buffer capacity
    pub fn new(src: R) -> Self {
        Self::with_capacity(src, READER_BUFSIZE)
    }
    /// Create a [GdsRecordReader] whose records may be at most `capacity` bytes, header included
    pub fn with_capacity(src: R, capacity: usize) -> Self {
        Self {
            src,
            buf: vec![0; capacity],
            pos: 0,
        }
    }
    /// Current byte offset, relative to where the source was when we received it
    pub fn position(&self) -> u64 {
        self.pos
    }
    /// Consume the reader, returning its source
    pub fn into_inner(self) -> R {
        self.src
    }
    /// Read the next record.
    ///
    /// Returns `Ok(None)` when the source ends cleanly on a record boundary.
    /// Framing failures return the corresponding [GdsRawError];
    /// a source which ends mid-record returns [GdsRawError::TruncatedRecord].
    pub fn read_record(&mut self) -> GdsRawResult<Option<GdsRawRecord<'_>>> {
        let start = self.pos;
        let mut hdr = [0u8; 4];
        let got = read_full(&mut self.src, &mut hdr)?;
        self.pos += got as u64;
        if got == 0 {
            return Ok(None);
        }
        if got < hdr.len() {
            return Err(GdsRawError::TruncatedRecord {
                rtype: None,
                declared: hdr.len(),
                available: got,
            });
        }
        // The 16-bit record-size, in bytes, includes the four header bytes
        let total = usize::from(BigEndian::read_u16(&hdr[0..2]));
        if total < 4 || total % 2 != 0 || total > self.buf.len() {
            return Err(GdsRawError::RecordLen(total));
        }
        let rtype: GdsRecordType =
            FromPrimitive::from_u8(hdr[2]).ok_or(GdsRawError::InvalidRecordType(hdr[2]))?;
        let dtype: GdsDataType =
            FromPrimitive::from_u8(hdr[3]).ok_or(GdsRawError::InvalidDataType(hdr[3]))?;
        let len = total - 4;
        // Payloads hold a whole number of elements of their declared type
        if len % dtype.width() != 0 {
            return Err(GdsRawError::RecordLen(total));
        }
        let got = read_full(&mut self.src, &mut self.buf[0..len])?;
        self.pos += got as u64;
        if got < len {
            return Err(GdsRawError::TruncatedRecord {
                rtype: Some(rtype),
                declared: len,
                available: got,
            });
        }
        Ok(Some(GdsRawRecord {
            header: GdsRecordHeader {
                rtype,
                dtype,
                len: len as u16,
            },
            start,
            payload: &self.buf[0..len],
        }))
    }
}

/// Read until `buf` is full or `src` is exhausted. Returns the number of bytes read.
pub(crate) fn read_full(src: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// # GdsRawRecord
///
/// A record as framed on disk: its header, its absolute starting offset,
/// and a borrowed view of its (still big-endian) payload bytes.
/// Typed accessors convert payload words to host order on the way out.
#[derive(Debug, Clone, Copy)]
pub struct GdsRawRecord<'rdr> {
    pub header: GdsRecordHeader,
    /// Byte offset of the record's first header byte
    pub start: u64,
    payload: &'rdr [u8],
}
impl<'rdr> GdsRawRecord<'rdr> {
    /// Record type
    pub fn rtype(&self) -> GdsRecordType {
        self.header.rtype
    }
    /// Total on-disk size, including the four header bytes
    pub fn total_len(&self) -> u64 {
        self.header.total_len()
    }
    /// Raw, big-endian payload bytes
    pub fn payload(&self) -> &'rdr [u8] {
        self.payload
    }
    /// Payload as `i16`s. Also covers bit-arrays, which share their two-byte width.
    pub fn i16s(&self) -> Vec<i16> {
        let mut rv = vec![0; self.payload.len() / 2];
        BigEndian::read_i16_into(&self.payload[0..rv.len() * 2], &mut rv);
        rv
    }
    /// Payload as `i32`s
    pub fn i32s(&self) -> Vec<i32> {
        let mut rv = vec![0; self.payload.len() / 4];
        BigEndian::read_i32_into(&self.payload[0..rv.len() * 4], &mut rv);
        rv
    }
    /// Payload as raw `u64` words, prior to any real-number decoding
    pub fn u64s(&self) -> Vec<u64> {
        let mut rv = vec![0; self.payload.len() / 8];
        BigEndian::read_u64_into(&self.payload[0..rv.len() * 8], &mut rv);
        rv
    }
    /// Payload as `f64`s, decoding GDSII's real-number format along the way
    pub fn f64s(&self) -> Vec<f64> {
        self.u64s().into_iter().map(GdsFloat64::decode).collect()
    }
    /// Payload as an ASCII string, minus its optional NUL padding byte
    pub fn string(&self) -> GdsRawResult<String> {
        Ok(std::str::from_utf8(self.name_bytes())?.to_string())
    }
    /// Payload string bytes, minus the optional NUL padding byte
    pub fn name_bytes(&self) -> &'rdr [u8] {
        match self.payload.split_last() {
            Some((0, rest)) => rest,
            _ => self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_and_normalizes() -> GdsRawResult<()> {
        let bytes: Vec<u8> = vec![
            0x00, 0x0C, 0x10, 0x03, // XY, four-byte ints, 12 bytes total
            0x00, 0x00, 0x01, 0x00, // 256
            0xFF, 0xFF, 0xFF, 0xFE, // -2
            0x00, 0x06, 0x0D, 0x02, // LAYER, two-byte ints
            0x00, 0x2A, // 42
        ];
        let mut rdr = GdsRecordReader::new(Cursor::new(bytes));
        {
            let r = rdr.read_record()?.unwrap();
            assert_eq!(r.rtype(), GdsRecordType::Xy);
            assert_eq!(r.start, 0);
            assert_eq!(r.total_len(), 12);
            assert_eq!(r.i32s(), vec![256, -2]);
        }
        {
            let r = rdr.read_record()?.unwrap();
            assert_eq!(r.rtype(), GdsRecordType::Layer);
            assert_eq!(r.start, 12);
            assert_eq!(r.header.dtype, GdsDataType::I16);
            assert_eq!(r.i16s(), vec![42]);
        }
        assert_eq!(rdr.position(), 18);
        assert!(rdr.read_record()?.is_none());
        Ok(())
    }
    #[test]
    fn strips_string_padding() -> GdsRawResult<()> {
        let bytes: Vec<u8> = vec![0x00, 0x08, 0x06, 0x06, b'a', b'b', b'c', 0x00];
        let mut rdr = GdsRecordReader::new(Cursor::new(bytes));
        let r = rdr.read_record()?.unwrap();
        assert_eq!(r.string()?, "abc");
        assert_eq!(r.name_bytes(), b"abc");
        Ok(())
    }
    #[test]
    fn truncated_payload() {
        // Declares 8 payload bytes, provides 3
        let bytes: Vec<u8> = vec![0x00, 0x0C, 0x10, 0x03, 0x00, 0x00, 0x01];
        let mut rdr = GdsRecordReader::new(Cursor::new(bytes));
        match rdr.read_record() {
            Err(GdsRawError::TruncatedRecord {
                rtype: Some(GdsRecordType::Xy),
                declared: 8,
                available: 3,
            }) => (),
            other => panic!("expected TruncatedRecord, got {:?}", other),
        }
    }
    #[test]
    fn truncated_header() {
        let mut rdr = GdsRecordReader::new(Cursor::new(vec![0x00, 0x04]));
        assert!(matches!(
            rdr.read_record(),
            Err(GdsRawError::TruncatedRecord { rtype: None, .. })
        ));
    }
    #[test]
    fn invalid_framing() {
        // Odd length
        let mut rdr = GdsRecordReader::new(Cursor::new(vec![0x00, 0x05, 0x04, 0x00, 0x00]));
        assert!(matches!(rdr.read_record(), Err(GdsRawError::RecordLen(5))));
        // Too short
        let mut rdr = GdsRecordReader::new(Cursor::new(vec![0x00, 0x02, 0x04, 0x00]));
        assert!(matches!(rdr.read_record(), Err(GdsRawError::RecordLen(2))));
        // Longer than our buffer capacity
        let mut rdr = GdsRecordReader::with_capacity(Cursor::new(vec![0x00, 0x10, 0x10, 0x03]), 8);
        assert!(matches!(rdr.read_record(), Err(GdsRawError::RecordLen(16))));
        // Six payload bytes cannot hold four-byte integers
        let bytes = vec![0x00, 0x0A, 0x10, 0x03, 0, 0, 0, 1, 0, 0];
        let mut rdr = GdsRecordReader::new(Cursor::new(bytes));
        assert!(matches!(rdr.read_record(), Err(GdsRawError::RecordLen(10))));
        // Unknown record type
        let mut rdr = GdsRecordReader::new(Cursor::new(vec![0x00, 0x04, 0x70, 0x00]));
        assert!(matches!(
            rdr.read_record(),
            Err(GdsRawError::InvalidRecordType(0x70))
        ));
        // Unknown data type
        let mut rdr = GdsRecordReader::new(Cursor::new(vec![0x00, 0x04, 0x04, 0x09]));
        assert!(matches!(
            rdr.read_record(),
            Err(GdsRawError::InvalidDataType(0x09))
        ));
    }
}
