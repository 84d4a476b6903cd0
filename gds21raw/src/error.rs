//!
//! # Raw-Cell Result and Error Types
//!

// Std-Lib
use std::error::Error;
use std::path::PathBuf;

// Local Imports
use crate::data::GdsRecordType;

/// # GdsRawResult Type-Alias
pub type GdsRawResult<T> = Result<T, GdsRawError>;

/// # Raw-Cell Error Enumeration
///
/// Framing and read failures abort whichever scan produced them.
/// [GdsRawError::MissingReference] is the sole recoverable kind,
/// and generally arrives alongside a usable (if incomplete) value in an [Outcome].
#[derive(Debug)]
pub enum GdsRawError {
    /// Failure opening the byte source
    SourceOpen {
        path: PathBuf,
        err: std::io::Error,
    },
    /// Failure reading deferred bytes from a shared source
    SourceRead {
        expected: u64,
        found: u64,
        err: Option<std::io::Error>,
    },
    /// Fewer payload bytes available than the record header declares
    TruncatedRecord {
        rtype: Option<GdsRecordType>,
        declared: usize,
        available: usize,
    },
    /// Invalid record length. Too short, odd, or too long for the read buffer.
    RecordLen(usize),
    /// Invalid record type
    InvalidRecordType(u8),
    /// Invalid data type
    InvalidDataType(u8),
    /// References to structures absent from the source, by name
    MissingReference(Vec<String>),
    /// End-of-library never reached, or the stream failed before it
    InvalidFile(Option<PathBuf>),
    /// Raw cells require non-empty names
    EmptyName,
    /// Boxed (External) Errors
    Boxed(Box<dyn Error>),
    /// Other errors
    Str(String),
}
impl GdsRawError {
    /// Boolean indication of errors which leave a complete-but-reported result
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingReference(_))
    }
}
impl std::fmt::Display for GdsRawError {
    /// Display a [GdsRawError].
    /// Delegates to the (derived) [std::fmt::Debug] implementation.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl std::error::Error for GdsRawError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SourceOpen { err, .. } => Some(err),
            Self::SourceRead { err: Some(err), .. } => Some(err),
            Self::Boxed(e) => Some(&**e),
            _ => None,
        }
    }
}
impl From<std::io::Error> for GdsRawError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::str::Utf8Error> for GdsRawError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<String> for GdsRawError {
    fn from(e: String) -> Self {
        Self::Str(e)
    }
}
impl From<&str> for GdsRawError {
    fn from(e: &str) -> Self {
        Self::Str(e.to_string())
    }
}

///
/// # Outcome
///
/// A best-effort `value` paired with an out-of-band `error`.
///
/// Loading and extraction hand back whatever they managed to produce,
/// even when something went wrong along the way.
/// Callers must check `error` even when `value` looks complete.
///
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub error: Option<GdsRawError>,
}
impl<T> Outcome<T> {
    /// Create a successful [Outcome]
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }
    /// Create an [Outcome] carrying both `value` and `error`
    pub fn partial(value: T, error: GdsRawError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }
    /// Boolean indication of an error-free outcome
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
    /// Convert to a [Result], discarding `value` if an error was reported
    pub fn into_result(self) -> GdsRawResult<T> {
        match self.error {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }
    /// Split into the value and the optional error
    pub fn into_parts(self) -> (T, Option<GdsRawError>) {
        (self.value, self.error)
    }
}
