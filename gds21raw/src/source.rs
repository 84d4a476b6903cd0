//!
//! # Shared Source Handles
//!

// Std-Lib
use std::cell::{RefCell, RefMut};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;

// Local Imports
use crate::error::*;
use crate::read::read_full;

/// # Source Stream
/// Any seekable byte stream can back a [SharedSource]. Typically a [File].
pub trait SourceStream: Read + Seek {}
impl<T: Read + Seek> SourceStream for T {}

///
/// # Shared Source
///
/// One open byte stream, shared by every [crate::RawCell] loaded from it.
///
/// Each handle counts as one use. [SharedSource::acquire] adds a use,
/// and [SharedSource::release] (or simply dropping a handle) removes one.
/// The stream is closed exactly once, when its final handle goes away.
/// Since reading requires a live handle, nothing can read through a closed stream.
///
/// Handles are `!Send`: the use-count is not atomic, and the stream sits behind a [RefCell].
///
pub struct SharedSource(Rc<RefCell<Box<dyn SourceStream>>>);

impl SharedSource {
    /// Open the file at `path` as a new [SharedSource], with a single use
    pub fn open(path: impl AsRef<Path>) -> GdsRawResult<Self> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => Ok(Self::new(file)),
            Err(err) => Err(GdsRawError::SourceOpen {
                path: path.to_path_buf(),
                err,
            }),
        }
    }
    /// Wrap `stream` as a new [SharedSource], with a single use
    pub fn new(stream: impl SourceStream + 'static) -> Self {
        Self(Rc::new(RefCell::new(Box::new(stream))))
    }
    /// Add a use, returning the new handle
    pub fn acquire(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
    /// Release this handle's use. Closes the stream if it was the last.
    pub fn release(self) {
        drop(self)
    }
    /// Current number of uses
    pub fn uses(&self) -> usize {
        Rc::strong_count(&self.0)
    }
    /// Boolean indication of whether `self` and `other` share a stream
    pub fn same_source(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
    /// Read into `buf` starting at absolute byte `offset`.
    ///
    /// Seeks before every read, so no user relies on another's cursor position.
    /// Returns the number of bytes read, which is short of `buf.len()` only at end-of-stream.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let mut stream = self.0.borrow_mut();
        stream.seek(SeekFrom::Start(offset))?;
        read_full(&mut *stream, buf)
    }
    /// Exclusive access to the underlying stream, for sequential scanning.
    /// Callers must not hold this across calls to [SharedSource::read_at].
    pub(crate) fn stream(&self) -> RefMut<'_, Box<dyn SourceStream>> {
        self.0.borrow_mut()
    }
}
impl std::fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SharedSource")
            .field("uses", &self.uses())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;

    /// In-memory stream which records when it is closed, i.e. dropped
    pub(crate) struct TrackedStream {
        inner: Cursor<Vec<u8>>,
        closed: Rc<Cell<bool>>,
    }
    impl TrackedStream {
        pub(crate) fn new(bytes: Vec<u8>) -> (Self, Rc<Cell<bool>>) {
            let closed = Rc::new(Cell::new(false));
            let me = Self {
                inner: Cursor::new(bytes),
                closed: Rc::clone(&closed),
            };
            (me, closed)
        }
    }
    impl Read for TrackedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }
    impl Seek for TrackedStream {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }
    impl Drop for TrackedStream {
        fn drop(&mut self) {
            assert!(!self.closed.get(), "stream closed twice");
            self.closed.set(true);
        }
    }

    #[test]
    fn positioned_reads() -> std::io::Result<()> {
        let src = SharedSource::new(Cursor::new((0u8..16).collect::<Vec<u8>>()));
        let other = src.acquire();
        let mut buf = [0u8; 4];
        assert_eq!(src.read_at(&mut buf, 8)?, 4);
        assert_eq!(buf, [8, 9, 10, 11]);
        // A second handle starts from its own offset, regardless of the first's reads
        assert_eq!(other.read_at(&mut buf, 2)?, 4);
        assert_eq!(buf, [2, 3, 4, 5]);
        // Short read at end-of-stream
        assert_eq!(src.read_at(&mut buf, 14)?, 2);
        Ok(())
    }
    #[test]
    fn closes_on_last_release() {
        let (stream, closed) = TrackedStream::new(vec![0; 8]);
        let src = SharedSource::new(stream);
        let a = src.acquire();
        let b = a.acquire();
        assert_eq!(src.uses(), 3);
        assert!(a.same_source(&b));
        src.release();
        assert!(!closed.get());
        a.release();
        assert!(!closed.get());
        assert_eq!(b.uses(), 1);
        b.release();
        assert!(closed.get());
    }
    #[test]
    fn open_failure() {
        match SharedSource::open("/this/path/does/not/exist.gds") {
            Err(GdsRawError::SourceOpen { path, .. }) => {
                assert!(path.ends_with("exist.gds"))
            }
            other => panic!("expected SourceOpen, got {:?}", other),
        }
    }
}
