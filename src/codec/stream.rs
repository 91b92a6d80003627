//! Shared input streams.
//!
//! Nested detection hands the same underlying file to several engines at
//! once (a gzip layer and the tar inside it). [`SharedStream`] gives every
//! holder its own cursor over one reference-counted source and records the
//! first I/O failure of that source in a [`FaultLog`], so the detector can
//! tell "format did not match" apart from "the disk failed".

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// A readable, seekable byte source.
pub trait InStream: Read + Seek {}

impl<T: Read + Seek + ?Sized> InStream for T {}

/// First I/O failure observed on a source.
#[derive(Clone, Default)]
pub struct FaultLog(Rc<RefCell<Option<io::Error>>>);

impl FaultLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, error: &io::Error) {
        if error.kind() == io::ErrorKind::Interrupted {
            return;
        }
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(io::Error::new(error.kind(), error.to_string()));
        }
    }

    /// Removes and returns the recorded failure.
    pub fn take(&self) -> Option<io::Error> {
        self.0.borrow_mut().take()
    }

    /// Returns true if a failure is recorded.
    pub fn is_faulted(&self) -> bool {
        self.0.borrow().is_some()
    }
}

impl std::fmt::Debug for FaultLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FaultLog").field(&self.is_faulted()).finish()
    }
}

struct Source {
    inner: Box<dyn InStream>,
    /// Position of `inner`, to avoid redundant seeks.
    pos: u64,
    len: Option<u64>,
}

/// A cloneable cursor over a shared source.
///
/// Clones share the source and its fault log but seek independently.
#[derive(Clone)]
pub struct SharedStream {
    source: Rc<RefCell<Source>>,
    faults: FaultLog,
    pos: u64,
}

impl SharedStream {
    /// Wraps a source; the cursor starts at 0.
    pub fn new(inner: Box<dyn InStream>) -> Self {
        Self {
            source: Rc::new(RefCell::new(Source {
                inner,
                pos: u64::MAX,
                len: None,
            })),
            faults: FaultLog::new(),
            pos: 0,
        }
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(io::Cursor::new(bytes)))
    }

    /// Returns a clone positioned at 0.
    pub fn rewound(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            faults: self.faults.clone(),
            pos: 0,
        }
    }

    /// Returns the fault log shared by every clone.
    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    /// Returns the current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns the total length of the source.
    pub fn len(&self) -> io::Result<u64> {
        let mut source = self.source.borrow_mut();
        if let Some(len) = source.len {
            return Ok(len);
        }
        let len = match source.inner.seek(SeekFrom::End(0)) {
            Ok(len) => len,
            Err(e) => {
                source.pos = u64::MAX;
                self.faults.record(&e);
                return Err(e);
            }
        };
        source.pos = len;
        source.len = Some(len);
        Ok(len)
    }

    /// Returns true if the source is empty.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads up to `limit` bytes from offset 0 without moving this cursor.
    pub fn peek_prefix(&self, limit: u64) -> io::Result<Vec<u8>> {
        let mut probe = self.rewound();
        let mut buf = Vec::new();
        (&mut probe).take(limit).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut source = self.source.borrow_mut();
        if source.pos != self.pos {
            if let Err(e) = source.inner.seek(SeekFrom::Start(self.pos)) {
                source.pos = u64::MAX;
                self.faults.record(&e);
                return Err(e);
            }
            source.pos = self.pos;
        }
        match source.inner.read(buf) {
            Ok(n) => {
                source.pos += n as u64;
                self.pos += n as u64;
                Ok(n)
            }
            Err(e) => {
                source.pos = u64::MAX;
                self.faults.record(&e);
                Err(e)
            }
        }
    }
}

impl Seek for SharedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len()?) + i128::from(delta),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = u64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflow"))?;
        Ok(self.pos)
    }
}

impl std::fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStream").field("pos", &self.pos).finish()
    }
}
