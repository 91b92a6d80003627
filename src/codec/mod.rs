//! The codec-engine interface.
//!
//! A [`Codec`] recognizes one container format and opens it into an
//! [`InArchive`]. The archive enumerates its items and, on request, decodes
//! a batch of them, driving the caller through three narrow capability
//! traits bundled in [`ExtractCallbacks`]:
//!
//! - [`ProgressSink`]: byte totals and completion
//! - [`StreamProvider`]: one output stream per item, then its decode result
//! - [`PasswordProvider`]: lazily requested key material
//!
//! While opening, the engine talks to an [`OpenCallback`] instead.
//!
//! Call sequencing per extracted item is always
//! `get_stream` → (writes) → drop stream → `set_operation_result`.

mod stream;

pub use stream::{FaultLog, InStream, SharedStream};

use std::fmt;
use std::io::{self, Read, Write};

use crate::password::Password;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Size of the copy buffer engines use when pumping item data.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Properties of one archive item as reported by an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveItem {
    /// Path inside the archive, `/` or `\` separated.
    pub path: String,
    /// Whether the item is a directory.
    pub is_dir: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Windows-style attribute bitmask, optionally carrying a Unix mode in the high word.
    pub attributes: Option<u32>,
    /// Creation time.
    pub creation_time: Option<Timestamp>,
    /// Last access time.
    pub access_time: Option<Timestamp>,
    /// Last modification time.
    pub modification_time: Option<Timestamp>,
    /// Whether the payload is encrypted.
    pub encrypted: bool,
}

/// Per-item decode outcome reported through [`StreamProvider::set_operation_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The item decoded successfully.
    Ok,
    /// The item uses a compression or encryption method the engine lacks.
    UnsupportedMethod,
    /// The compressed data is corrupt (or the password is wrong).
    DataError,
    /// The decoded data failed its checksum.
    CrcError,
}

impl OperationResult {
    /// Classifies a read error raised by a decoder.
    pub fn from_read_error(error: &io::Error) -> Self {
        if error.kind() == io::ErrorKind::Unsupported {
            return OperationResult::UnsupportedMethod;
        }
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("checksum") || text.contains("crc") {
            OperationResult::CrcError
        } else {
            OperationResult::DataError
        }
    }

    /// Returns true for [`OperationResult::Ok`].
    pub fn is_ok(self) -> bool {
        self == OperationResult::Ok
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OperationResult::Ok => "Success",
            OperationResult::UnsupportedMethod => "Unsupported compression method",
            OperationResult::DataError => "Data error",
            OperationResult::CrcError => "CRC error",
        };
        f.write_str(text)
    }
}

/// Why the engine asks for an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskMode {
    /// Decode into the returned stream.
    Extract,
    /// Decode and verify only.
    Test,
    /// The item is not decoded at all.
    Skip,
}

/// Progress capability handed to an extracting engine.
pub trait ProgressSink {
    /// Sets the number of bytes the batch will produce.
    fn set_total(&mut self, bytes: u64) -> Result<()>;

    /// Sets the number of bytes produced so far.
    fn set_completed(&mut self, bytes: u64) -> Result<()>;
}

/// Output-stream capability handed to an extracting engine.
pub trait StreamProvider {
    /// Returns the destination for item `index`, or `None` to skip its payload.
    fn get_stream(&mut self, index: u32, mode: AskMode) -> Result<Option<Box<dyn Write + '_>>>;

    /// Reports the decode outcome of the item whose stream was requested last.
    ///
    /// Must be called after that stream was dropped.
    fn set_operation_result(&mut self, result: OperationResult) -> Result<()>;
}

/// Password capability handed to an extracting engine.
pub trait PasswordProvider {
    /// Returns the password, asking the user if none is cached.
    ///
    /// Fails with [`Error::Cancelled`] if the user declines.
    fn password(&mut self) -> Result<Password>;
}

/// The three capabilities an engine receives for one extraction batch.
pub struct ExtractCallbacks<'a> {
    /// Byte progress.
    pub progress: &'a mut dyn ProgressSink,
    /// Output streams and results.
    pub streams: &'a mut dyn StreamProvider,
    /// Lazy password.
    pub password: &'a mut dyn PasswordProvider,
}

/// Callback surface available while an engine opens a stream.
pub trait OpenCallback {
    /// Sets open totals (items and/or bytes) when the engine knows them.
    fn set_total(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()>;

    /// Sets open progress.
    fn set_completed(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()>;

    /// File name of the stream being opened, if it has one.
    fn volume_name(&self) -> Option<&str>;

    /// Opens a sibling volume by file name. `None` if it does not exist.
    fn open_volume(&mut self, name: &str) -> Result<Option<SharedStream>>;

    /// Returns the password for encrypted headers.
    fn password(&mut self) -> Result<Password>;
}

/// A registered container format implementation.
pub trait Codec: Send + Sync {
    /// Tries to open `stream` (positioned at 0).
    ///
    /// Returns `Ok(None)` when the stream is not in this format. Formats must
    /// find their signature within the first `max_check_start` bytes.
    fn open(
        &self,
        stream: SharedStream,
        max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>>;
}

/// An opened archive.
pub trait InArchive {
    /// Number of items.
    fn item_count(&self) -> u32;

    /// Properties of item `index`.
    fn item(&self, index: u32) -> Result<ArchiveItem>;

    /// Index of the item holding an embedded archive, for wrapper formats.
    fn main_subfile(&self) -> Option<u32> {
        None
    }

    /// Opens the decoded content of an item as a seekable stream.
    fn open_item(&mut self, index: u32) -> Result<Option<SharedStream>> {
        let _ = index;
        Ok(None)
    }

    /// Decodes the items in `indices` (ascending) through `callbacks`.
    ///
    /// Per-item decode failures are reported through
    /// [`StreamProvider::set_operation_result`]; an `Err` return is fatal for
    /// the batch.
    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()>;

    /// Releases engine resources.
    fn close(&mut self) {}
}

/// Copies `reader` into `writer`, reporting cumulative progress.
///
/// The outer `Result` carries fatal callback failures (cancellation); the
/// inner one carries a decode failure on the read side. `writer` of `None`
/// decodes without storing (test mode).
pub fn transfer(
    reader: &mut dyn Read,
    mut writer: Option<&mut (dyn Write + '_)>,
    progress: &mut dyn ProgressSink,
    completed: &mut u64,
) -> Result<std::result::Result<u64, io::Error>> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Ok(Err(e)),
        };
        if let Some(out) = writer.as_deref_mut() {
            out.write_all(&buf[..n]).map_err(Error::from_io)?;
        }
        total += n as u64;
        *completed += n as u64;
        progress.set_completed(*completed)?;
    }
    if let Some(out) = writer {
        out.flush().map_err(Error::from_io)?;
    }
    Ok(Ok(total))
}
