//! Output stream for one destination file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::callbacks::JobContext;
use crate::fs;
use crate::{Error, Result};

/// Writes one file for the engine.
///
/// A failed write is routed through the job's no-retry policy and puts
/// the stream into a failed state: later writes are swallowed but reported
/// as fully consumed so the engine keeps going, and the partial file is
/// deleted when the stream is dropped. A healthy stream is flushed and
/// truncated to the bytes actually written on drop.
pub(super) struct FileExtractStream<'c, 'j, 'a> {
    ctx: &'c JobContext<'j, 'a>,
    path: PathBuf,
    out: Option<BufWriter<File>>,
    created: bool,
    failed: bool,
    written: u64,
}

impl<'c, 'j, 'a> FileExtractStream<'c, 'j, 'a> {
    /// Creates (or truncates) the destination and reserves `size` bytes.
    pub fn create(ctx: &'c JobContext<'j, 'a>, path: PathBuf, size: u64) -> Result<Self> {
        let mut stream = Self {
            ctx,
            path,
            out: None,
            created: false,
            failed: false,
            written: 0,
        };
        let Some(mut file) = ctx.retry(&stream.path, || fs::create_file(&stream.path))? else {
            stream.failed = true;
            ctx.update_current(|current| current.failed = true);
            return Ok(stream);
        };
        stream.created = true;
        ctx.update_current(|current| current.created = true);
        if let Err(e) = fs::allocate(&mut file, size) {
            stream.fail(e)?;
        }
        stream.out = Some(BufWriter::new(file));
        Ok(stream)
    }

    /// Enters the failed state after routing `error` through the policy.
    fn fail(&mut self, error: io::Error) -> Result<()> {
        self.failed = true;
        self.ctx.update_current(|current| current.failed = true);
        self.ctx.ignore(&self.path, &Error::from_io(error))
    }
}

impl Write for FileExtractStream<'_, '_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.failed {
            if let Some(out) = self.out.as_mut() {
                let result = match injected_failure(&self.path, self.written) {
                    Some(e) => Err(e),
                    None => out.write_all(buf),
                };
                match result {
                    Ok(()) => self.written += buf.len() as u64,
                    Err(e) => self.fail(e).map_err(Error::into_io)?,
                }
            }
        }
        self.ctx.monitor().add_file_bytes(buf.len() as u64);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed {
            return Ok(());
        }
        if let Some(Err(e)) = self.out.as_mut().map(BufWriter::flush) {
            self.fail(e).map_err(Error::into_io)?;
        }
        Ok(())
    }
}

impl Drop for FileExtractStream<'_, '_, '_> {
    fn drop(&mut self) {
        if let Some(out) = self.out.take() {
            if self.failed {
                // Drop buffered bytes instead of flushing them.
                drop(out.into_parts());
            } else {
                let finished = out
                    .into_inner()
                    .map_err(io::IntoInnerError::into_error)
                    .and_then(|file| file.set_len(self.written));
                if let Err(e) = finished {
                    // An abort chosen here surfaces at the next callback.
                    let _ = self.fail(e);
                }
            }
        }
        if self.failed && self.created {
            log::debug!("removing failed file {}", self.path.display());
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("failed to remove partial file {}: {}", self.path.display(), e);
            }
        }
        let written = self.written;
        self.ctx.update_current(|current| current.written = written);
    }
}

#[cfg(not(test))]
fn injected_failure(_path: &Path, _written: u64) -> Option<io::Error> {
    None
}

#[cfg(test)]
thread_local! {
    static FAIL_MID_WRITE: std::cell::RefCell<Option<PathBuf>> = const { std::cell::RefCell::new(None) };
}

/// Makes every write to `path` after the first one fail on this thread.
#[cfg(test)]
pub(super) fn fail_mid_write(path: Option<PathBuf>) {
    FAIL_MID_WRITE.with(|target| *target.borrow_mut() = path);
}

#[cfg(test)]
fn injected_failure(path: &Path, written: u64) -> Option<io::Error> {
    let hit = written > 0 && FAIL_MID_WRITE.with(|target| target.borrow().as_deref() == Some(path));
    hit.then(|| io::Error::new(io::ErrorKind::StorageFull, "no space left on device"))
}
