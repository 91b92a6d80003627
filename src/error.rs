//! Error types for detection and extraction.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the crate, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Categories
//!
//! | Category | Variants | Handling |
//! |----------|----------|----------|
//! | Detection | [`NotAnArchive`][Error::NotAnArchive], [`InvalidFormat`][Error::InvalidFormat] | per-format mismatches are swallowed by the detector |
//! | Recoverable I/O | [`Io`][Error::Io] | routed through the job's [`ErrorPolicy`](crate::ErrorPolicy) |
//! | Decode | [`Decode`][Error::Decode] | reported by the engine, routed through the no-retry policy |
//! | Fatal | [`Cancelled`][Error::Cancelled], [`ChainBroken`][Error::ChainBroken], [`ArchiveClosed`][Error::ArchiveClosed] | unwinds the job |
//!
//! Ignored errors never reach the caller as an `Err`: they are collected in the
//! [`ErrorLog`](crate::ErrorLog) returned with the
//! [`ExtractReport`](crate::ExtractReport).
//!
//! ```rust
//! use arcx::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::Cancelled => "aborted by the user",
//!         Error::NotAnArchive => "not an archive",
//!         Error::Io(_) => "file system error",
//!         _ => "other error",
//!     }
//! }
//! # assert_eq!(describe(&Error::Cancelled), "aborted by the user");
//! ```

use std::io;

use crate::codec::OperationResult;

/// The main error type for archive detection and extraction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation was aborted, either by the user at a prompt or by a
    /// cancel request.
    ///
    /// This is the distinguished value every layer propagates to unwind a job.
    #[error("Operation cancelled")]
    Cancelled,

    /// No registered format recognized the stream.
    #[error("File is not a recognized archive")]
    NotAnArchive,

    /// The stream was recognized by a format but its contents are malformed.
    #[error("Invalid archive data: {0}")]
    InvalidFormat(String),

    /// The engine reported a failed per-file decode result.
    #[error("{result}")]
    Decode {
        /// The result code reported by the engine.
        result: OperationResult,
    },

    /// An entry index outside the open archive was requested.
    #[error("Entry index {index} is out of range")]
    InvalidIndex {
        /// The offending index.
        index: u32,
    },

    /// The archive was closed; reopen it first.
    #[error("Archive is closed")]
    ArchiveClosed,

    /// A format of a previously selected chain no longer matches the stream on reopen.
    #[error("Archive no longer opens as {format}")]
    ChainBroken {
        /// Name of the format that failed to open.
        format: String,
    },
}

impl Error {
    /// Returns true if this error is the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns true if this error may be retried or ignored per file.
    ///
    /// Cancellation, broken chains, and closed archives are job-level
    /// failures; everything else concerns a single path.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Cancelled | Error::ChainBroken { .. } | Error::ArchiveClosed)
    }

    /// Recovers a crate error that was tunneled through an [`io::Error`].
    ///
    /// Output streams implement [`std::io::Write`], so a cancellation raised
    /// inside a write travels through the engine as an `io::Error`. This
    /// unwraps it again; any other I/O error becomes [`Error::Io`].
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(error) = inner.downcast::<Error>() {
                    return *error;
                }
            }
            return Error::InvalidFormat("unrecognized wrapped error".into());
        }
        Error::Io(err)
    }

    /// Wraps this error into an [`io::Error`] for crossing `Read`/`Write` boundaries.
    pub fn into_io(self) -> io::Error {
        match self {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_roundtrips_through_io() {
        let io_err = Error::Cancelled.into_io();
        assert!(Error::from_io(io_err).is_cancelled());
    }

    #[test]
    fn test_plain_io_stays_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        match Error::from_io(io_err) {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_io_error_is_not_double_wrapped() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.into_io().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_classification() {
        assert!(!Error::Cancelled.is_recoverable());
        assert!(!Error::ChainBroken { format: "Tar".into() }.is_recoverable());
        assert!(
            Error::Decode {
                result: OperationResult::CrcError
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_display() {
        let err = Error::Decode {
            result: OperationResult::DataError,
        };
        assert_eq!(err.to_string(), "Data error");
        assert_eq!(
            Error::InvalidIndex { index: 7 }.to_string(),
            "Entry index 7 is out of range"
        );
    }
}
