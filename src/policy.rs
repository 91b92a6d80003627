//! Retry/ignore decisions for per-path failures.
//!
//! Every fallible step of an extraction job (directory creation, file open
//! and write, attribute restore, decode results) funnels its failure through
//! one [`ErrorPolicy`]. The policy asks the user what to do unless an earlier
//! "ignore all" answer silenced prompts for the rest of the job, and it
//! records every ignored failure in an [`ErrorLog`] that the caller receives
//! when the job ends.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// The answer a user gives to a failure prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Attempt the same operation again.
    Retry,
    /// Skip this failure.
    Ignore,
    /// Skip this failure and every later one without asking.
    IgnoreAll,
    /// Abort the whole job.
    Abort,
}

/// What the caller of [`ErrorPolicy::resolve`] must do next.
///
/// Abort is not a variant: it surfaces as `Err(Error::Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Run the failed operation again.
    Retry,
    /// Continue; the failure has been logged.
    Ignore,
}

/// One ignored failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// Destination (or archive) path the failure concerns.
    pub path: PathBuf,
    /// Human-readable description of the failure.
    pub detail: String,
}

impl fmt::Display for ErrorLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.detail)
    }
}

/// Append-only list of ignored failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: Vec<ErrorLogEntry>,
}

impl ErrorLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, path: impl Into<PathBuf>, detail: impl Into<String>) {
        self.entries.push(ErrorLogEntry {
            path: path.into(),
            detail: detail.into(),
        });
    }

    /// Returns the recorded entries in order of occurrence.
    pub fn entries(&self) -> &[ErrorLogEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was ignored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, ErrorLogEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for ErrorLog {
    type Item = ErrorLogEntry;
    type IntoIter = std::vec::IntoIter<ErrorLogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a ErrorLogEntry;
    type IntoIter = std::slice::Iter<'a, ErrorLogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Per-job retry/ignore state machine.
///
/// The `ask` closure passed to [`resolve`](Self::resolve) and
/// [`ignore`](Self::ignore) is the UI hook; it receives the path, the error,
/// and whether retry may be offered. It is not called at all once
/// ignore-all is in effect.
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    ignore_all: bool,
    log: ErrorLog,
}

impl ErrorPolicy {
    /// Creates a policy. `ignore_all` pre-sets the ignore-errors flag.
    pub fn new(ignore_all: bool) -> Self {
        Self {
            ignore_all,
            log: ErrorLog::new(),
        }
    }

    /// Returns true once prompts are silenced for the job.
    pub fn ignores_all(&self) -> bool {
        self.ignore_all
    }

    /// Decides what to do about a failure that may be retried.
    pub fn resolve<F>(&mut self, path: &Path, error: &Error, ask: F) -> Result<Resolution>
    where
        F: FnOnce(&Path, &Error, bool) -> ErrorAction,
    {
        self.decide(path, error, true, ask)
    }

    /// Decides what to do about a failure that cannot be retried, such as a
    /// decode result the engine already reported.
    ///
    /// Returns `Ok(())` when the failure was ignored and logged.
    pub fn ignore<F>(&mut self, path: &Path, error: &Error, ask: F) -> Result<()>
    where
        F: FnOnce(&Path, &Error, bool) -> ErrorAction,
    {
        self.decide(path, error, false, ask).map(|_| ())
    }

    fn decide<F>(&mut self, path: &Path, error: &Error, allow_retry: bool, ask: F) -> Result<Resolution>
    where
        F: FnOnce(&Path, &Error, bool) -> ErrorAction,
    {
        if error.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !self.ignore_all {
            match ask(path, error, allow_retry) {
                ErrorAction::Retry if allow_retry => return Ok(Resolution::Retry),
                // A retry answer where none was offered is treated as ignore.
                ErrorAction::Retry | ErrorAction::Ignore => {}
                ErrorAction::IgnoreAll => {
                    log::debug!("ignoring all further errors after {}", path.display());
                    self.ignore_all = true;
                }
                ErrorAction::Abort => return Err(Error::Cancelled),
            }
        }
        log::warn!("ignored error on {}: {}", path.display(), error);
        self.log.push(path, error.to_string());
        Ok(Resolution::Ignore)
    }

    /// Returns the failures ignored so far.
    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    /// Consumes the policy, returning its log.
    pub fn into_log(self) -> ErrorLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn io_error() -> Error {
        Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }

    #[test]
    fn test_retry_is_not_logged() {
        let mut policy = ErrorPolicy::new(false);
        let res = policy
            .resolve(Path::new("a"), &io_error(), |_, _, allow_retry| {
                assert!(allow_retry);
                ErrorAction::Retry
            })
            .unwrap();
        assert_eq!(res, Resolution::Retry);
        assert!(policy.log().is_empty());
    }

    #[test]
    fn test_ignore_logs_entry() {
        let mut policy = ErrorPolicy::new(false);
        let res = policy
            .resolve(Path::new("dir/a.txt"), &io_error(), |_, _, _| ErrorAction::Ignore)
            .unwrap();
        assert_eq!(res, Resolution::Ignore);
        assert_eq!(policy.log().len(), 1);
        assert_eq!(policy.log().entries()[0].path, PathBuf::from("dir/a.txt"));
        assert!(!policy.ignores_all());
    }

    #[test]
    fn test_ignore_all_silences_later_prompts() {
        let mut policy = ErrorPolicy::new(false);
        policy
            .resolve(Path::new("a"), &io_error(), |_, _, _| ErrorAction::IgnoreAll)
            .unwrap();
        for name in ["b", "c"] {
            policy
                .resolve(Path::new(name), &io_error(), |_, _, _| {
                    panic!("prompted after ignore-all")
                })
                .unwrap();
        }
        policy
            .ignore(Path::new("d"), &io_error(), |_, _, _| panic!("prompted after ignore-all"))
            .unwrap();
        let paths: Vec<_> = policy.log().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, ["a", "b", "c", "d"].map(PathBuf::from));
    }

    #[test]
    fn test_abort_is_cancellation() {
        let mut policy = ErrorPolicy::new(false);
        let err = policy
            .resolve(Path::new("a"), &io_error(), |_, _, _| ErrorAction::Abort)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(policy.log().is_empty());
    }

    #[test]
    fn test_no_retry_variant() {
        let mut policy = ErrorPolicy::new(false);
        policy
            .ignore(Path::new("a"), &io_error(), |_, _, allow_retry| {
                assert!(!allow_retry);
                ErrorAction::Retry
            })
            .unwrap();
        assert_eq!(policy.log().len(), 1);
    }

    #[test]
    fn test_preset_flag_never_prompts() {
        let mut policy = ErrorPolicy::new(true);
        policy
            .resolve(Path::new("a"), &io_error(), |_, _, _| panic!("prompted"))
            .unwrap();
        assert_eq!(policy.into_log().len(), 1);
    }

    #[test]
    fn test_cancellation_is_never_ignored() {
        let mut policy = ErrorPolicy::new(true);
        let err = policy
            .resolve(Path::new("a"), &Error::Cancelled, |_, _, _| ErrorAction::Ignore)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
