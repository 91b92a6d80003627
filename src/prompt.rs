//! The user-interaction collaborator.
//!
//! Jobs never talk to a terminal or dialog directly. Every decision that may
//! need a human (retry/ignore, overwrite, password, ambiguous format) is a
//! synchronous call on an injected [`Prompter`]. The job suspends progress
//! rendering around each call.

use std::path::Path;
use std::time::SystemTime;

use crate::Error;
use crate::password::Password;
use crate::policy::ErrorAction;
use crate::tree::FileEntry;

/// The answer to an overwrite confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteAction {
    /// Overwrite this file.
    Overwrite,
    /// Overwrite this and every later conflicting file.
    OverwriteAll,
    /// Keep the existing file.
    Skip,
    /// Keep this and every later conflicting file.
    SkipAll,
    /// Abort the job.
    Cancel,
}

/// Facts about a destination file that already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFile {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

impl ExistingFile {
    /// Captures the facts from filesystem metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Synchronous UI hooks used by detection and extraction.
pub trait Prompter {
    /// Asks what to do about a failure on `path`.
    ///
    /// When `allow_retry` is false the UI must not offer retry; a `Retry`
    /// answer is then treated as `Ignore`.
    fn error_action(&mut self, path: &Path, error: &Error, allow_retry: bool) -> ErrorAction;

    /// Asks whether `existing` at `path` should be replaced by `incoming`.
    fn overwrite(&mut self, path: &Path, incoming: &FileEntry, existing: &ExistingFile) -> OverwriteAction;

    /// Asks for a password. `None` aborts the operation.
    fn password(&mut self) -> Option<Password>;

    /// Asks which of several detected format chains to open.
    ///
    /// `chains` holds display names such as `GZip->Tar`. `None` aborts.
    fn select_format(&mut self, chains: &[String]) -> Option<usize>;
}

/// A prompter with fixed answers, for non-interactive runs.
///
/// The default answers abort on errors, skip existing files, supply no
/// password, and refuse to pick between ambiguous formats.
#[derive(Debug, Clone)]
pub struct AutoPrompter {
    /// Answer to every failure prompt.
    pub error_action: ErrorAction,
    /// Answer to every overwrite prompt.
    pub overwrite: OverwriteAction,
    /// Password to hand out.
    pub password: Option<Password>,
    /// Chain to pick when detection is ambiguous.
    pub format: Option<usize>,
}

impl Default for AutoPrompter {
    fn default() -> Self {
        Self {
            error_action: ErrorAction::Abort,
            overwrite: OverwriteAction::Skip,
            password: None,
            format: None,
        }
    }
}

impl AutoPrompter {
    /// Creates a prompter with the default answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer to failure prompts.
    pub fn on_error(mut self, action: ErrorAction) -> Self {
        self.error_action = action;
        self
    }

    /// Sets the answer to overwrite prompts.
    pub fn on_overwrite(mut self, action: OverwriteAction) -> Self {
        self.overwrite = action;
        self
    }

    /// Sets the password to supply.
    pub fn with_password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the chain to pick when several formats match.
    pub fn format(mut self, index: usize) -> Self {
        self.format = Some(index);
        self
    }
}

impl Prompter for AutoPrompter {
    fn error_action(&mut self, _path: &Path, _error: &Error, _allow_retry: bool) -> ErrorAction {
        // Retrying forever would hang a non-interactive run.
        match self.error_action {
            ErrorAction::Retry => ErrorAction::Ignore,
            other => other,
        }
    }

    fn overwrite(&mut self, _path: &Path, _incoming: &FileEntry, _existing: &ExistingFile) -> OverwriteAction {
        self.overwrite
    }

    fn password(&mut self) -> Option<Password> {
        self.password.clone()
    }

    fn select_format(&mut self, chains: &[String]) -> Option<usize> {
        self.format.filter(|&index| index < chains.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_conservative() {
        let mut prompter = AutoPrompter::new();
        let err = Error::NotAnArchive;
        assert_eq!(prompter.error_action(Path::new("a"), &err, true), ErrorAction::Abort);
        assert!(prompter.password().is_none());
        assert_eq!(prompter.select_format(&["Zip".into(), "Tar".into()]), None);
    }

    #[test]
    fn test_supplied_password_is_answered() {
        let mut prompter = AutoPrompter::new().with_password("hunter2");
        assert_eq!(prompter.password().map(|p| p.as_str().to_owned()), Some("hunter2".to_owned()));
    }

    #[test]
    fn test_retry_becomes_ignore() {
        let mut prompter = AutoPrompter::new().on_error(ErrorAction::Retry);
        let err = Error::NotAnArchive;
        assert_eq!(prompter.error_action(Path::new("a"), &err, true), ErrorAction::Ignore);
    }

    #[test]
    fn test_format_index_bounds() {
        let mut prompter = AutoPrompter::new().format(3);
        assert_eq!(prompter.select_format(&["Zip".into()]), None);
        let mut prompter = AutoPrompter::new().format(1);
        assert_eq!(prompter.select_format(&["Zip".into(), "Zip->Tar".into()]), Some(1));
    }
}
