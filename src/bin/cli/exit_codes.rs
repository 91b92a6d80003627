//! Exit codes for the CLI tool.

use arcx::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 1;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 2;
/// No format recognized the file
pub const NOT_AN_ARCHIVE: i32 = 3;
/// Job completed but some failures were ignored
pub const WARNING: i32 = 4;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    FatalError,
    BadArgs,
    NotAnArchive,
    Warning,
    UserInterrupt,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::FatalError => FATAL_ERROR,
            Self::BadArgs => BAD_ARGS,
            Self::NotAnArchive => NOT_AN_ARCHIVE,
            Self::Warning => WARNING,
            Self::UserInterrupt => USER_INTERRUPT,
        }
    }
}

/// Converts an arcx error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::NotAnArchive => ExitCode::NotAnArchive,
        Error::Cancelled => ExitCode::UserInterrupt,
        Error::InvalidIndex { .. } => ExitCode::BadArgs,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}
