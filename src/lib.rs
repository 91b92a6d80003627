//! # arcx
//!
//! Format detection and extraction for archive files.
//!
//! `arcx` probes a file against every registered format, follows wrapper
//! formats into the archive they carry (a `.tar.gz` is detected as both
//! `GZip` and `GZip->Tar`), and extracts a selection of the chosen
//! archive's tree to disk. Failures on individual paths go through an
//! interactive retry/ignore/abort policy, and timestamps and attribute bits
//! are restored after the data is written.
//!
//! ## Quick Start
//!
//! ### Listing an Archive
//!
//! ```rust,no_run
//! use arcx::{Archive, AutoPrompter, Result};
//! use arcx::progress::NoProgress;
//!
//! fn main() -> Result<()> {
//!     let archive = Archive::open("backup.tar.gz", &mut AutoPrompter::new(), &mut NoProgress)?;
//!     println!("opened as {}", archive.chain());
//!     for (_, entry) in archive.tree().iter() {
//!         println!("{} ({} bytes)", entry.name, entry.size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting
//!
//! ```rust,no_run
//! use arcx::{Archive, AutoPrompter, ErrorAction, ExtractRequest, OverwritePolicy, Result};
//! use arcx::progress::NoProgress;
//!
//! fn main() -> Result<()> {
//!     let mut prompter = AutoPrompter::new().on_error(ErrorAction::Ignore);
//!     let mut archive = Archive::open("data.zip", &mut prompter, &mut NoProgress)?;
//!
//!     let request = ExtractRequest::new("./output").overwrite(OverwritePolicy::OverwriteAll);
//!     let report = archive.extract(&request, &mut prompter, &mut NoProgress)?;
//!     println!("{} files, {} ignored errors", report.files_extracted, report.errors.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Prompts
//!
//! Every question the library needs answered goes through a [`Prompter`]:
//! what to do about a failed path, whether to replace an existing file,
//! which password to use and which of several detected formats to open.
//! [`AutoPrompter`] answers from fixed settings; interactive front ends
//! implement the trait themselves. Progress rendering is paused around each
//! prompt through [`ProgressReporter::on_suspend`](progress::ProgressReporter::on_suspend).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `gzip` | Yes | GZip through `flate2` |
//! | `bzip2` | Yes | BZip2 through `bzip2` |
//! | `tar` | Yes | Tar through `tar` |
//! | `zip` | Yes | Zip (including encrypted entries) through `zip` |
//! | `zstd` | No | Zstandard through `zstd` |
//! | `cli` | No | The `arcx` command-line tool |
//!
//! Split volumes (`name.001`, `name.002`, ...) are always available.
//!
//! ## Error Handling
//!
//! Opening and job setup return [`Result<T>`]. Once a job runs, ignored
//! failures are collected in the report's [`ErrorLog`] instead:
//!
//! ```rust,no_run
//! use arcx::{Archive, AutoPrompter, Error};
//! use arcx::progress::NoProgress;
//!
//! fn open(path: &str) -> arcx::Result<()> {
//!     match Archive::open(path, &mut AutoPrompter::new(), &mut NoProgress) {
//!         Ok(archive) => {
//!             println!("{} entries", archive.tree().len());
//!             Ok(())
//!         }
//!         Err(Error::NotAnArchive) => {
//!             eprintln!("{path}: unrecognized format");
//!             Ok(())
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive;
pub mod codec;
pub mod codecs;
pub mod error;
pub mod extract;
pub mod format;
pub mod fs;
pub mod password;
pub mod policy;
pub mod progress;
pub mod prompt;
pub mod timestamp;
pub mod tree;

pub use archive::Archive;
pub use error::{Error, Result};
pub use password::Password;
pub use timestamp::Timestamp;

// Re-export extraction API at crate root for convenience
pub use extract::{ExtractReport, ExtractRequest, JobState, OverwritePolicy};
pub use policy::{ErrorAction, ErrorLog, ErrorLogEntry, ErrorPolicy, Resolution};
pub use prompt::{AutoPrompter, ExistingFile, OverwriteAction, Prompter};

// Re-export detection API
pub use format::{ArchiveFormat, FormatChain, FormatDetector, FormatId, FormatRegistry};

pub use fs::FileAttributes;
pub use tree::{FileEntry, FileTree, ROOT};
