//! Extraction jobs.
//!
//! A job materializes a selection of the archive tree under a destination
//! directory in three passes:
//!
//! 1. **Preparing**: the destination and every selected directory are
//!    created, and the selected files are collected into one ascending
//!    index list.
//! 2. **Extracting**: the engine decodes that list, asking the job for one
//!    output stream per file and reporting each file's decode result.
//! 3. **Restoring attributes**: timestamps and attribute bits are written
//!    back, deepest entries first, so a read-only directory never blocks
//!    work inside it.
//!
//! Every per-path failure goes through the job's
//! [`ErrorPolicy`](crate::ErrorPolicy); ignored failures end up in the
//! [`ExtractReport`], never in an `Err`. Only an abort (the user cancels,
//! or the engine fails outright) stops the job early, and then the
//! attribute pass is skipped.
//!
//! # Example
//!
//! ```rust,no_run
//! use arcx::{Archive, AutoPrompter, ExtractRequest, OverwritePolicy};
//! use arcx::progress::NoProgress;
//!
//! # fn main() -> arcx::Result<()> {
//! let mut prompter = AutoPrompter::new();
//! let mut archive = Archive::open("data.tar.gz", &mut prompter, &mut NoProgress)?;
//! let request = ExtractRequest::new("out").overwrite(OverwritePolicy::OverwriteAll);
//! let report = archive.extract(&request, &mut prompter, &mut NoProgress)?;
//! for entry in &report.errors {
//!     eprintln!("{entry}");
//! }
//! # Ok(())
//! # }
//! ```

mod attributes;
mod callbacks;
mod prepare;
mod stream;

use std::path::{Path, PathBuf};

use crate::codec::{AskMode, ExtractCallbacks, FaultLog, InArchive};
use crate::password::Password;
use crate::policy::ErrorLog;
use crate::progress::{Phase, ProgressMonitor, ProgressReporter};
use crate::prompt::Prompter;
use crate::tree::{FileTree, ROOT};
use crate::{Error, Result};

use callbacks::{JobContext, JobPassword, JobProgress, JobStreams};

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Ask each time. An "all" answer switches the rest of the job to
    /// [`OverwriteAll`](Self::OverwriteAll) or [`SkipAll`](Self::SkipAll).
    #[default]
    AskEachTime,
    /// Replace existing files.
    OverwriteAll,
    /// Keep existing files.
    SkipAll,
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Creating the directory skeleton.
    Preparing,
    /// The engine is decoding files.
    Extracting,
    /// Writing timestamps and attributes.
    RestoringAttributes,
    /// Every pass ran to completion.
    Done,
    /// The job stopped early.
    Aborted,
}

/// Parameters of one extraction job.
///
/// # Example
///
/// ```rust
/// use arcx::{ExtractRequest, OverwritePolicy};
///
/// let request = ExtractRequest::new("out")
///     .roots([0, 3])
///     .overwrite(OverwritePolicy::SkipAll)
///     .ignore_errors(true);
/// assert_eq!(request.roots, Some(vec![0, 3]));
/// ```
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Destination directory; created if missing.
    pub dest: PathBuf,
    /// Tree indices to extract. `None` selects every child of
    /// [`source_dir`](Self::source_dir).
    pub roots: Option<Vec<u32>>,
    /// Entry that maps onto `dest`. Paths are built by walking parents up
    /// to this entry. Defaults to the tree root.
    pub source_dir: u32,
    /// Policy for existing destination files.
    pub overwrite: OverwritePolicy,
    /// Starts the job with prompts on failures silenced.
    pub ignore_errors: bool,
    /// Password to use instead of asking.
    pub password: Option<Password>,
}

impl ExtractRequest {
    /// Creates a request extracting everything into `dest`.
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            roots: None,
            source_dir: ROOT,
            overwrite: OverwritePolicy::default(),
            ignore_errors: false,
            password: None,
        }
    }

    /// Selects the entries to extract.
    pub fn roots(mut self, roots: impl IntoIterator<Item = u32>) -> Self {
        self.roots = Some(roots.into_iter().collect());
        self
    }

    /// Sets the entry that maps onto the destination.
    pub fn source_dir(mut self, index: u32) -> Self {
        self.source_dir = index;
        self
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets the initial ignore-errors flag.
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Outcome of an extraction job.
#[derive(Debug)]
pub struct ExtractReport {
    /// [`JobState::Done`] or [`JobState::Aborted`].
    pub state: JobState,
    /// Files written and confirmed by the engine.
    pub files_extracted: u64,
    /// Files left alone because they already existed.
    pub files_skipped: u64,
    /// Bytes written to confirmed files.
    pub bytes_written: u64,
    /// Every failure that was ignored, in order.
    pub errors: ErrorLog,
    /// Why the job aborted, unless the user cancelled it.
    pub failure: Option<Error>,
}

impl ExtractReport {
    /// Returns true if the job ran to completion.
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    /// Returns true if the job ran to completion without ignoring anything.
    pub fn is_clean(&self) -> bool {
        self.is_done() && self.errors.is_empty()
    }

    /// Returns true if the user cancelled the job.
    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Aborted && self.failure.is_none()
    }
}

/// Runs one job against an opened engine.
///
/// `password` is the archive's cache; it is read before the job and
/// updated with whatever password the job ended up using.
pub(crate) fn run(
    engine: &mut dyn InArchive,
    tree: &FileTree,
    faults: &FaultLog,
    request: &ExtractRequest,
    password: &mut Option<Password>,
    prompter: &mut dyn Prompter,
    reporter: &mut dyn ProgressReporter,
) -> Result<ExtractReport> {
    let roots = select_roots(tree, request)?;
    let monitor = ProgressMonitor::new(reporter);
    let cached = request.password.clone().or_else(|| password.clone());
    let ctx = JobContext::new(&monitor, prompter, tree, faults.clone(), request, cached);

    let report = execute(engine, &ctx, &roots);
    if let Some(used) = ctx.password_used() {
        *password = Some(used);
    }
    let (state, failure) = match report {
        Ok(()) => (JobState::Done, None),
        Err(Error::Cancelled) => (JobState::Aborted, None),
        Err(e) => (JobState::Aborted, Some(e)),
    };
    log::debug!("extraction into {} finished: {:?}", request.dest.display(), state);
    Ok(ctx.into_report(state, failure))
}

fn execute(engine: &mut dyn InArchive, ctx: &JobContext<'_, '_>, roots: &[u32]) -> Result<()> {
    ctx.set_state(JobState::Preparing);
    ctx.monitor().start_phase(Phase::CreatingDirectories);
    let files = prepare::prepare(ctx, roots)?;
    log::debug!("{} file(s) selected for extraction", files.len());

    ctx.set_state(JobState::Extracting);
    ctx.monitor().start_phase(Phase::Extracting);
    let outcome = {
        let mut progress = JobProgress::new(ctx);
        let mut streams = JobStreams::new(ctx);
        let mut password = JobPassword::new(ctx);
        let mut callbacks = ExtractCallbacks {
            progress: &mut progress,
            streams: &mut streams,
            password: &mut password,
        };
        engine.extract(&files, AskMode::Extract, &mut callbacks)
    };
    let outcome = match outcome {
        // An abort raised where no error could be returned (a stream's
        // destructor) still ends the job.
        Ok(()) if ctx.is_aborted() => Err(Error::Cancelled),
        Err(_) if ctx.is_aborted() => Err(Error::Cancelled),
        other => other,
    };
    if let Err(e) = outcome {
        ctx.discard_unconfirmed();
        return Err(e);
    }

    ctx.set_state(JobState::RestoringAttributes);
    ctx.monitor().start_phase(Phase::RestoringAttributes);
    for &root in roots {
        attributes::restore(ctx, root)?;
    }
    Ok(())
}

/// Validates the request's indices and resolves the default selection.
fn select_roots(tree: &FileTree, request: &ExtractRequest) -> Result<Vec<u32>> {
    let source = match request.source_dir {
        index if tree.is_root_alias(index) => ROOT,
        index => index,
    };
    if source != ROOT && !tree.get(source).is_some_and(|entry| entry.is_dir) {
        return Err(Error::InvalidIndex { index: source });
    }
    match &request.roots {
        None => Ok(tree.children(source).to_vec()),
        Some(roots) => {
            if let Some(&index) = roots.iter().find(|&&i| tree.get(i).is_none()) {
                return Err(Error::InvalidIndex { index });
            }
            // A `./` entry stands for everything at the top level.
            let mut selected = Vec::with_capacity(roots.len());
            for &index in roots {
                if tree.is_root_alias(index) {
                    selected.extend_from_slice(tree.children(ROOT));
                } else {
                    selected.push(index);
                }
            }
            Ok(selected)
        }
    }
}

/// Destination path of `index`.
pub(crate) fn dest_path(tree: &FileTree, dest: &Path, source_dir: u32, index: u32) -> PathBuf {
    dest.join(tree.relative_path(index, source_dir))
}
