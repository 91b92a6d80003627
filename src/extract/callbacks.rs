//! Per-job state and the engine-facing capability objects.

use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::stream::FileExtractStream;
use super::{ExtractReport, ExtractRequest, JobState, OverwritePolicy, dest_path};
use crate::codec::{AskMode, FaultLog, OperationResult, PasswordProvider, ProgressSink, StreamProvider};
use crate::fs;
use crate::password::Password;
use crate::policy::{ErrorPolicy, Resolution};
use crate::progress::ProgressMonitor;
use crate::prompt::{ExistingFile, OverwriteAction, Prompter};
use crate::tree::{FileEntry, FileTree};
use crate::{Error, Result};

/// The file whose stream was handed out last and has no result yet.
#[derive(Debug)]
pub(super) struct CurrentFile {
    pub index: u32,
    pub path: PathBuf,
    /// The destination file exists on disk.
    pub created: bool,
    /// A write failed; the file is (or will be) deleted.
    pub failed: bool,
    pub written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    extracted: u64,
    skipped: u64,
    bytes: u64,
}

/// Everything a job mutates, shared by reference between its callbacks.
///
/// The engine drives the job synchronously on one thread, so the flags
/// live in cells rather than behind locks.
pub(crate) struct JobContext<'j, 'a> {
    monitor: &'j ProgressMonitor<'a>,
    prompter: RefCell<&'j mut dyn Prompter>,
    tree: &'j FileTree,
    /// Host stream failures; any recorded fault is fatal.
    faults: FaultLog,
    dest: PathBuf,
    source_dir: u32,
    policy: RefCell<ErrorPolicy>,
    overwrite: Cell<OverwritePolicy>,
    password: RefCell<Option<Password>>,
    state: Cell<JobState>,
    aborted: Cell<bool>,
    /// Entries that exist on disk: created directories and confirmed files.
    materialized: RefCell<Vec<bool>>,
    current: RefCell<Option<CurrentFile>>,
    counters: RefCell<Counters>,
}

impl<'j, 'a> JobContext<'j, 'a> {
    pub fn new(
        monitor: &'j ProgressMonitor<'a>,
        prompter: &'j mut dyn Prompter,
        tree: &'j FileTree,
        faults: FaultLog,
        request: &ExtractRequest,
        password: Option<Password>,
    ) -> Self {
        Self {
            monitor,
            prompter: RefCell::new(prompter),
            tree,
            faults,
            dest: request.dest.clone(),
            source_dir: request.source_dir,
            policy: RefCell::new(ErrorPolicy::new(request.ignore_errors)),
            overwrite: Cell::new(request.overwrite),
            password: RefCell::new(password),
            state: Cell::new(JobState::Preparing),
            aborted: Cell::new(false),
            materialized: RefCell::new(vec![false; tree.len()]),
            current: RefCell::new(None),
            counters: RefCell::new(Counters::default()),
        }
    }

    pub fn monitor(&self) -> &ProgressMonitor<'a> {
        self.monitor
    }

    pub fn tree(&self) -> &FileTree {
        self.tree
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn dest_path(&self, index: u32) -> PathBuf {
        dest_path(self.tree, &self.dest, self.source_dir, index)
    }

    pub fn set_state(&self, state: JobState) {
        log::debug!("job state: {:?}", state);
        self.state.set(state);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    /// Fails once the job was aborted or the reporter asked to cancel.
    pub fn check(&self) -> Result<()> {
        if self.aborted.get() {
            return Err(Error::Cancelled);
        }
        self.monitor.check_cancelled().map_err(|e| self.fail(e))
    }

    /// Remembers a cancellation so every later callback fails too.
    pub fn fail(&self, error: Error) -> Error {
        if error.is_cancelled() {
            self.aborted.set(true);
        }
        error
    }

    pub fn mark_materialized(&self, index: u32) {
        if let Some(slot) = self.materialized.borrow_mut().get_mut(index as usize) {
            *slot = true;
        }
    }

    pub fn is_materialized(&self, index: u32) -> bool {
        self.materialized.borrow().get(index as usize).copied().unwrap_or(false)
    }

    /// Routes a retryable failure through the policy.
    pub fn retry_or_ignore(&self, path: &Path, error: &Error) -> Result<Resolution> {
        let mut policy = self.policy.borrow_mut();
        policy
            .resolve(path, error, |p, e, retry| self.ask(p, e, retry))
            .map_err(|e| self.fail(e))
    }

    /// Routes a failure that cannot be retried through the policy.
    pub fn ignore(&self, path: &Path, error: &Error) -> Result<()> {
        let mut policy = self.policy.borrow_mut();
        policy
            .ignore(path, error, |p, e, retry| self.ask(p, e, retry))
            .map_err(|e| self.fail(e))
    }

    /// Runs `op` until it succeeds or its failure is ignored (`Ok(None)`).
    pub fn retry<T>(&self, path: &Path, mut op: impl FnMut() -> io::Result<T>) -> Result<Option<T>> {
        loop {
            match op() {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    let error = Error::from_io(e);
                    match self.retry_or_ignore(path, &error)? {
                        Resolution::Retry => log::debug!("retrying {}", path.display()),
                        Resolution::Ignore => return Ok(None),
                    }
                }
            }
        }
    }

    fn ask(&self, path: &Path, error: &Error, allow_retry: bool) -> crate::policy::ErrorAction {
        let _paused = self.monitor.suspend();
        self.prompter.borrow_mut().error_action(path, error, allow_retry)
    }

    /// Decides whether an existing destination file gets replaced.
    pub fn should_overwrite(&self, path: &Path, entry: &FileEntry, existing: &ExistingFile) -> Result<bool> {
        match self.overwrite.get() {
            OverwritePolicy::OverwriteAll => Ok(true),
            OverwritePolicy::SkipAll => Ok(false),
            OverwritePolicy::AskEachTime => {
                let action = {
                    let _paused = self.monitor.suspend();
                    self.prompter.borrow_mut().overwrite(path, entry, existing)
                };
                match action {
                    OverwriteAction::Overwrite => Ok(true),
                    OverwriteAction::Skip => Ok(false),
                    OverwriteAction::OverwriteAll => {
                        log::debug!("overwriting all remaining files");
                        self.overwrite.set(OverwritePolicy::OverwriteAll);
                        Ok(true)
                    }
                    OverwriteAction::SkipAll => {
                        log::debug!("skipping all remaining existing files");
                        self.overwrite.set(OverwritePolicy::SkipAll);
                        Ok(false)
                    }
                    OverwriteAction::Cancel => Err(self.fail(Error::Cancelled)),
                }
            }
        }
    }

    /// Returns the cached password, asking once if there is none.
    pub fn password(&self) -> Result<Password> {
        if let Some(password) = self.password.borrow().as_ref() {
            return Ok(password.clone());
        }
        let answer = {
            let _paused = self.monitor.suspend();
            self.prompter.borrow_mut().password()
        };
        match answer {
            Some(password) => {
                *self.password.borrow_mut() = Some(password.clone());
                Ok(password)
            }
            None => Err(self.fail(Error::Cancelled)),
        }
    }

    pub fn password_used(&self) -> Option<Password> {
        self.password.borrow().clone()
    }

    pub fn begin_file(&self, file: CurrentFile) {
        *self.current.borrow_mut() = Some(file);
    }

    /// Lets the open stream record what happened to the current file.
    pub fn update_current(&self, f: impl FnOnce(&mut CurrentFile)) {
        if let Some(current) = self.current.borrow_mut().as_mut() {
            f(current);
        }
    }

    /// Deletes a file whose stream was handed out but never confirmed.
    pub fn discard_unconfirmed(&self) {
        let Some(current) = self.current.borrow_mut().take() else {
            return;
        };
        if current.created && !current.failed {
            if let Err(e) = fs::remove_file(&current.path) {
                log::warn!("failed to remove partial file {}: {}", current.path.display(), e);
            }
        }
    }

    pub fn count_skipped(&self) {
        self.counters.borrow_mut().skipped += 1;
    }

    pub fn into_report(self, state: JobState, failure: Option<Error>) -> ExtractReport {
        if state == JobState::Aborted {
            log::debug!("job aborted while {:?}", self.state.get());
        }
        let counters = self.counters.into_inner();
        ExtractReport {
            state,
            files_extracted: counters.extracted,
            files_skipped: counters.skipped,
            bytes_written: counters.bytes,
            errors: self.policy.into_inner().into_log(),
            failure,
        }
    }
}

/// [`ProgressSink`] of a job.
pub(crate) struct JobProgress<'c, 'j, 'a> {
    ctx: &'c JobContext<'j, 'a>,
}

impl<'c, 'j, 'a> JobProgress<'c, 'j, 'a> {
    pub fn new(ctx: &'c JobContext<'j, 'a>) -> Self {
        Self { ctx }
    }
}

impl ProgressSink for JobProgress<'_, '_, '_> {
    fn set_total(&mut self, bytes: u64) -> Result<()> {
        self.ctx.monitor.set_total(bytes);
        self.ctx.check()
    }

    fn set_completed(&mut self, bytes: u64) -> Result<()> {
        self.ctx.monitor.set_completed(bytes);
        self.ctx.check()
    }
}

/// [`StreamProvider`] of a job: resolves paths and overwrites, hands out
/// file streams, and routes decode results through the policy.
pub(crate) struct JobStreams<'c, 'j, 'a> {
    ctx: &'c JobContext<'j, 'a>,
}

impl<'c, 'j, 'a> JobStreams<'c, 'j, 'a> {
    pub fn new(ctx: &'c JobContext<'j, 'a>) -> Self {
        Self { ctx }
    }
}

impl StreamProvider for JobStreams<'_, '_, '_> {
    fn get_stream(&mut self, index: u32, mode: AskMode) -> Result<Option<Box<dyn Write + '_>>> {
        let ctx = self.ctx;
        ctx.check()?;
        if mode != AskMode::Extract {
            return Ok(None);
        }
        let entry = ctx.tree.get(index).ok_or(Error::InvalidIndex { index })?;
        let path = ctx.dest_path(index);

        let Some(existing) = ctx.retry(&path, || fs::existing(&path))? else {
            ctx.count_skipped();
            return Ok(None);
        };
        if let Some(metadata) = existing {
            if !ctx.should_overwrite(&path, entry, &ExistingFile::from_metadata(&metadata))? {
                log::debug!("keeping existing {}", path.display());
                ctx.count_skipped();
                return Ok(None);
            }
            if metadata.file_type().is_symlink() {
                // The link is replaced; whatever it points at stays untouched.
                if ctx.retry(&path, || fs::remove_link(&path))?.is_none() {
                    ctx.count_skipped();
                    return Ok(None);
                }
            } else if let Err(e) = fs::make_writable(&path) {
                log::debug!("cannot clear protection of {}: {}", path.display(), e);
            }
        }

        ctx.monitor.start_file(&path, entry.size);
        ctx.begin_file(CurrentFile {
            index,
            path: path.clone(),
            created: false,
            failed: false,
            written: 0,
        });
        let stream = FileExtractStream::create(ctx, path, entry.size)?;
        Ok(Some(Box::new(stream)))
    }

    fn set_operation_result(&mut self, result: OperationResult) -> Result<()> {
        let ctx = self.ctx;
        ctx.check()?;
        if let Some(fault) = ctx.faults.take() {
            return Err(Error::Io(fault));
        }
        // Skipped items get a result too.
        let Some(current) = ctx.current.borrow_mut().take() else {
            return Ok(());
        };
        ctx.monitor.finish_file();
        if !result.is_ok() {
            return ctx.ignore(&current.path, &Error::Decode { result });
        }
        if current.created && !current.failed {
            ctx.mark_materialized(current.index);
            let mut counters = ctx.counters.borrow_mut();
            counters.extracted += 1;
            counters.bytes += current.written;
        }
        Ok(())
    }
}

/// [`PasswordProvider`] of a job.
pub(crate) struct JobPassword<'c, 'j, 'a> {
    ctx: &'c JobContext<'j, 'a>,
}

impl<'c, 'j, 'a> JobPassword<'c, 'j, 'a> {
    pub fn new(ctx: &'c JobContext<'j, 'a>) -> Self {
        Self { ctx }
    }
}

impl PasswordProvider for JobPassword<'_, '_, '_> {
    fn password(&mut self) -> Result<Password> {
        self.ctx.check()?;
        self.ctx.password()
    }
}
