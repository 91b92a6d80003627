//! Progress accounting for detection and extraction jobs.
//!
//! This module provides:
//! - [`ProgressState`], the counters a job maintains (job bytes, current-file
//!   bytes, file counts during open)
//! - [`ProgressReporter`], the rendering surface implemented by front-ends
//! - [`ProgressMonitor`], which owns the state for one job, throttles
//!   rendering, and offers a scoped [`suspend`](ProgressMonitor::suspend)
//!   region for modal prompts
//!
//! # Example
//!
//! ```rust
//! use arcx::progress::{Phase, ProgressMonitor, StatisticsProgress};
//!
//! let mut stats = StatisticsProgress::new();
//! {
//!     let monitor = ProgressMonitor::new(&mut stats);
//!     monitor.start_phase(Phase::Extracting);
//!     monitor.set_total(200);
//!     monitor.set_completed(50);
//!     {
//!         let _paused = monitor.suspend();
//!         // show a prompt here
//!     }
//!     assert_eq!(monitor.state().percent(), 25);
//! }
//! assert_eq!(stats.suspends, 1);
//! assert_eq!(stats.resumes, 1);
//! ```

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::{Error, Result};

// Floating point versions for formatting calculations
const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Default minimum time between two renders.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(200);

/// Job phase shown by the progress surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Detecting formats and reading archive headers.
    #[default]
    Opening,
    /// Creating the destination directory skeleton.
    CreatingDirectories,
    /// Streaming file contents to disk.
    Extracting,
    /// Restoring attributes and timestamps.
    RestoringAttributes,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Opening => "Opening",
            Phase::CreatingDirectories => "Creating directories",
            Phase::Extracting => "Extracting",
            Phase::RestoringAttributes => "Setting attributes",
        };
        f.write_str(label)
    }
}

/// Counters of a running job.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Current phase.
    pub phase: Phase,
    /// Total bytes the job will process. Non-decreasing within a phase.
    pub total_bytes: u64,
    /// Bytes processed so far.
    pub completed_bytes: u64,
    /// Total number of files (known during open for some formats).
    pub total_files: u64,
    /// Files processed so far.
    pub completed_files: u64,
    /// Path of the file currently being written.
    pub current_path: Option<PathBuf>,
    /// Declared size of the current file.
    pub file_total: u64,
    /// Bytes of the current file written so far.
    pub file_completed: u64,
    /// Phase start time.
    pub start_time: Instant,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            phase: Phase::default(),
            total_bytes: 0,
            completed_bytes: 0,
            total_files: 0,
            completed_files: 0,
            current_path: None,
            file_total: 0,
            file_completed: 0,
            start_time: Instant::now(),
        }
    }
}

impl ProgressState {
    /// Creates a new progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-job completion in percent.
    pub fn percent(&self) -> u8 {
        percent(self.completed_bytes, self.total_bytes)
    }

    /// Current-file completion in percent.
    pub fn file_percent(&self) -> u8 {
        percent(self.file_completed, self.file_total)
    }

    /// Returns elapsed time since the phase started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the processing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.completed_bytes as f64 / elapsed
        }
    }

    /// Formats the rate as a human-readable string using IEC units.
    pub fn format_rate(&self) -> String {
        format_bytes_per_second_iec(self.bytes_per_second())
    }
}

/// Converts a counter pair to a percentage.
///
/// A total of zero renders as 0%. The result is rounded and clamped to `[0, 100]`,
/// so engines that overshoot their declared total never report more than 100%.
pub fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (completed as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

/// Rendering surface for job progress.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter {
    /// Called with a snapshot of the counters, at most once per render interval.
    fn on_update(&mut self, state: &ProgressState) {
        let _ = state;
    }

    /// Called when a modal prompt is about to be shown.
    fn on_suspend(&mut self) {}

    /// Called when the last suspend scope ends.
    fn on_resume(&mut self) {}

    /// Returns true to request cooperative cancellation of the job.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A progress reporter that records what it was shown.
#[derive(Debug, Default, Clone)]
pub struct StatisticsProgress {
    /// The last state rendered.
    pub last: Option<ProgressState>,
    /// Number of renders.
    pub updates: usize,
    /// Phases in the order they were first rendered.
    pub phases: Vec<Phase>,
    /// Number of suspend notifications.
    pub suspends: usize,
    /// Number of resume notifications.
    pub resumes: usize,
    /// Whether cancellation was requested.
    pub cancelled: bool,
}

impl StatisticsProgress {
    /// Creates a new statistics progress reporter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for StatisticsProgress {
    fn on_update(&mut self, state: &ProgressState) {
        if self.phases.last() != Some(&state.phase) {
            self.phases.push(state.phase);
        }
        self.updates += 1;
        self.last = Some(state.clone());
    }

    fn on_suspend(&mut self) {
        self.suspends += 1;
    }

    fn on_resume(&mut self) {
        self.resumes += 1;
    }

    fn should_cancel(&self) -> bool {
        self.cancelled
    }
}

/// Per-job progress owner.
///
/// The monitor is shared by reference between the job's callbacks, so all
/// methods take `&self`. Jobs are single-threaded; interior mutability is
/// confined to this value.
pub struct ProgressMonitor<'a> {
    reporter: RefCell<&'a mut dyn ProgressReporter>,
    state: RefCell<ProgressState>,
    suspended: Cell<u32>,
    min_interval: Duration,
    last_render: Cell<Option<Instant>>,
}

impl<'a> ProgressMonitor<'a> {
    /// Creates a monitor rendering to `reporter` with the default interval.
    pub fn new(reporter: &'a mut dyn ProgressReporter) -> Self {
        Self::with_interval(reporter, DEFAULT_RENDER_INTERVAL)
    }

    /// Creates a monitor with a custom minimum render interval.
    pub fn with_interval(reporter: &'a mut dyn ProgressReporter, min_interval: Duration) -> Self {
        Self {
            reporter: RefCell::new(reporter),
            state: RefCell::new(ProgressState::new()),
            suspended: Cell::new(0),
            min_interval,
            last_render: Cell::new(None),
        }
    }

    /// Resets all counters and switches to `phase`. Always renders.
    pub fn start_phase(&self, phase: Phase) {
        {
            let mut state = self.state.borrow_mut();
            *state = ProgressState::new();
            state.phase = phase;
        }
        self.render(true);
    }

    /// Sets the job byte total. The total never decreases within a phase.
    pub fn set_total(&self, total: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.total_bytes = state.total_bytes.max(total);
        }
        self.render(false);
    }

    /// Sets the job bytes completed so far.
    pub fn set_completed(&self, completed: u64) {
        self.state.borrow_mut().completed_bytes = completed;
        self.render(false);
    }

    /// Sets file counters reported while opening an archive.
    pub fn set_files(&self, completed: Option<u64>, total: Option<u64>) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(total) = total {
                state.total_files = state.total_files.max(total);
            }
            if let Some(completed) = completed {
                state.completed_files = completed;
            }
        }
        self.render(false);
    }

    /// Starts accounting for a new current file.
    pub fn start_file(&self, path: &Path, size: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.current_path = Some(path.to_path_buf());
            state.file_total = size;
            state.file_completed = 0;
        }
        self.render(false);
    }

    /// Adds `bytes` to the current file counter.
    pub fn add_file_bytes(&self, bytes: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.file_completed = state.file_completed.saturating_add(bytes);
        }
        self.render(false);
    }

    /// Marks the current file finished.
    pub fn finish_file(&self) {
        let mut state = self.state.borrow_mut();
        state.completed_files += 1;
        state.file_completed = state.file_total;
    }

    /// Returns a snapshot of the counters.
    pub fn state(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Fails with [`Error::Cancelled`] if the reporter requested cancellation.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.reporter.borrow().should_cancel() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Returns true while at least one suspend scope is active.
    pub fn is_suspended(&self) -> bool {
        self.suspended.get() > 0
    }

    /// Pauses rendering until the returned guard is dropped.
    ///
    /// Scopes nest; rendering resumes when the outermost guard goes away,
    /// including when the prompt inside it returned an abort.
    pub fn suspend(&self) -> SuspendGuard<'_, 'a> {
        let depth = self.suspended.get();
        self.suspended.set(depth + 1);
        if depth == 0 {
            self.reporter.borrow_mut().on_suspend();
        }
        SuspendGuard { monitor: self }
    }

    fn resume(&self) {
        let depth = self.suspended.get().saturating_sub(1);
        self.suspended.set(depth);
        if depth == 0 {
            self.reporter.borrow_mut().on_resume();
            self.render(true);
        }
    }

    fn render(&self, force: bool) {
        if self.is_suspended() {
            return;
        }
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_render.get() {
                if now.duration_since(last) < self.min_interval {
                    return;
                }
            }
        }
        self.last_render.set(Some(now));
        let state = self.state.borrow();
        self.reporter.borrow_mut().on_update(&state);
    }
}

/// Scope guard returned by [`ProgressMonitor::suspend`].
#[must_use = "rendering resumes as soon as the guard is dropped"]
pub struct SuspendGuard<'m, 'a> {
    monitor: &'m ProgressMonitor<'a>,
}

impl Drop for SuspendGuard<'_, '_> {
    fn drop(&mut self) {
        self.monitor.resume();
    }
}

/// Formats a rate in bytes per second using IEC units.
pub fn format_bytes_per_second_iec(rate: f64) -> String {
    if rate < BYTES_KB {
        format!("{:.0} B/s", rate)
    } else if rate < BYTES_MB {
        format!("{:.1} KiB/s", rate / BYTES_KB)
    } else if rate < BYTES_GB {
        format!("{:.1} MiB/s", rate / BYTES_MB)
    } else {
        format!("{:.1} GiB/s", rate / BYTES_GB)
    }
}

/// Formats bytes as a human-readable string using IEC units (KiB, MiB, GiB).
///
/// # Examples
///
/// ```rust
/// use arcx::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let bytes_f64 = bytes as f64;
    if bytes_f64 < BYTES_KB {
        format!("{} B", bytes)
    } else if bytes_f64 < BYTES_MB {
        format!("{:.1} KiB", bytes_f64 / BYTES_KB)
    } else if bytes_f64 < BYTES_GB {
        format!("{:.1} MiB", bytes_f64 / BYTES_MB)
    } else {
        format!("{:.1} GiB", bytes_f64 / BYTES_GB)
    }
}
