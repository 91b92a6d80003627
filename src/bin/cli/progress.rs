//! Progress bar implementation for CLI operations.

use std::sync::atomic::{AtomicBool, Ordering};

use arcx::progress::{Phase, ProgressReporter, ProgressState};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Set by the Ctrl+C handler; polled by the running job.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Returns true once Ctrl+C was pressed.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Installs the Ctrl+C handler. The first press asks the job to stop at
/// the next callback; a second press exits immediately.
pub fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(crate::exit_codes::USER_INTERRUPT);
        }
        eprintln!("\nInterrupted, stopping...");
    });
    if let Err(e) = installed {
        log::debug!("cannot install Ctrl+C handler: {}", e);
    }
}

/// Single-bar progress display driven by the job's progress monitor.
pub struct CliProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {prefix:>20} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        };
        Self { bar, quiet }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn on_update(&mut self, state: &ProgressState) {
        if self.quiet {
            return;
        }
        self.bar.set_prefix(state.phase.to_string());
        self.bar.set_length(state.total_bytes);
        self.bar.set_position(state.completed_bytes);
        self.bar.set_message(message(state));
    }

    fn on_suspend(&mut self) {
        if !self.quiet {
            self.bar.set_draw_target(ProgressDrawTarget::hidden());
        }
    }

    fn on_resume(&mut self) {
        if !self.quiet {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
    }

    fn should_cancel(&self) -> bool {
        interrupted()
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Text shown after the bar: item counts while opening, the transfer rate
/// and current file while extracting.
fn message(state: &ProgressState) -> String {
    match (&state.current_path, state.phase) {
        (_, Phase::Opening) if state.total_files > 0 => {
            format!("{}/{} items", state.completed_files, state.total_files)
        }
        (Some(path), Phase::Extracting) => {
            format!("{} {}", state.format_rate(), truncate(&path.display().to_string(), 40))
        }
        (Some(path), _) => truncate(&path.display().to_string(), 40),
        (None, _) => String::new(),
    }
}

// Truncate long names
fn truncate(name: &str, max: usize) -> String {
    let count = name.chars().count();
    if count <= max {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shows_rate_while_extracting() {
        let mut state = ProgressState::new();
        state.phase = Phase::Extracting;
        state.current_path = Some("out/a.txt".into());
        let text = message(&state);
        assert!(text.ends_with("out/a.txt"));
        assert!(text.contains("/s "));

        state.phase = Phase::RestoringAttributes;
        assert_eq!(message(&state), "out/a.txt");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.txt", 40), "short.txt");
        let long = "a/".repeat(30) + "file.txt";
        let shown = truncate(&long, 20);
        assert_eq!(shown.chars().count(), 20);
        assert!(shown.starts_with("...") && shown.ends_with("file.txt"));
    }
}
