//! Command implementations for the CLI tool.

use std::path::{Path, PathBuf};

use arcx::{Archive, ExtractReport, ExtractRequest, FormatDetector, FormatRegistry, OverwritePolicy, Password};

use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::file_selector::FileSelector;
use crate::output::{create_formatter, error_summary};
use crate::progress::{CliProgress, interrupted};
use crate::prompt::TerminalPrompter;
use crate::{GlobalArgs, OverwriteMode};

/// Configuration for the extract command.
pub struct ExtractConfig<'a> {
    pub archive_path: &'a Path,
    pub output_dir: PathBuf,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub overwrite: OverwriteMode,
    pub ignore_errors: bool,
    pub password: Option<String>,
    pub format: Option<usize>,
}

/// Detect command implementation
pub fn detect(archive_path: &Path, password: Option<String>, global: &GlobalArgs) -> ExitCode {
    let formatter = create_formatter(global.json);
    let mut prompter = TerminalPrompter::new(global.yes, password.map(Password::new), None);
    let mut progress = CliProgress::new(global.quiet || global.json);
    let detector = FormatDetector::new(FormatRegistry::builtin());

    let chains = match Archive::probe(archive_path, &detector, &mut prompter, &mut progress) {
        Ok(chains) => chains,
        Err(e) => {
            progress.finish();
            return report_error(archive_path, &e);
        }
    };
    progress.finish();

    print!("{}", formatter.format_chains(&chains));
    if chains.is_empty() {
        if !global.json {
            eprintln!("{}: not an archive", archive_path.display());
        }
        return ExitCode::NotAnArchive;
    }
    ExitCode::Success
}

/// List command implementation
pub fn list(archive_path: &Path, password: Option<String>, format: Option<usize>, global: &GlobalArgs) -> ExitCode {
    let formatter = create_formatter(global.json);
    let mut prompter = TerminalPrompter::new(global.yes, password.map(Password::new), format);

    let archive = match open_archive(archive_path, &mut prompter, global) {
        Ok(a) => a,
        Err(code) => return code,
    };

    print!("{}", formatter.format_list(&archive));
    ExitCode::Success
}

/// Extract command implementation
pub fn extract(config: ExtractConfig<'_>, global: &GlobalArgs) -> ExitCode {
    let formatter = create_formatter(global.json);

    let selector = match FileSelector::new(config.include, config.exclude) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::BadArgs;
        }
    };

    let password = config.password.map(Password::new);
    let mut prompter = TerminalPrompter::new(global.yes, password.clone(), config.format);
    let mut archive = match open_archive(config.archive_path, &mut prompter, global) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let overwrite = match config.overwrite {
        OverwriteMode::Always => OverwritePolicy::OverwriteAll,
        OverwriteMode::Never => OverwritePolicy::SkipAll,
        OverwriteMode::Ask => OverwritePolicy::AskEachTime,
    };
    let mut request = ExtractRequest::new(config.output_dir)
        .overwrite(overwrite)
        .ignore_errors(config.ignore_errors);
    if let Some(roots) = selector.roots(archive.tree()) {
        if roots.is_empty() {
            eprintln!("Error: no entries match the given patterns");
            return ExitCode::BadArgs;
        }
        request = request.roots(roots);
    }
    if let Some(password) = password {
        request = request.password(password);
    }

    let mut progress = CliProgress::new(global.quiet || global.json);
    let report = match archive.extract(&request, &mut prompter, &mut progress) {
        Ok(report) => report,
        Err(e) => {
            progress.finish();
            return report_error(config.archive_path, &e);
        }
    };
    progress.finish();

    if !global.quiet || global.json {
        print!("{}", formatter.format_report(&report));
    } else {
        eprint!("{}", error_summary(&report));
    }
    report_exit_code(&report)
}

/// Exit code for a finished job.
fn report_exit_code(report: &ExtractReport) -> ExitCode {
    if report.is_cancelled() {
        ExitCode::UserInterrupt
    } else if let Some(failure) = &report.failure {
        error_to_exit_code(failure)
    } else if !report.errors.is_empty() {
        ExitCode::Warning
    } else {
        ExitCode::Success
    }
}

/// Helper to open an archive, prompting for format and password as needed
fn open_archive(path: &Path, prompter: &mut TerminalPrompter, global: &GlobalArgs) -> Result<Archive, ExitCode> {
    let mut progress = CliProgress::new(global.quiet || global.json);
    let opened = Archive::open(path, prompter, &mut progress);
    progress.finish();
    opened.map_err(|e| report_error(path, &e))
}

fn report_error(path: &Path, error: &arcx::Error) -> ExitCode {
    if error.is_cancelled() {
        if interrupted() {
            eprintln!("Interrupted");
        } else {
            eprintln!("Cancelled");
        }
    } else {
        eprintln!("Error: {}: {}", path.display(), error);
    }
    error_to_exit_code(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcx::{Error, ErrorLog, JobState};

    fn report(state: JobState, failure: Option<Error>, ignored: usize) -> ExtractReport {
        let mut errors = ErrorLog::new();
        for i in 0..ignored {
            errors.push(format!("f{i}"), "failed");
        }
        ExtractReport {
            state,
            files_extracted: 0,
            files_skipped: 0,
            bytes_written: 0,
            errors,
            failure,
        }
    }

    #[test]
    fn test_report_exit_codes() {
        assert_eq!(report_exit_code(&report(JobState::Done, None, 0)), ExitCode::Success);
        assert_eq!(report_exit_code(&report(JobState::Done, None, 2)), ExitCode::Warning);
        assert_eq!(report_exit_code(&report(JobState::Aborted, None, 0)), ExitCode::UserInterrupt);
        assert_eq!(
            report_exit_code(&report(JobState::Aborted, Some(Error::InvalidFormat("bad".into())), 1)),
            ExitCode::FatalError
        );
    }
}
