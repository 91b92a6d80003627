//! Terminal prompts for jobs.

use std::path::Path;

use arcx::{Error, ErrorAction, ExistingFile, FileEntry, OverwriteAction, Password, Prompter};
use dialoguer::{Select, theme::ColorfulTheme};

use crate::output::humanize_bytes;
use crate::password::read_password;

/// Asks the user through `dialoguer`, or answers on their behalf with `--yes`.
pub struct TerminalPrompter {
    assume_yes: bool,
    password: Option<Password>,
    format: Option<usize>,
}

impl TerminalPrompter {
    /// Creates a prompter. `password` is handed out before asking;
    /// `format` answers the format selection.
    pub fn new(assume_yes: bool, password: Option<Password>, format: Option<usize>) -> Self {
        Self {
            assume_yes,
            password,
            format,
        }
    }
}

fn select(prompt: String, items: &[&str], default: usize) -> Option<usize> {
    match Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact_opt()
    {
        Ok(choice) => choice,
        Err(e) => {
            log::debug!("prompt failed: {}", e);
            None
        }
    }
}

impl Prompter for TerminalPrompter {
    fn error_action(&mut self, path: &Path, error: &Error, allow_retry: bool) -> ErrorAction {
        if self.assume_yes {
            return ErrorAction::Ignore;
        }
        let mut actions = Vec::with_capacity(4);
        if allow_retry {
            actions.push(("Retry", ErrorAction::Retry));
        }
        actions.push(("Ignore", ErrorAction::Ignore));
        actions.push(("Ignore all", ErrorAction::IgnoreAll));
        actions.push(("Abort", ErrorAction::Abort));
        let labels: Vec<&str> = actions.iter().map(|(label, _)| *label).collect();
        let prompt = format!("{}: {}", path.display(), error);
        select(prompt, &labels, 0)
            .and_then(|choice| actions.get(choice))
            .map_or(ErrorAction::Abort, |(_, action)| *action)
    }

    fn overwrite(&mut self, path: &Path, incoming: &FileEntry, existing: &ExistingFile) -> OverwriteAction {
        if self.assume_yes {
            return OverwriteAction::Overwrite;
        }
        let prompt = format!(
            "File exists: {} ({} on disk, {} in archive)",
            path.display(),
            humanize_bytes(existing.size),
            humanize_bytes(incoming.size)
        );
        let items = &[
            "Yes - overwrite this file",
            "No - skip this file",
            "Yes to all - overwrite all existing files",
            "No to all - skip all existing files",
            "Cancel extraction",
        ];
        match select(prompt, items, 1) {
            Some(0) => OverwriteAction::Overwrite,
            Some(1) => OverwriteAction::Skip,
            Some(2) => OverwriteAction::OverwriteAll,
            Some(3) => OverwriteAction::SkipAll,
            _ => OverwriteAction::Cancel,
        }
    }

    fn password(&mut self) -> Option<Password> {
        if let Some(password) = self.password.take() {
            return Some(password);
        }
        if self.assume_yes {
            return None;
        }
        read_password()
    }

    fn select_format(&mut self, chains: &[String]) -> Option<usize> {
        if let Some(index) = self.format {
            return (index < chains.len()).then_some(index);
        }
        if self.assume_yes {
            // The most deeply nested reading is the most useful one.
            return chains
                .iter()
                .enumerate()
                .max_by_key(|(i, chain)| (chain.matches("->").count(), usize::MAX - i))
                .map(|(i, _)| i);
        }
        let items: Vec<&str> = chains.iter().map(String::as_str).collect();
        select("Several formats match; open as".to_string(), &items, 0)
    }
}
