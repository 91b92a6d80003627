//! Opened archives.
//!
//! [`Archive::open`] detects every format chain the file can be read
//! through, lets the [`Prompter`] pick one when there are several, and
//! loads the chosen engine's items into a [`FileTree`]. The archive then
//! serves listings and extraction jobs until it is closed.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::codec::{InArchive, OpenCallback, SharedStream};
use crate::extract::{self, ExtractReport, ExtractRequest};
use crate::format::{Detected, FormatChain, FormatDetector, FormatRegistry};
use crate::fs;
use crate::password::Password;
use crate::progress::{Phase, ProgressMonitor, ProgressReporter};
use crate::prompt::Prompter;
use crate::tree::FileTree;
use crate::{Error, Result};

/// An archive file opened through one selected format chain.
pub struct Archive {
    path: PathBuf,
    host: SharedStream,
    chain: FormatChain,
    engine: Option<Box<dyn InArchive>>,
    tree: FileTree,
    registry: FormatRegistry,
    max_check_start: u64,
    password: Option<Password>,
}

impl Archive {
    /// Opens `path` with the built-in formats.
    ///
    /// Fails with [`Error::NotAnArchive`] if no format matches and with
    /// [`Error::Cancelled`] if the prompter declines to pick among several.
    pub fn open(
        path: impl AsRef<Path>,
        prompter: &mut dyn Prompter,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Self> {
        Self::open_with(path, &FormatDetector::new(FormatRegistry::builtin()), prompter, reporter)
    }

    /// Opens `path` with a custom detector.
    pub fn open_with(
        path: impl AsRef<Path>,
        detector: &FormatDetector<'_>,
        prompter: &mut dyn Prompter,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let host = open_host(&path)?;
        let monitor = ProgressMonitor::new(reporter);
        monitor.start_phase(Phase::Opening);

        let mut password = None;
        let mut found = {
            let mut opener = Opener::new(&monitor, &mut *prompter, &path, &mut password);
            detector.detect(&host, &mut opener)?
        };
        let selected = match found.len() {
            0 => return Err(Error::NotAnArchive),
            1 => 0,
            n => {
                let names: Vec<String> = found.iter().map(|d| d.chain.to_string()).collect();
                let choice = {
                    let _paused = monitor.suspend();
                    prompter.select_format(&names)
                };
                match choice {
                    Some(index) if index < n => index,
                    _ => {
                        close_all(found);
                        return Err(Error::Cancelled);
                    }
                }
            }
        };
        let Detected { archive: mut engine, chain } = found.swap_remove(selected);
        close_all(found);
        log::debug!("opened {} as {}", path.display(), chain);

        let tree = match load_tree(engine.as_ref()) {
            Ok(tree) => tree,
            Err(e) => {
                engine.close();
                return Err(e);
            }
        };
        Ok(Self {
            path,
            host,
            chain,
            engine: Some(engine),
            tree,
            registry: detector.registry().clone(),
            max_check_start: detector.probe_budget(),
            password,
        })
    }

    /// Returns every format chain `path` can be opened through, closing
    /// what detection opened.
    pub fn probe(
        path: impl AsRef<Path>,
        detector: &FormatDetector<'_>,
        prompter: &mut dyn Prompter,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Vec<FormatChain>> {
        let path = path.as_ref();
        let host = open_host(path)?;
        let monitor = ProgressMonitor::new(reporter);
        monitor.start_phase(Phase::Opening);
        let mut password = None;
        let found = {
            let mut opener = Opener::new(&monitor, prompter, path, &mut password);
            detector.detect(&host, &mut opener)?
        };
        let chains = found.iter().map(|d| d.chain.clone()).collect();
        close_all(found);
        Ok(chains)
    }

    /// Closes the archive and opens it again through the same chain.
    ///
    /// No format selection is asked for. Fails with
    /// [`Error::ChainBroken`] if the file no longer opens that way.
    pub fn reopen(&mut self, prompter: &mut dyn Prompter, reporter: &mut dyn ProgressReporter) -> Result<()> {
        self.close();
        let host = open_host(&self.path)?;
        let monitor = ProgressMonitor::new(reporter);
        monitor.start_phase(Phase::Opening);
        let detector = FormatDetector::new(&self.registry).max_check_start(self.max_check_start);
        let mut engine = {
            let mut opener = Opener::new(&monitor, prompter, &self.path, &mut self.password);
            detector.open_chain(&host, &self.chain, &mut opener)?
        };
        self.tree = match load_tree(engine.as_ref()) {
            Ok(tree) => tree,
            Err(e) => {
                engine.close();
                return Err(e);
            }
        };
        self.host = host;
        self.engine = Some(engine);
        log::debug!("reopened {} as {}", self.path.display(), self.chain);
        Ok(())
    }

    /// Releases the engine and clears the tree. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
        self.tree.clear();
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The chain the archive was opened through.
    pub fn chain(&self) -> &FormatChain {
        &self.chain
    }

    /// Entries of the innermost format. Empty once closed.
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Runs an extraction job.
    ///
    /// Only setup problems (a closed archive, an index outside the tree)
    /// return `Err`; everything that happens during the job is described
    /// by the report.
    pub fn extract(
        &mut self,
        request: &ExtractRequest,
        prompter: &mut dyn Prompter,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<ExtractReport> {
        let engine = self.engine.as_deref_mut().ok_or(Error::ArchiveClosed)?;
        extract::run(
            engine,
            &self.tree,
            self.host.faults(),
            request,
            &mut self.password,
            prompter,
            reporter,
        )
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("chain", &self.chain.to_string())
            .field("entries", &self.tree.len())
            .field("open", &self.is_open())
            .finish()
    }
}

fn open_host(path: &Path) -> Result<SharedStream> {
    let file = File::open(fs::long_path(path))?;
    Ok(SharedStream::new(Box::new(BufReader::new(file))))
}

fn load_tree(engine: &dyn InArchive) -> Result<FileTree> {
    let items = (0..engine.item_count())
        .map(|index| engine.item(index))
        .collect::<Result<Vec<_>>>()?;
    Ok(FileTree::from_items(items))
}

fn close_all(found: Vec<Detected>) {
    for mut detected in found {
        detected.archive.close();
    }
}

/// Open callback backed by the host file's directory and the prompter.
struct Opener<'o, 'a> {
    monitor: &'o ProgressMonitor<'a>,
    prompter: &'o mut dyn Prompter,
    dir: PathBuf,
    name: Option<String>,
    password: &'o mut Option<Password>,
}

impl<'o, 'a> Opener<'o, 'a> {
    fn new(
        monitor: &'o ProgressMonitor<'a>,
        prompter: &'o mut dyn Prompter,
        path: &Path,
        password: &'o mut Option<Password>,
    ) -> Self {
        Self {
            monitor,
            prompter,
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name: path.file_name().map(|name| name.to_string_lossy().into_owned()),
            password,
        }
    }
}

impl OpenCallback for Opener<'_, '_> {
    fn set_total(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()> {
        self.monitor.set_files(None, files);
        if let Some(bytes) = bytes {
            self.monitor.set_total(bytes);
        }
        self.monitor.check_cancelled()
    }

    fn set_completed(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()> {
        self.monitor.set_files(files, None);
        if let Some(bytes) = bytes {
            self.monitor.set_completed(bytes);
        }
        self.monitor.check_cancelled()
    }

    fn volume_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn open_volume(&mut self, name: &str) -> Result<Option<SharedStream>> {
        let path = self.dir.join(name);
        match fs::existing(&path)? {
            Some(metadata) if !metadata.is_dir() => {
                log::debug!("opening volume {}", path.display());
                Ok(Some(open_host(&path)?))
            }
            _ => Ok(None),
        }
    }

    fn password(&mut self) -> Result<Password> {
        if let Some(password) = self.password.as_ref() {
            return Ok(password.clone());
        }
        let answer = {
            let _paused = self.monitor.suspend();
            self.prompter.password()
        };
        let password = answer.ok_or(Error::Cancelled)?;
        *self.password = Some(password.clone());
        Ok(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::AutoPrompter;
    use crate::progress::NoProgress;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_opener_volumes() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("data.001");
        std::fs::write(&first, b"abc").unwrap();
        std::fs::write(temp.path().join("data.002"), b"def").unwrap();
        std::fs::create_dir(temp.path().join("data.003")).unwrap();

        let mut reporter = NoProgress;
        let monitor = ProgressMonitor::new(&mut reporter);
        let mut prompter = AutoPrompter::new();
        let mut password = None;
        let mut opener = Opener::new(&monitor, &mut prompter, &first, &mut password);

        assert_eq!(opener.volume_name(), Some("data.001"));
        assert!(opener.open_volume("data.002").unwrap().is_some());
        assert!(opener.open_volume("data.003").unwrap().is_none(), "directories are not volumes");
        assert!(opener.open_volume("data.004").unwrap().is_none());
    }

    #[test]
    fn test_opener_password_is_cached() {
        let mut reporter = NoProgress;
        let monitor = ProgressMonitor::new(&mut reporter);
        let mut prompter = AutoPrompter::new().with_password("secret");
        let mut password = None;
        {
            let mut opener = Opener::new(&monitor, &mut prompter, Path::new("a.zip"), &mut password);
            assert_eq!(opener.password().unwrap().as_str(), "secret");
        }
        assert_eq!(password.as_ref().map(Password::as_str), Some("secret"));

        let mut declining = AutoPrompter::new();
        let mut empty = None;
        let mut opener = Opener::new(&monitor, &mut declining, Path::new("a.zip"), &mut empty);
        assert!(opener.password().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_plain_file_is_not_an_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"nothing to see here").unwrap();

        let err = Archive::open(&path, &mut AutoPrompter::new(), &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::NotAnArchive));
    }
}
