//! Shared test utilities for integration tests.
//!
//! This module provides a scripted prompter, a recording progress reporter,
//! an in-memory codec whose behavior each test configures, and builders for
//! real tar, gzip, and zip archives.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arcx::codec::{
    ArchiveItem, AskMode, Codec, ExtractCallbacks, InArchive, OpenCallback, OperationResult, SharedStream,
    transfer,
};
use arcx::progress::{Phase, ProgressReporter, ProgressState};
use arcx::{
    Archive, ArchiveFormat, Error, ErrorAction, ExistingFile, FileEntry, FormatDetector, FormatId, FormatRegistry,
    OverwriteAction, Password, Prompter, Result, Timestamp,
};

// =============================================================================
// Prompter
// =============================================================================

/// One failure prompt as the job showed it.
#[derive(Debug, Clone)]
pub struct ErrorPrompt {
    pub path: PathBuf,
    pub error: String,
    pub allow_retry: bool,
}

/// A prompter that answers from queues and records every question.
///
/// Empty queues answer Abort, Skip, no password, and no format.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    pub errors: VecDeque<ErrorAction>,
    pub overwrites: VecDeque<OverwriteAction>,
    pub passwords: VecDeque<Option<Password>>,
    pub format: Option<usize>,

    pub error_prompts: Vec<ErrorPrompt>,
    pub overwrite_prompts: Vec<(PathBuf, u64, u64)>,
    pub password_prompts: usize,
    pub format_prompts: Vec<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, actions: impl IntoIterator<Item = ErrorAction>) -> Self {
        self.errors.extend(actions);
        self
    }

    pub fn on_overwrite(mut self, actions: impl IntoIterator<Item = OverwriteAction>) -> Self {
        self.overwrites.extend(actions);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.passwords.push_back(Some(Password::new(password)));
        self
    }

    pub fn declining_password(mut self) -> Self {
        self.passwords.push_back(None);
        self
    }

    pub fn choose_format(mut self, index: usize) -> Self {
        self.format = Some(index);
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn error_action(&mut self, path: &Path, error: &Error, allow_retry: bool) -> ErrorAction {
        self.error_prompts.push(ErrorPrompt {
            path: path.to_path_buf(),
            error: error.to_string(),
            allow_retry,
        });
        self.errors.pop_front().unwrap_or(ErrorAction::Abort)
    }

    fn overwrite(&mut self, path: &Path, incoming: &FileEntry, existing: &ExistingFile) -> OverwriteAction {
        self.overwrite_prompts
            .push((path.to_path_buf(), incoming.size, existing.size));
        self.overwrites.pop_front().unwrap_or(OverwriteAction::Skip)
    }

    fn password(&mut self) -> Option<Password> {
        self.password_prompts += 1;
        self.passwords.pop_front().flatten()
    }

    fn select_format(&mut self, chains: &[String]) -> Option<usize> {
        self.format_prompts.push(chains.to_vec());
        self.format
    }
}

// =============================================================================
// Progress
// =============================================================================

/// A reporter that records what it was shown and can request cancellation
/// once a given phase starts.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub phases: Vec<Phase>,
    pub updates: usize,
    pub suspends: usize,
    pub resumes: usize,
    pub suspended: bool,
    pub rendered_while_suspended: usize,
    pub max_percent: u8,
    pub last: Option<ProgressState>,
    pub cancel_in: Option<Phase>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_in(phase: Phase) -> Self {
        Self {
            cancel_in: Some(phase),
            ..Self::default()
        }
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_update(&mut self, state: &ProgressState) {
        if self.suspended {
            self.rendered_while_suspended += 1;
        }
        if self.phases.last() != Some(&state.phase) {
            self.phases.push(state.phase);
        }
        self.updates += 1;
        self.max_percent = self.max_percent.max(state.percent());
        self.last = Some(state.clone());
    }

    fn on_suspend(&mut self) {
        self.suspends += 1;
        self.suspended = true;
    }

    fn on_resume(&mut self) {
        self.resumes += 1;
        self.suspended = false;
    }

    fn should_cancel(&self) -> bool {
        self.cancel_in.is_some_and(|phase| self.phases.contains(&phase))
    }
}

// =============================================================================
// In-memory codec
// =============================================================================

/// One entry of a [`MemCodec`] archive.
#[derive(Debug, Clone)]
pub struct MemEntry {
    pub item: ArchiveItem,
    pub data: Vec<u8>,
    pub result: OperationResult,
}

impl MemEntry {
    pub fn file(path: &str, data: &[u8]) -> Self {
        Self {
            item: ArchiveItem {
                path: path.to_string(),
                size: data.len() as u64,
                ..ArchiveItem::default()
            },
            data: data.to_vec(),
            result: OperationResult::Ok,
        }
    }

    pub fn dir(path: &str) -> Self {
        Self {
            item: ArchiveItem {
                path: path.to_string(),
                is_dir: true,
                ..ArchiveItem::default()
            },
            data: Vec::new(),
            result: OperationResult::Ok,
        }
    }

    /// Reports `result` after writing the data.
    pub fn result(mut self, result: OperationResult) -> Self {
        self.result = result;
        self
    }

    /// Overrides the declared size.
    pub fn declared_size(mut self, size: u64) -> Self {
        self.item.size = size;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.item.encrypted = true;
        self
    }

    pub fn attributes(mut self, bits: u32) -> Self {
        self.item.attributes = Some(bits);
        self
    }

    pub fn modified(mut self, secs: i64) -> Self {
        self.item.modification_time = Timestamp::from_unix_secs(secs);
        self
    }

    pub fn accessed(mut self, secs: i64) -> Self {
        self.item.access_time = Timestamp::from_unix_secs(secs);
        self
    }
}

/// A configurable fake format: it matches streams starting with its magic
/// and serves the entries it was built with.
#[derive(Debug, Clone, Default)]
pub struct MemCodec {
    magic: Vec<u8>,
    entries: Vec<MemEntry>,
    nested: bool,
    broken: bool,
    open_password: Option<String>,
    entry_password: Option<String>,
    fail_at: Option<u32>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MemCodec {
    pub fn new(magic: &[u8]) -> Self {
        Self {
            magic: magic.to_vec(),
            ..Self::default()
        }
    }

    pub fn entry(mut self, entry: MemEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = MemEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Exposes item 0 as the embedded stream for nested detection.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Matches the magic but then fails to open.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Asks for a password while opening.
    pub fn open_password(mut self, password: &str) -> Self {
        self.open_password = Some(password.to_string());
        self
    }

    /// Password encrypted entries decode with.
    pub fn entry_password(mut self, password: &str) -> Self {
        self.entry_password = Some(password.to_string());
        self
    }

    /// Fails the whole batch when extraction reaches `index`.
    pub fn fail_at(mut self, index: u32) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Codec for MemCodec {
    fn open(
        &self,
        stream: SharedStream,
        _max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>> {
        let prefix = stream.peek_prefix(self.magic.len() as u64)?;
        if prefix != self.magic {
            return Ok(None);
        }
        if self.broken {
            return Err(Error::InvalidFormat("truncated header".into()));
        }
        if let Some(expected) = &self.open_password {
            let password = callback.password()?;
            if password.as_str() != expected {
                return Err(Error::InvalidFormat("wrong password".into()));
            }
        }
        callback.set_total(Some(self.entries.len() as u64), None)?;
        callback.set_completed(Some(self.entries.len() as u64), None)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(MemArchive { codec: self.clone() })))
    }
}

struct MemArchive {
    codec: MemCodec,
}

impl MemArchive {
    fn entry(&self, index: u32) -> Result<&MemEntry> {
        self.codec
            .entries
            .get(index as usize)
            .ok_or(Error::InvalidIndex { index })
    }
}

impl InArchive for MemArchive {
    fn item_count(&self) -> u32 {
        self.codec.entries.len() as u32
    }

    fn item(&self, index: u32) -> Result<ArchiveItem> {
        Ok(self.entry(index)?.item.clone())
    }

    fn main_subfile(&self) -> Option<u32> {
        self.codec.nested.then_some(0)
    }

    fn open_item(&mut self, index: u32) -> Result<Option<SharedStream>> {
        Ok(Some(SharedStream::from_bytes(self.entry(index)?.data.clone())))
    }

    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()> {
        let total = indices
            .iter()
            .filter_map(|&i| self.codec.entries.get(i as usize))
            .fold(0u64, |sum, e| sum.saturating_add(e.data.len() as u64));
        callbacks.progress.set_total(total)?;

        let mut completed = 0;
        for &index in indices {
            if self.codec.fail_at == Some(index) {
                return Err(Error::InvalidFormat("engine failure".into()));
            }
            let entry = self.entry(index)?.clone();
            let result = {
                let mut out = callbacks.streams.get_stream(index, mode)?;
                if out.is_none() {
                    OperationResult::Ok
                } else if entry.item.encrypted
                    && callbacks.password.password()?.as_str() != self.codec.entry_password.as_deref().unwrap_or("")
                {
                    OperationResult::DataError
                } else {
                    let mut data = Cursor::new(entry.data.as_slice());
                    match transfer(&mut data, out.as_deref_mut(), callbacks.progress, &mut completed)? {
                        Ok(_) => entry.result,
                        Err(e) => OperationResult::from_read_error(&e),
                    }
                }
            };
            callbacks.streams.set_operation_result(result)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.codec.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a registry from named codecs, in order.
pub fn registry(codecs: &[(&str, &MemCodec)]) -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    for (i, (name, codec)) in codecs.iter().enumerate() {
        registry.register(ArchiveFormat::new(
            FormatId(1000 + i as u32),
            *name,
            Arc::new((*codec).clone()),
        ));
    }
    registry
}

/// Writes `bytes` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write fixture");
    path
}

/// Opens `path` with a registry built from `codecs`.
pub fn open_mem(
    path: &Path,
    codecs: &[(&str, &MemCodec)],
    prompter: &mut dyn Prompter,
) -> Result<Archive> {
    let registry = registry(codecs);
    Archive::open_with(path, &FormatDetector::new(&registry), prompter, &mut RecordingProgress::new())
}

/// The three-entry archive: `dir/`, `dir/a.txt` (10 bytes), `b.txt` (empty).
pub fn three_entries() -> Vec<MemEntry> {
    vec![
        MemEntry::dir("dir"),
        MemEntry::file("dir/a.txt", b"0123456789"),
        MemEntry::file("b.txt", b""),
    ]
}

// =============================================================================
// Real archive builders
// =============================================================================

/// Builds a ustar archive. Paths ending in `/` become directories.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_ustar();
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
        } else {
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
        }
        header.set_mtime(1_500_000_000);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *data)
            .expect("Failed to add tar entry");
    }
    builder.into_inner().expect("Failed to finish tar")
}

/// Builds a tar whose header names are stored exactly as given, the way
/// `tar -C dir -cf x.tar .` writes `./` and `./a.txt`.
pub fn tar_bytes_verbatim(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        let name = &mut header.as_old_mut().name;
        name[..path.len()].copy_from_slice(path.as_bytes());
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
        }
        header.set_mtime(1_400_000_000);
        header.set_cksum();
        builder.append(&header, *data).expect("Failed to add tar entry");
    }
    builder.into_inner().expect("Failed to finish tar")
}

/// Gzip-compresses `data`, storing `name` in the header when given.
pub fn gzip_bytes(data: &[u8], name: Option<&str>) -> Vec<u8> {
    let mut builder = flate2::GzBuilder::new().mtime(1_600_000_000);
    if let Some(name) = name {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("Failed to compress");
    encoder.finish().expect("Failed to finish gzip")
}

/// Builds a zip archive; entries are AES-encrypted when `password` is set.
pub fn zip_bytes(entries: &[(&str, &[u8])], password: Option<&str>) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let plain = SimpleFileOptions::default().unix_permissions(0o644);
    let dir = SimpleFileOptions::default().unix_permissions(0o755);
    for (path, data) in entries {
        if path.ends_with('/') {
            writer.add_directory(*path, dir).expect("Failed to add directory");
            continue;
        }
        let options = match password {
            Some(password) => plain.with_aes_encryption(zip::AesMode::Aes256, password),
            None => plain,
        };
        writer.start_file(*path, options).expect("Failed to start entry");
        writer.write_all(data).expect("Failed to write entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}

/// Reads a file as a string, panicking with the path on failure.
pub fn read(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

/// Captures every path under `root` with its contents (`None` for directories).
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.expect("Failed to walk destination");
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let contents = entry
                .file_type()
                .is_file()
                .then(|| std::fs::read(entry.path()).expect("Failed to read file"));
            (relative, contents)
        })
        .collect()
}
