//! Tar archives via the `tar` crate.
//!
//! Headers are read once at open time with `entries_with_seek`, recording
//! each payload's raw offset; extraction then seeks straight to the data.
//! Regular files and directories are listed; links and device nodes are
//! left out. GNU sparse files are listed but report an unsupported method.

use std::io::{Read, Seek, SeekFrom};

use crate::codec::{
    ArchiveItem, AskMode, Codec, ExtractCallbacks, InArchive, OpenCallback, OperationResult, SharedStream, transfer,
};
use crate::fs::FileAttributes;
use crate::{Error, Result};

const BLOCK_SIZE: usize = 512;

/// Codec for POSIX/GNU tar.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarCodec;

struct TarItem {
    item: ArchiveItem,
    offset: u64,
    sparse: bool,
}

impl Codec for TarCodec {
    fn open(
        &self,
        stream: SharedStream,
        _max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>> {
        let head = stream.peek_prefix(BLOCK_SIZE as u64)?;
        if !is_tar_header(&head) {
            return Ok(None);
        }

        let mut archive = tar::Archive::new(stream.rewound());
        let mut items = Vec::new();
        for entry in archive.entries_with_seek()? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if items.is_empty() => return Err(Error::InvalidFormat(e.to_string())),
                Err(e) => {
                    log::warn!("tar: stopping after {} entries: {}", items.len(), e);
                    break;
                }
            };
            let header = entry.header();
            let kind = header.entry_type();
            let sparse = kind.is_gnu_sparse();
            if !(kind.is_file() || kind.is_contiguous() || kind.is_dir() || sparse) {
                log::debug!("tar: skipping {:?} entry", kind);
                continue;
            }
            let is_dir = kind.is_dir();
            let path = entry
                .path()
                .map_err(|e| Error::InvalidFormat(e.to_string()))?
                .to_string_lossy()
                .into_owned();
            let item = ArchiveItem {
                path,
                is_dir,
                size: if is_dir { 0 } else { entry.size() },
                attributes: header
                    .mode()
                    .ok()
                    .map(|mode| FileAttributes::from_unix_mode(mode, is_dir).bits()),
                modification_time: header.mtime().ok().and_then(super::unix_time),
                ..ArchiveItem::default()
            };
            items.push(TarItem {
                item,
                offset: entry.raw_file_position(),
                sparse,
            });
            callback.set_completed(Some(items.len() as u64), Some(entry.raw_file_position()))?;
        }
        callback.set_total(Some(items.len() as u64), None)?;

        Ok(Some(Box::new(TarArchive { stream, items })))
    }
}

/// Checks the `ustar` magic or, for pre-POSIX archives, the header checksum.
fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < BLOCK_SIZE || block.iter().all(|&b| b == 0) {
        return false;
    }
    if &block[257..262] == b"ustar" {
        return true;
    }
    let stored = std::str::from_utf8(&block[148..156])
        .ok()
        .map(|text| text.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|text| u32::from_str_radix(text, 8).ok());
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();
    stored == Some(computed)
}

struct TarArchive {
    stream: SharedStream,
    items: Vec<TarItem>,
}

impl TarArchive {
    fn entry(&self, index: u32) -> Result<&TarItem> {
        self.items.get(index as usize).ok_or(Error::InvalidIndex { index })
    }
}

impl InArchive for TarArchive {
    fn item_count(&self) -> u32 {
        self.items.len() as u32
    }

    fn item(&self, index: u32) -> Result<ArchiveItem> {
        Ok(self.entry(index)?.item.clone())
    }

    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()> {
        let total = indices
            .iter()
            .filter_map(|&i| self.items.get(i as usize))
            .map(|e| e.item.size)
            .sum();
        callbacks.progress.set_total(total)?;

        let mut completed = 0;
        for &index in indices {
            let (offset, size, is_dir, sparse) = {
                let entry = self.entry(index)?;
                (entry.offset, entry.item.size, entry.item.is_dir, entry.sparse)
            };
            let result = {
                let mut out = callbacks.streams.get_stream(index, mode)?;
                if is_dir || (out.is_none() && mode != AskMode::Test) {
                    OperationResult::Ok
                } else if sparse {
                    OperationResult::UnsupportedMethod
                } else {
                    let mut data = self.stream.rewound();
                    data.seek(SeekFrom::Start(offset))?;
                    let mut payload = data.take(size);
                    match transfer(&mut payload, out.as_deref_mut(), callbacks.progress, &mut completed)? {
                        Ok(n) if n == size => OperationResult::Ok,
                        Ok(_) => OperationResult::DataError,
                        Err(e) => OperationResult::from_read_error(&e),
                    }
                }
            };
            callbacks.streams.set_operation_result(result)?;
        }
        Ok(())
    }
}
