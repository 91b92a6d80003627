//! Zip archives via the `zip` crate.

use std::io::Read;

use zip::ZipArchive;
use zip::result::ZipError;

use crate::codec::{
    ArchiveItem, AskMode, Codec, ExtractCallbacks, InArchive, OpenCallback, OperationResult, SharedStream, transfer,
};
use crate::fs::FileAttributes;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

const LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
const END_OF_DIRECTORY: &[u8; 4] = b"PK\x05\x06";

/// Codec for Zip, including archives behind a stub (self-extractors).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl Codec for ZipCodec {
    fn open(
        &self,
        stream: SharedStream,
        max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>> {
        let head = stream.peek_prefix(max_check_start.saturating_add(4))?;
        let signed = head
            .windows(4)
            .any(|w| w == LOCAL_HEADER || w == END_OF_DIRECTORY);
        if !signed {
            return Ok(None);
        }

        let mut archive = match ZipArchive::new(stream.rewound()) {
            Ok(archive) => archive,
            Err(ZipError::Io(e)) => return Err(Error::from_io(e)),
            Err(e) => {
                log::debug!("zip: signature found but directory unreadable: {}", e);
                return Ok(None);
            }
        };
        let count = archive.len();
        callback.set_total(Some(count as u64), None)?;

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let file = archive.by_index_raw(i).map_err(zip_error)?;
            let is_dir = file.is_dir();
            let modified: Option<zip::DateTime> = Option::from(file.last_modified());
            items.push(ArchiveItem {
                path: file.name().to_string(),
                is_dir,
                size: file.size(),
                attributes: file
                    .unix_mode()
                    .map(|mode| FileAttributes::from_unix_mode(mode, is_dir).bits()),
                modification_time: modified.and_then(|t| {
                    Timestamp::from_civil(
                        i32::from(t.year()),
                        u32::from(t.month()),
                        u32::from(t.day()),
                        u32::from(t.hour()),
                        u32::from(t.minute()),
                        u32::from(t.second()),
                    )
                }),
                encrypted: file.encrypted(),
                ..ArchiveItem::default()
            });
            callback.set_completed(Some(i as u64 + 1), None)?;
        }

        Ok(Some(Box::new(ZipInArchive { archive, items })))
    }
}

/// Maps errors raised while reading the central directory.
fn zip_error(e: ZipError) -> Error {
    match e {
        ZipError::Io(e) => Error::from_io(e),
        other => Error::InvalidFormat(other.to_string()),
    }
}

/// Maps errors raised while opening one entry for decoding.
fn entry_result(e: &ZipError) -> OperationResult {
    match e {
        ZipError::UnsupportedArchive(_) => OperationResult::UnsupportedMethod,
        ZipError::InvalidPassword => OperationResult::DataError,
        ZipError::Io(e) => OperationResult::from_read_error(e),
        _ => OperationResult::DataError,
    }
}

struct ZipInArchive {
    archive: ZipArchive<SharedStream>,
    items: Vec<ArchiveItem>,
}

impl InArchive for ZipInArchive {
    fn item_count(&self) -> u32 {
        self.items.len() as u32
    }

    fn item(&self, index: u32) -> Result<ArchiveItem> {
        self.items
            .get(index as usize)
            .cloned()
            .ok_or(Error::InvalidIndex { index })
    }

    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()> {
        let total = indices
            .iter()
            .filter_map(|&i| self.items.get(i as usize))
            .map(|item| item.size)
            .sum();
        callbacks.progress.set_total(total)?;

        let mut completed = 0;
        for &index in indices {
            let (is_dir, encrypted) = match self.items.get(index as usize) {
                Some(item) => (item.is_dir, item.encrypted),
                None => return Err(Error::InvalidIndex { index }),
            };
            let result = {
                let mut out = callbacks.streams.get_stream(index, mode)?;
                if is_dir || (out.is_none() && mode != AskMode::Test) {
                    OperationResult::Ok
                } else {
                    let opened = if encrypted {
                        let password = callbacks.password.password()?;
                        self.archive.by_index_decrypt(index as usize, password.as_bytes())
                    } else {
                        self.archive.by_index(index as usize)
                    };
                    match opened {
                        Ok(mut file) => {
                            let reader: &mut dyn Read = &mut file;
                            match transfer(reader, out.as_deref_mut(), callbacks.progress, &mut completed)? {
                                Ok(_) => OperationResult::Ok,
                                Err(e) => OperationResult::from_read_error(&e),
                            }
                        }
                        Err(e) => {
                            log::debug!("zip: cannot open entry {}: {}", index, e);
                            entry_result(&e)
                        }
                    }
                }
            };
            callbacks.streams.set_operation_result(result)?;
        }
        Ok(())
    }
}
