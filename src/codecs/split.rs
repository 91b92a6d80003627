//! Raw split volumes: `name.001`, `name.002`, ...
//!
//! The volumes are byte slices of one file. The format has a single item,
//! their concatenation, which is also the primary substream so detection
//! continues into whatever was split.

use std::io::{self, Read, Seek, SeekFrom};

use crate::codec::{
    ArchiveItem, AskMode, Codec, ExtractCallbacks, InArchive, OpenCallback, OperationResult, SharedStream, transfer,
};
use crate::{Error, Result};

const FIRST_SUFFIX: &str = ".001";

/// Codec for numbered split volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitCodec;

impl Codec for SplitCodec {
    fn open(
        &self,
        stream: SharedStream,
        _max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>> {
        let Some(stem) = callback.volume_name().and_then(volume_stem) else {
            return Ok(None);
        };

        let mut volumes = vec![Volume::new(stream)?];
        callback.set_completed(Some(1), Some(volumes[0].len))?;
        for number in 2u32.. {
            let name = format!("{stem}.{number:03}");
            let Some(next) = callback.open_volume(&name)? else {
                break;
            };
            volumes.push(Volume::new(next)?);
            let bytes = volumes.iter().map(|v| v.len).sum();
            callback.set_completed(Some(volumes.len() as u64), Some(bytes))?;
        }
        log::debug!("split: {} volumes for {}", volumes.len(), stem);

        let joined = Concatenated::new(volumes);
        let item = ArchiveItem {
            path: base_name(&stem).to_string(),
            size: joined.len,
            ..ArchiveItem::default()
        };
        callback.set_total(Some(1), Some(item.size))?;
        Ok(Some(Box::new(SplitArchive {
            joined: SharedStream::new(Box::new(joined)),
            item,
        })))
    }
}

/// Returns the path without its `.001` suffix, if it has one.
fn volume_stem(name: &str) -> Option<String> {
    let split = name.len().checked_sub(FIRST_SUFFIX.len())?;
    if split == 0 || !name.is_char_boundary(split) || !name[split..].eq_ignore_ascii_case(FIRST_SUFFIX) {
        return None;
    }
    Some(name[..split].to_string())
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

struct Volume {
    stream: SharedStream,
    len: u64,
}

impl Volume {
    fn new(stream: SharedStream) -> io::Result<Self> {
        let len = stream.len()?;
        Ok(Self {
            stream: stream.rewound(),
            len,
        })
    }
}

/// The volumes read back to back as one stream.
struct Concatenated {
    volumes: Vec<Volume>,
    /// Start offset of each volume.
    starts: Vec<u64>,
    len: u64,
    pos: u64,
}

impl Concatenated {
    fn new(volumes: Vec<Volume>) -> Self {
        let mut starts = Vec::with_capacity(volumes.len());
        let mut len = 0;
        for volume in &volumes {
            starts.push(len);
            len += volume.len;
        }
        Self {
            volumes,
            starts,
            len,
            pos: 0,
        }
    }
}

impl Read for Concatenated {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let index = self.starts.partition_point(|&start| start <= self.pos) - 1;
        let volume = &mut self.volumes[index];
        let offset = self.pos - self.starts[index];
        let want = buf.len().min((volume.len - offset) as usize);
        volume.stream.seek(SeekFrom::Start(offset))?;
        let n = volume.stream.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "split volume is shorter than reported"));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for Concatenated {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len) + i128::from(delta),
        };
        self.pos = u64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"))?;
        Ok(self.pos)
    }
}

struct SplitArchive {
    joined: SharedStream,
    item: ArchiveItem,
}

impl InArchive for SplitArchive {
    fn item_count(&self) -> u32 {
        1
    }

    fn item(&self, index: u32) -> Result<ArchiveItem> {
        match index {
            0 => Ok(self.item.clone()),
            _ => Err(Error::InvalidIndex { index }),
        }
    }

    fn main_subfile(&self) -> Option<u32> {
        Some(0)
    }

    fn open_item(&mut self, index: u32) -> Result<Option<SharedStream>> {
        match index {
            0 => Ok(Some(self.joined.rewound())),
            _ => Err(Error::InvalidIndex { index }),
        }
    }

    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()> {
        callbacks.progress.set_total(self.item.size)?;
        let mut completed = 0;
        for &index in indices {
            if index != 0 {
                return Err(Error::InvalidIndex { index });
            }
            let result = {
                let mut out = callbacks.streams.get_stream(index, mode)?;
                if out.is_none() && mode != AskMode::Test {
                    OperationResult::Ok
                } else {
                    let mut reader = self.joined.rewound();
                    match transfer(&mut reader, out.as_deref_mut(), callbacks.progress, &mut completed)? {
                        Ok(_) => OperationResult::Ok,
                        Err(e) => OperationResult::from_read_error(&e),
                    }
                }
            };
            callbacks.streams.set_operation_result(result)?;
        }
        Ok(())
    }
}
