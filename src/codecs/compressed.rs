//! Single-stream compressors: gzip, bzip2, zstd.
//!
//! Each file holds exactly one item, the decompressed payload, which is
//! also the archive's primary substream so that `a.tar.gz` is detected as
//! `GZip->Tar`. The payload is exposed as a seekable stream that restarts
//! the decoder on backward seeks.

use std::io::{self, Read, Seek, SeekFrom};

use crate::codec::{
    ArchiveItem, AskMode, Codec, ExtractCallbacks, InArchive, OpenCallback, OperationResult, SharedStream, transfer,
};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    #[cfg(feature = "gzip")]
    Gzip,
    #[cfg(feature = "bzip2")]
    Bzip2,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Kind {
    fn signature_len(self) -> usize {
        match self {
            #[cfg(feature = "gzip")]
            Kind::Gzip => 10,
            #[cfg(feature = "bzip2")]
            Kind::Bzip2 => 10,
            #[cfg(feature = "zstd")]
            Kind::Zstd => 4,
        }
    }

    fn matches(self, head: &[u8]) -> bool {
        match self {
            // magic, deflate method, no reserved flag bits
            #[cfg(feature = "gzip")]
            Kind::Gzip => head.len() >= 10 && head[0] == 0x1f && head[1] == 0x8b && head[2] == 8 && head[3] & 0xE0 == 0,
            // "BZh1".."BZh9" followed by a block or end-of-stream magic
            #[cfg(feature = "bzip2")]
            Kind::Bzip2 => {
                head.len() >= 10
                    && &head[..3] == b"BZh"
                    && (b'1'..=b'9').contains(&head[3])
                    && (head[4..10] == [0x31, 0x41, 0x59, 0x26, 0x53, 0x59]
                        || head[4..10] == [0x17, 0x72, 0x45, 0x38, 0x50, 0x90])
            }
            #[cfg(feature = "zstd")]
            Kind::Zstd => head.len() >= 4 && head[..4] == [0x28, 0xb5, 0x2f, 0xfd],
        }
    }

    fn suffixes(self) -> &'static [(&'static str, &'static str)] {
        match self {
            #[cfg(feature = "gzip")]
            Kind::Gzip => &[(".tgz", ".tar"), (".taz", ".tar"), (".gz", ""), (".gzip", "")],
            #[cfg(feature = "bzip2")]
            Kind::Bzip2 => &[(".tbz2", ".tar"), (".tbz", ".tar"), (".bz2", ""), (".bzip2", "")],
            #[cfg(feature = "zstd")]
            Kind::Zstd => &[(".tzst", ".tar"), (".zst", ""), (".zstd", "")],
        }
    }

    fn decoder(self, source: SharedStream) -> io::Result<Box<dyn Read>> {
        match self {
            #[cfg(feature = "gzip")]
            Kind::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(source))),
            #[cfg(feature = "bzip2")]
            Kind::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(source))),
            #[cfg(feature = "zstd")]
            Kind::Zstd => Ok(Box::new(zstd::stream::read::Decoder::new(source)?)),
        }
    }
}

/// Codec for a single-stream compressor.
#[derive(Debug, Clone, Copy)]
pub struct CompressedCodec {
    kind: Kind,
}

impl CompressedCodec {
    /// The gzip codec.
    #[cfg(feature = "gzip")]
    pub fn gzip() -> Self {
        Self { kind: Kind::Gzip }
    }

    /// The bzip2 codec.
    #[cfg(feature = "bzip2")]
    pub fn bzip2() -> Self {
        Self { kind: Kind::Bzip2 }
    }

    /// The zstd codec.
    #[cfg(feature = "zstd")]
    pub fn zstd() -> Self {
        Self { kind: Kind::Zstd }
    }
}

impl Codec for CompressedCodec {
    fn open(
        &self,
        stream: SharedStream,
        _max_check_start: u64,
        callback: &mut dyn OpenCallback,
    ) -> Result<Option<Box<dyn InArchive>>> {
        let head = stream.peek_prefix(self.kind.signature_len() as u64)?;
        if !self.kind.matches(&head) {
            return Ok(None);
        }
        let packed = stream.len()?;
        callback.set_total(Some(1), Some(packed))?;

        let mut item = ArchiveItem::default();
        #[cfg(feature = "gzip")]
        if self.kind == Kind::Gzip {
            let header = gzip_header(&stream)?;
            item.modification_time = super::unix_time(u64::from(header.mtime));
            item.size = gzip_size(&stream, packed)?;
            if let Some(name) = header.name {
                item.path = name;
            }
        }
        if item.path.is_empty() {
            item.path = callback
                .volume_name()
                .and_then(|name| super::strip_suffix(name, self.kind.suffixes()))
                .unwrap_or_else(|| "[Content]".to_string());
        }
        callback.set_completed(Some(1), Some(packed))?;

        Ok(Some(Box::new(CompressedArchive {
            kind: self.kind,
            source: stream,
            item,
        })))
    }
}

struct CompressedArchive {
    kind: Kind,
    source: SharedStream,
    item: ArchiveItem,
}

impl InArchive for CompressedArchive {
    fn item_count(&self) -> u32 {
        1
    }

    fn item(&self, index: u32) -> Result<ArchiveItem> {
        if index != 0 {
            return Err(Error::InvalidIndex { index });
        }
        Ok(self.item.clone())
    }

    fn main_subfile(&self) -> Option<u32> {
        Some(0)
    }

    fn open_item(&mut self, index: u32) -> Result<Option<SharedStream>> {
        if index != 0 {
            return Err(Error::InvalidIndex { index });
        }
        let decoded = DecodedStream::new(self.kind, self.source.rewound())?;
        Ok(Some(SharedStream::new(Box::new(decoded))))
    }

    fn extract(&mut self, indices: &[u32], mode: AskMode, callbacks: &mut ExtractCallbacks<'_>) -> Result<()> {
        let mut completed = 0;
        callbacks.progress.set_total(self.item.size)?;
        for &index in indices {
            if index != 0 {
                return Err(Error::InvalidIndex { index });
            }
            let result = {
                let mut out = callbacks.streams.get_stream(index, mode)?;
                if out.is_none() && mode != AskMode::Test {
                    OperationResult::Ok
                } else {
                    match self.kind.decoder(self.source.rewound()) {
                        Ok(mut decoder) => {
                            match transfer(&mut decoder, out.as_deref_mut(), callbacks.progress, &mut completed)? {
                                Ok(_) => OperationResult::Ok,
                                Err(e) => OperationResult::from_read_error(&e),
                            }
                        }
                        Err(e) => OperationResult::from_read_error(&e),
                    }
                }
            };
            callbacks.streams.set_operation_result(result)?;
        }
        Ok(())
    }
}

#[cfg(feature = "gzip")]
struct GzipHeader {
    mtime: u32,
    name: Option<String>,
}

/// Parses the RFC 1952 member header for the stored name and mtime.
#[cfg(feature = "gzip")]
fn gzip_header(stream: &SharedStream) -> Result<GzipHeader> {
    const FEXTRA: u8 = 0x04;
    const FNAME: u8 = 0x08;

    let mut reader = io::BufReader::new(stream.rewound());
    let mut fixed = [0u8; 10];
    reader.read_exact(&mut fixed)?;
    let flags = fixed[3];
    let mtime = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
    if flags & FEXTRA != 0 {
        let mut len = [0u8; 2];
        reader.read_exact(&mut len)?;
        io::copy(&mut (&mut reader).take(u64::from(u16::from_le_bytes(len))), &mut io::sink())?;
    }
    let mut name = None;
    if flags & FNAME != 0 {
        let mut raw = Vec::new();
        io::BufRead::read_until(&mut reader, 0, &mut raw)?;
        if raw.last() == Some(&0) {
            raw.pop();
        }
        // RFC 1952 names are ISO 8859-1.
        let text: String = raw.iter().map(|&b| char::from(b)).collect();
        if !text.is_empty() {
            name = Some(text);
        }
    }
    Ok(GzipHeader { mtime, name })
}

/// Payloads up to this many decoded bytes are measured exactly at open.
#[cfg(feature = "gzip")]
const EXACT_SIZE_LIMIT: u64 = 64 << 20;

/// Uncompressed size of a gzip file.
///
/// Small payloads are decoded once and counted, which covers multi-member
/// files. Larger or corrupt ones fall back to the ISIZE trailer.
#[cfg(feature = "gzip")]
fn gzip_size(stream: &SharedStream, packed: u64) -> Result<u64> {
    let mut decoder = Kind::Gzip.decoder(stream.rewound())?;
    match io::copy(&mut decoder.by_ref().take(EXACT_SIZE_LIMIT + 1), &mut io::sink()) {
        Ok(n) if n <= EXACT_SIZE_LIMIT => return Ok(n),
        Ok(_) => {}
        Err(e) => log::debug!("gzip: counting pass failed, using trailer: {}", e),
    }
    if packed < 18 {
        return Ok(0);
    }
    let mut tail = stream.rewound();
    tail.seek(SeekFrom::Start(packed - 4))?;
    let mut isize = [0u8; 4];
    tail.read_exact(&mut isize)?;
    Ok(unwrap_isize(u32::from_le_bytes(isize), packed))
}

/// Recovers a size from ISIZE, which is stored modulo 2^32.
///
/// A deflate stream spends less than two bytes per input byte, so the result
/// is the smallest value congruent to `isize` that is at least half the
/// packed payload.
#[cfg(feature = "gzip")]
fn unwrap_isize(isize: u32, packed: u64) -> u64 {
    const WRAP: u64 = 1 << 32;
    let floor = packed.saturating_sub(18) / 2;
    let low = u64::from(isize);
    if low >= floor {
        return low;
    }
    low + (floor - low).div_ceil(WRAP) * WRAP
}

/// Seekable view of a decoded payload.
struct DecodedStream {
    kind: Kind,
    source: SharedStream,
    decoder: Box<dyn Read>,
    pos: u64,
    len: Option<u64>,
}

impl DecodedStream {
    fn new(kind: Kind, source: SharedStream) -> io::Result<Self> {
        let decoder = kind.decoder(source.rewound())?;
        Ok(Self {
            kind,
            source,
            decoder,
            pos: 0,
            len: None,
        })
    }

    fn restart(&mut self) -> io::Result<()> {
        self.decoder = self.kind.decoder(self.source.rewound())?;
        self.pos = 0;
        Ok(())
    }

    fn skip(&mut self, count: u64) -> io::Result<()> {
        let skipped = io::copy(&mut (&mut self.decoder).take(count), &mut io::sink())?;
        self.pos += skipped;
        if skipped < count {
            self.len = Some(self.pos);
        }
        Ok(())
    }

    fn total_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let rest = io::copy(&mut self.decoder, &mut io::sink())?;
        let len = self.pos + rest;
        self.len = Some(len);
        self.pos = len;
        Ok(len)
    }
}

impl Read for DecodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.decoder.read(buf)?;
        self.pos += n as u64;
        if n == 0 && !buf.is_empty() && self.len.is_none() {
            self.len = Some(self.pos);
        }
        Ok(n)
    }
}

impl Seek for DecodedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.total_len()?) + i128::from(delta),
        };
        let target = u64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"))?;
        if target < self.pos {
            self.restart()?;
        }
        if target > self.pos {
            if let Some(len) = self.len.filter(|&len| target >= len) {
                // Past the end: consume everything, then park the cursor.
                let here = self.pos;
                self.skip(len.saturating_sub(here))?;
                self.pos = target;
                return Ok(target);
            }
            self.skip(target - self.pos)?;
            if self.pos < target {
                self.pos = target;
            }
        }
        Ok(self.pos)
    }
}
