//! Nested format detection.
//!
//! The detector tries every registered format against a stream. Each format
//! that opens it yields one result; if the opened archive exposes an
//! embedded primary substream (a gzip payload, a split-volume concatenation)
//! the detector probes that substream too, extending the chain. A `.tar.gz`
//! therefore yields both `GZip` and `GZip->Tar`.
//!
//! Per-format failures are treated as "no match". Two things abort the
//! whole detection instead: cancellation from the open callback (the user
//! declined a password prompt), and an I/O failure on the host stream.

use std::fmt;

use crate::codec::{InArchive, OpenCallback, SharedStream};
use crate::format::{ArchiveFormat, FormatChain, FormatRegistry};
use crate::password::Password;
use crate::{Error, Result};

/// Default probe budget: formats must find their signature in the first MiB.
pub const MAX_CHECK_START_POSITION: u64 = 1 << 20;

/// One way to read the stream: the opened innermost archive and its chain.
pub struct Detected {
    /// The opened archive of the chain's innermost format.
    pub archive: Box<dyn InArchive>,
    /// Formats from outermost to innermost.
    pub chain: FormatChain,
}

impl fmt::Debug for Detected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detected")
            .field("chain", &self.chain.to_string())
            .field("items", &self.archive.item_count())
            .finish()
    }
}

/// Probes streams against a [`FormatRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct FormatDetector<'r> {
    registry: &'r FormatRegistry,
    max_check_start: u64,
}

impl<'r> FormatDetector<'r> {
    /// Creates a detector with the default probe budget.
    pub fn new(registry: &'r FormatRegistry) -> Self {
        Self {
            registry,
            max_check_start: MAX_CHECK_START_POSITION,
        }
    }

    /// Sets the probe budget in bytes.
    pub fn max_check_start(mut self, bytes: u64) -> Self {
        self.max_check_start = bytes;
        self
    }

    /// Returns the registry the detector probes.
    pub fn registry(&self) -> &'r FormatRegistry {
        self.registry
    }

    /// Returns the probe budget in bytes.
    pub fn probe_budget(&self) -> u64 {
        self.max_check_start
    }

    /// Returns every chain that opens `stream`, outer chains before inner ones.
    ///
    /// An empty result means the stream is not an archive.
    pub fn detect(&self, stream: &SharedStream, callback: &mut dyn OpenCallback) -> Result<Vec<Detected>> {
        let mut found = Vec::new();
        self.detect_level(stream, stream, &FormatChain::new(), true, None, callback, &mut found)?;
        log::debug!("detected {} format chain(s)", found.len());
        Ok(found)
    }

    /// Opens `stream` through exactly the formats of `chain`, without probing.
    ///
    /// Used to reopen an archive whose chain was selected earlier.
    pub fn open_chain(
        &self,
        stream: &SharedStream,
        chain: &FormatChain,
        callback: &mut dyn OpenCallback,
    ) -> Result<Box<dyn InArchive>> {
        let mut current = stream.rewound();
        let mut name: Option<String> = None;
        let count = chain.len();
        for (level, format) in chain.formats().iter().enumerate() {
            let opened = {
                let mut level_cb = LevelCallback::new(callback, level == 0, name.take());
                format
                    .codec()
                    .open(current.rewound(), self.max_check_start, &mut level_cb)
            };
            check_host(stream)?;
            let mut archive = match opened {
                Ok(Some(archive)) => archive,
                Ok(None) => return Err(broken(format)),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    log::debug!("{} failed on reopen: {}", format.name(), e);
                    return Err(broken(format));
                }
            };
            if level + 1 == count {
                return Ok(archive);
            }
            match open_main_subfile(archive.as_mut()) {
                Ok(Some((sub, sub_name))) => {
                    current = sub;
                    name = Some(sub_name);
                }
                Ok(None) => return Err(broken(&chain.formats()[level + 1])),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => {
                    check_host(stream)?;
                    return Err(broken(&chain.formats()[level + 1]));
                }
            }
            archive.close();
        }
        Err(Error::NotAnArchive)
    }

    #[allow(clippy::too_many_arguments)]
    fn detect_level(
        &self,
        host: &SharedStream,
        stream: &SharedStream,
        parent: &FormatChain,
        top_level: bool,
        name: Option<String>,
        callback: &mut dyn OpenCallback,
        found: &mut Vec<Detected>,
    ) -> Result<()> {
        // Each level strictly narrows to a sub-resource; the registry size
        // bounds how deep a chain can meaningfully get.
        if parent.len() >= self.registry.len() {
            return Ok(());
        }
        for format in self.registry.iter() {
            let opened = {
                let mut level_cb = LevelCallback::new(callback, top_level, name.clone());
                format
                    .codec()
                    .open(stream.rewound(), self.max_check_start, &mut level_cb)
            };
            if let Err(e) = &opened {
                if e.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
            check_host(host)?;
            let mut archive = match opened {
                Ok(Some(archive)) => archive,
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("{} does not match: {}", format.name(), e);
                    continue;
                }
            };

            let chain = parent.with(format.clone());
            let nested = match open_main_subfile(archive.as_mut()) {
                Ok(nested) => nested,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    check_host(host)?;
                    log::debug!("{}: embedded stream unavailable: {}", chain, e);
                    None
                }
            };
            found.push(Detected {
                archive,
                chain: chain.clone(),
            });
            if let Some((sub, sub_name)) = nested {
                self.detect_level(host, &sub, &chain, false, Some(sub_name), callback, found)?;
            }
        }
        Ok(())
    }
}

fn broken(format: &ArchiveFormat) -> Error {
    Error::ChainBroken {
        format: format.name().to_string(),
    }
}

/// Fails if the host stream recorded an I/O failure.
fn check_host(host: &SharedStream) -> Result<()> {
    match host.faults().take() {
        Some(fault) => Err(Error::Io(fault)),
        None => Ok(()),
    }
}

fn open_main_subfile(archive: &mut dyn InArchive) -> Result<Option<(SharedStream, String)>> {
    let Some(index) = archive.main_subfile() else {
        return Ok(None);
    };
    if index >= archive.item_count() {
        return Ok(None);
    }
    let name = archive.item(index)?.path;
    Ok(archive.open_item(index)?.map(|stream| (stream, name)))
}

/// Open callback for one nesting level.
///
/// Nested levels report the embedded item's name and cannot open sibling
/// volumes; everything else is forwarded.
struct LevelCallback<'c> {
    inner: &'c mut dyn OpenCallback,
    top_level: bool,
    name: Option<String>,
}

impl<'c> LevelCallback<'c> {
    fn new(inner: &'c mut dyn OpenCallback, top_level: bool, name: Option<String>) -> Self {
        Self {
            inner,
            top_level,
            name,
        }
    }
}

impl OpenCallback for LevelCallback<'_> {
    fn set_total(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()> {
        self.inner.set_total(files, bytes)
    }

    fn set_completed(&mut self, files: Option<u64>, bytes: Option<u64>) -> Result<()> {
        self.inner.set_completed(files, bytes)
    }

    fn volume_name(&self) -> Option<&str> {
        match &self.name {
            Some(name) => Some(name),
            None if self.top_level => self.inner.volume_name(),
            None => None,
        }
    }

    fn open_volume(&mut self, name: &str) -> Result<Option<SharedStream>> {
        if self.top_level {
            self.inner.open_volume(name)
        } else {
            Ok(None)
        }
    }

    fn password(&mut self) -> Result<Password> {
        self.inner.password()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ArchiveItem, AskMode, Codec, ExtractCallbacks};
    use crate::format::{ArchiveFormat, FormatId};
    use std::io::{self, Read, Seek, SeekFrom};
    use std::sync::Arc;

    /// Matches streams starting with `magic`; optionally wraps the rest.
    struct Magic {
        magic: &'static [u8],
        wraps: bool,
        fail_with: Option<fn() -> Error>,
    }

    struct MagicArchive {
        stream: SharedStream,
        skip: u64,
        wraps: bool,
    }

    impl Codec for Magic {
        fn open(
            &self,
            mut stream: SharedStream,
            _max_check_start: u64,
            _callback: &mut dyn OpenCallback,
        ) -> Result<Option<Box<dyn InArchive>>> {
            let mut head = vec![0u8; self.magic.len()];
            if stream.read_exact(&mut head).is_err() || head != self.magic {
                return Ok(None);
            }
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(Some(Box::new(MagicArchive {
                stream,
                skip: self.magic.len() as u64,
                wraps: self.wraps,
            })))
        }
    }

    impl InArchive for MagicArchive {
        fn item_count(&self) -> u32 {
            1
        }

        fn item(&self, _index: u32) -> Result<ArchiveItem> {
            Ok(ArchiveItem {
                path: "payload".into(),
                ..ArchiveItem::default()
            })
        }

        fn main_subfile(&self) -> Option<u32> {
            self.wraps.then_some(0)
        }

        fn open_item(&mut self, _index: u32) -> Result<Option<SharedStream>> {
            let mut rest = Vec::new();
            let mut s = self.stream.rewound();
            s.seek(SeekFrom::Start(self.skip))?;
            s.read_to_end(&mut rest)?;
            Ok(Some(SharedStream::from_bytes(rest)))
        }

        fn extract(&mut self, _: &[u32], _: AskMode, _: &mut ExtractCallbacks<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct Quiet;

    impl OpenCallback for Quiet {
        fn set_total(&mut self, _: Option<u64>, _: Option<u64>) -> Result<()> {
            Ok(())
        }
        fn set_completed(&mut self, _: Option<u64>, _: Option<u64>) -> Result<()> {
            Ok(())
        }
        fn volume_name(&self) -> Option<&str> {
            Some("host.bin")
        }
        fn open_volume(&mut self, _: &str) -> Result<Option<SharedStream>> {
            Ok(None)
        }
        fn password(&mut self) -> Result<Password> {
            Err(Error::Cancelled)
        }
    }

    fn registry(specs: &[(u32, &'static str, &'static [u8], bool)]) -> FormatRegistry {
        let mut registry = FormatRegistry::new();
        for &(id, name, magic, wraps) in specs {
            registry.register(ArchiveFormat::new(
                FormatId(id),
                name,
                Arc::new(Magic {
                    magic,
                    wraps,
                    fail_with: None,
                }),
            ));
        }
        registry
    }

    fn names(found: &[Detected]) -> Vec<String> {
        found.iter().map(|d| d.chain.to_string()).collect()
    }

    #[test]
    fn test_single_match() {
        let registry = registry(&[(1, "A", b"AA", false), (2, "B", b"BB", false)]);
        let stream = SharedStream::from_bytes(b"BBxyz".to_vec());
        let found = FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap();
        assert_eq!(names(&found), ["B"]);
    }

    #[test]
    fn test_no_match() {
        let registry = registry(&[(1, "A", b"AA", false)]);
        let stream = SharedStream::from_bytes(b"zzz".to_vec());
        assert!(FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap().is_empty());
    }

    #[test]
    fn test_nested_chain() {
        let registry = registry(&[(1, "Wrap", b"W", true), (2, "Inner", b"I", false)]);
        let stream = SharedStream::from_bytes(b"WIdata".to_vec());
        let found = FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap();
        assert_eq!(names(&found), ["Wrap", "Wrap->Inner"]);
    }

    #[test]
    fn test_depth_is_bounded() {
        let registry = registry(&[(1, "W", b"W", true)]);
        let stream = SharedStream::from_bytes(b"WWWWWW".to_vec());
        let found = FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap();
        assert_eq!(names(&found), ["W"]);
    }

    #[test]
    fn test_open_errors_are_swallowed() {
        let mut registry = registry(&[(2, "Good", b"X", false)]);
        registry.register(ArchiveFormat::new(
            FormatId(1),
            "Bad",
            Arc::new(Magic {
                magic: b"X",
                wraps: false,
                fail_with: Some(|| Error::InvalidFormat("truncated".into())),
            }),
        ));
        let stream = SharedStream::from_bytes(b"X1".to_vec());
        let found = FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap();
        assert_eq!(names(&found), ["Good"]);
    }

    #[test]
    fn test_cancellation_propagates() {
        let registry = FormatRegistry::new().with(ArchiveFormat::new(
            FormatId(1),
            "Locked",
            Arc::new(Magic {
                magic: b"L",
                wraps: false,
                fail_with: Some(|| Error::Cancelled),
            }),
        ));
        let stream = SharedStream::from_bytes(b"L".to_vec());
        let err = FormatDetector::new(&registry).detect(&stream, &mut Quiet).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_host_io_failure_is_fatal() {
        struct Flaky;
        impl Read for Flaky {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("bad sector"))
            }
        }
        impl Seek for Flaky {
            fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
                Ok(0)
            }
        }

        let registry = registry(&[(1, "A", b"AA", false)]);
        let stream = SharedStream::new(Box::new(Flaky));
        match FormatDetector::new(&registry).detect(&stream, &mut Quiet) {
            Err(Error::Io(e)) => assert_eq!(e.to_string(), "bad sector"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_open_chain_replays_selection() {
        let registry = registry(&[(1, "Wrap", b"W", true), (2, "Inner", b"I", false)]);
        let stream = SharedStream::from_bytes(b"WIdata".to_vec());
        let detector = FormatDetector::new(&registry);
        let found = detector.detect(&stream, &mut Quiet).unwrap();
        let chain = found[1].chain.clone();
        drop(found);

        let archive = detector.open_chain(&stream, &chain, &mut Quiet).unwrap();
        assert_eq!(archive.item_count(), 1);

        let other = SharedStream::from_bytes(b"Wdata".to_vec());
        match detector.open_chain(&other, &chain, &mut Quiet) {
            Err(Error::ChainBroken { format }) => assert_eq!(format, "Inner"),
            Err(e) => panic!("unexpected {e:?}"),
            Ok(_) => panic!("chain should not reopen"),
        }
    }
}
