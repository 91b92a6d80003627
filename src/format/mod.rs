//! Registered container formats and format chains.
//!
//! A [`FormatRegistry`] is the immutable list of formats the detector tries,
//! in order. A [`FormatChain`] is one way of reading a stream: the outermost
//! format first, each next one opened on the previous one's embedded
//! substream. Chains display as `GZip->Tar`.

mod detect;

pub use detect::{Detected, FormatDetector, MAX_CHECK_START_POSITION};

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::codec::Codec;

/// Opaque identifier of a registered format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(pub u32);

/// Identifiers of the built-in formats.
pub mod ids {
    use super::FormatId;

    /// Zip.
    pub const ZIP: FormatId = FormatId(0x01);
    /// BZip2.
    pub const BZIP2: FormatId = FormatId(0x02);
    /// Zstandard.
    pub const ZSTD: FormatId = FormatId(0x0E);
    /// Split volumes.
    pub const SPLIT: FormatId = FormatId(0xEA);
    /// Tar.
    pub const TAR: FormatId = FormatId(0xEE);
    /// GZip.
    pub const GZIP: FormatId = FormatId(0xEF);
}

/// A container type the detector can try.
#[derive(Clone)]
pub struct ArchiveFormat {
    id: FormatId,
    name: String,
    codec: Arc<dyn Codec>,
}

impl ArchiveFormat {
    /// Creates a format entry.
    pub fn new(id: FormatId, name: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        Self {
            id,
            name: name.into(),
            codec,
        }
    }

    /// Returns the format identifier.
    pub fn id(&self) -> FormatId {
        self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the engine implementing the format.
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }
}

impl fmt::Debug for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveFormat")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ArchiveFormat {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ArchiveFormat {}

/// Ordered list of formats, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatChain {
    formats: Vec<ArchiveFormat>,
}

impl FormatChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this chain extended by `format`.
    pub fn with(&self, format: ArchiveFormat) -> Self {
        let mut formats = self.formats.clone();
        formats.push(format);
        Self { formats }
    }

    /// Returns the formats, outermost first.
    pub fn formats(&self) -> &[ArchiveFormat] {
        &self.formats
    }

    /// Returns the innermost format.
    pub fn last(&self) -> Option<&ArchiveFormat> {
        self.formats.last()
    }

    /// Returns the number of formats.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Returns true for an empty chain.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl fmt::Display for FormatChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, format) in self.formats.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            f.write_str(format.name())?;
        }
        Ok(())
    }
}

/// Formats tried by the detector, in registration order.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: Vec<ArchiveFormat>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a format.
    pub fn register(&mut self, format: ArchiveFormat) -> &mut Self {
        self.formats.push(format);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, format: ArchiveFormat) -> Self {
        self.formats.push(format);
        self
    }

    /// Returns the process-wide registry of built-in formats.
    ///
    /// Contents depend on enabled cargo features.
    pub fn builtin() -> &'static FormatRegistry {
        static BUILTIN: OnceLock<FormatRegistry> = OnceLock::new();
        BUILTIN.get_or_init(crate::codecs::builtin_formats)
    }

    /// Returns the registered formats.
    pub fn formats(&self) -> &[ArchiveFormat] {
        &self.formats
    }

    /// Iterates over the registered formats.
    pub fn iter(&self) -> std::slice::Iter<'_, ArchiveFormat> {
        self.formats.iter()
    }

    /// Looks a format up by identifier.
    pub fn find(&self, id: FormatId) -> Option<&ArchiveFormat> {
        self.formats.iter().find(|f| f.id == id)
    }

    /// Returns the number of formats.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
