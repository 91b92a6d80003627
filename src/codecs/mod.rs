//! Built-in codec engines.
//!
//! Each engine is a thin adapter from an ecosystem crate to the
//! [`Codec`](crate::codec::Codec)/[`InArchive`](crate::codec::InArchive)
//! interface:
//!
//! | Format | Crate | Feature |
//! |--------|-------|---------|
//! | GZip | `flate2` | `gzip` |
//! | BZip2 | `bzip2` | `bzip2` |
//! | Zstd | `zstd` | `zstd` |
//! | Tar | `tar` | `tar` |
//! | Zip | `zip` | `zip` |
//! | Split | (none) | always |

#[cfg(any(feature = "gzip", feature = "bzip2", feature = "zstd"))]
mod compressed;
mod split;
#[cfg(feature = "tar")]
mod tarball;
#[cfg(feature = "zip")]
mod zipfile;

#[cfg(any(feature = "gzip", feature = "bzip2", feature = "zstd"))]
pub use compressed::CompressedCodec;
pub use split::SplitCodec;
#[cfg(feature = "tar")]
pub use tarball::TarCodec;
#[cfg(feature = "zip")]
pub use zipfile::ZipCodec;

use std::sync::Arc;

#[cfg(any(feature = "gzip", feature = "tar"))]
use crate::Timestamp;
#[allow(unused_imports)]
use crate::format::{ArchiveFormat, FormatRegistry, ids};

/// Builds the registry behind [`FormatRegistry::builtin`].
///
/// Order matters only for the order of results: wrappers come first so
/// their chains are listed before the formats found inside them.
pub(crate) fn builtin_formats() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    registry.register(ArchiveFormat::new(ids::SPLIT, "Split", Arc::new(SplitCodec)));
    #[cfg(feature = "gzip")]
    registry.register(ArchiveFormat::new(ids::GZIP, "GZip", Arc::new(CompressedCodec::gzip())));
    #[cfg(feature = "bzip2")]
    registry.register(ArchiveFormat::new(ids::BZIP2, "BZip2", Arc::new(CompressedCodec::bzip2())));
    #[cfg(feature = "zstd")]
    registry.register(ArchiveFormat::new(ids::ZSTD, "Zstd", Arc::new(CompressedCodec::zstd())));
    #[cfg(feature = "zip")]
    registry.register(ArchiveFormat::new(ids::ZIP, "Zip", Arc::new(ZipCodec)));
    #[cfg(feature = "tar")]
    registry.register(ArchiveFormat::new(ids::TAR, "Tar", Arc::new(TarCodec)));
    registry
}

/// Converts Unix seconds to a timestamp, treating 0 as "not stored".
#[cfg(any(feature = "gzip", feature = "tar"))]
fn unix_time(secs: u64) -> Option<Timestamp> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs).ok().and_then(Timestamp::from_unix_secs)
}

/// Strips a compression suffix from a file name (`a.tar.gz` → `a.tar`,
/// `a.tgz` → `a.tar`).
#[cfg(any(feature = "gzip", feature = "bzip2", feature = "zstd"))]
fn strip_suffix(name: &str, suffixes: &[(&str, &str)]) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let lower = base.to_ascii_lowercase();
    for (suffix, replacement) in suffixes {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            let stem = &base[..base.len() - suffix.len()];
            return Some(format!("{stem}{replacement}"));
        }
    }
    None
}

/// Open callback stand-in for codec unit tests.
#[cfg(test)]
pub(crate) struct Named(pub Option<&'static str>);

#[cfg(test)]
impl crate::codec::OpenCallback for Named {
    fn set_total(&mut self, _: Option<u64>, _: Option<u64>) -> crate::Result<()> {
        Ok(())
    }
    fn set_completed(&mut self, _: Option<u64>, _: Option<u64>) -> crate::Result<()> {
        Ok(())
    }
    fn volume_name(&self) -> Option<&str> {
        self.0
    }
    fn open_volume(&mut self, _: &str) -> crate::Result<Option<crate::codec::SharedStream>> {
        Ok(None)
    }
    fn password(&mut self) -> crate::Result<crate::Password> {
        Err(crate::Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_split() {
        let registry = builtin_formats();
        assert!(registry.find(ids::SPLIT).is_some());
        #[cfg(feature = "tar")]
        assert_eq!(registry.find(ids::TAR).map(ArchiveFormat::name), Some("Tar"));
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_strip_suffix() {
        let gz = [(".tgz", ".tar"), (".gz", "")];
        assert_eq!(strip_suffix("dir/a.tar.gz", &gz).as_deref(), Some("a.tar"));
        assert_eq!(strip_suffix("B.TGZ", &gz).as_deref(), Some("B.tar"));
        assert_eq!(strip_suffix(".gz", &gz), None);
        assert_eq!(strip_suffix("plain", &gz), None);
    }
}
