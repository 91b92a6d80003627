//! Thin OS layer used by the extraction job.
//!
//! Every path handed to these functions goes through [`long_path`] first, so
//! deep destination trees work on Windows. Functions return plain
//! [`io::Result`]s; the job decides whether a failure is retried, ignored,
//! or fatal.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::timestamp::Timestamp;

/// Windows-style attribute bitmask as reported by archive engines.
///
/// The high 16 bits may carry a Unix `st_mode` when
/// [`UNIX_EXTENSION`](Self::UNIX_EXTENSION) is set, the convention shared by
/// zip and tar engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAttributes(u32);

impl FileAttributes {
    /// Entry may not be written.
    pub const READONLY: u32 = 0x01;
    /// Entry is hidden.
    pub const HIDDEN: u32 = 0x02;
    /// Entry is a system file.
    pub const SYSTEM: u32 = 0x04;
    /// Entry is a directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Entry is marked for backup.
    pub const ARCHIVE: u32 = 0x20;
    /// No other attributes set.
    pub const NORMAL: u32 = 0x80;
    /// High 16 bits hold a Unix mode.
    pub const UNIX_EXTENSION: u32 = 0x8000;

    /// Wraps a raw bitmask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Builds attributes carrying a Unix mode.
    pub fn from_unix_mode(mode: u32, is_dir: bool) -> Self {
        let mut bits = ((mode & 0xFFFF) << 16) | Self::UNIX_EXTENSION;
        if is_dir {
            bits |= Self::DIRECTORY;
        }
        if mode & 0o222 == 0 {
            bits |= Self::READONLY;
        }
        Self(bits)
    }

    /// Returns the raw bitmask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if all bits of `flag` are set.
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Returns true if the read-only flag is set.
    pub const fn is_readonly(self) -> bool {
        self.contains(Self::READONLY)
    }

    /// Returns the Unix permission bits, if present.
    pub fn unix_mode(self) -> Option<u32> {
        if self.contains(Self::UNIX_EXTENSION) {
            Some((self.0 >> 16) & 0o7777)
        } else {
            None
        }
    }
}

/// Normalizes a path for OS calls.
///
/// On Windows, absolute paths get the `\\?\` extended-length prefix (UNC
/// paths become `\\?\UNC\server\share`). Elsewhere the path is returned as is.
pub fn long_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let text = path.as_os_str().to_string_lossy();
        if !path.is_absolute() || text.starts_with(r"\\?\") || text.starts_with(r"\\.\") {
            return path.to_path_buf();
        }
        if let Some(unc) = text.strip_prefix(r"\\") {
            return PathBuf::from(format!(r"\\?\UNC\{unc}"));
        }
        PathBuf::from(format!(r"\\?\{text}"))
    }
    #[cfg(not(windows))]
    {
        path.to_path_buf()
    }
}

/// Creates one directory; an existing directory is not an error.
///
/// A symlink in its place is replaced by a real directory so nothing
/// extracted below it lands outside the destination.
pub fn create_dir(path: &Path) -> io::Result<()> {
    let path = long_path(path);
    match fs::create_dir(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let metadata = fs::symlink_metadata(&path)?;
            if metadata.file_type().is_symlink() {
                log::debug!("replacing symlink {} with a directory", path.display());
                remove_link(&path)?;
                fs::create_dir(&path)
            } else if metadata.is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

/// Creates a directory and all missing parents; idempotent.
pub fn create_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(long_path(path))
}

/// Returns metadata without following a final symlink, or `None` if nothing exists.
pub fn existing(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(long_path(path)) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Creates or truncates a file for writing.
pub fn create_file(path: &Path) -> io::Result<File> {
    File::create(long_path(path))
}

/// Removes a file.
pub fn remove_file(path: &Path) -> io::Result<()> {
    fs::remove_file(long_path(path))
}

/// Removes a symlink itself, never its target.
pub fn remove_link(path: &Path) -> io::Result<()> {
    let path = long_path(path);
    // Windows directory links are removed as directories.
    fs::remove_file(&path).or_else(|e| fs::remove_dir(&path).map_err(|_| e))
}

/// Clears protective attributes so the path can be modified.
pub fn make_writable(path: &Path) -> io::Result<()> {
    let path = long_path(path);
    let mut perms = fs::metadata(&path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o200 != 0 {
            return Ok(());
        }
        perms.set_mode(mode | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            return Ok(());
        }
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    fs::set_permissions(&path, perms)
}

/// Reserves `size` bytes for `file` and rewinds it.
pub fn allocate(file: &mut File, size: u64) -> io::Result<()> {
    if size == 0 {
        return Ok(());
    }
    file.set_len(size)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Writes the timestamps that are present; absent ones keep their value.
pub fn set_times(
    path: &Path,
    creation: Option<Timestamp>,
    access: Option<Timestamp>,
    modification: Option<Timestamp>,
) -> io::Result<()> {
    let path = long_path(path);
    match (access, modification) {
        (Some(atime), Some(mtime)) => {
            filetime::set_file_times(&path, atime.to_file_time(), mtime.to_file_time())?
        }
        (Some(atime), None) => filetime::set_file_atime(&path, atime.to_file_time())?,
        (None, Some(mtime)) => filetime::set_file_mtime(&path, mtime.to_file_time())?,
        (None, None) => {}
    }
    set_creation_time(&path, creation)
}

#[cfg(windows)]
fn set_creation_time(path: &Path, creation: Option<Timestamp>) -> io::Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::{FileTimesExt, OpenOptionsExt};

    // Opening a directory handle requires FILE_FLAG_BACKUP_SEMANTICS.
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

    let Some(ctime) = creation else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .write(true)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?;
    file.set_times(FileTimes::new().set_created(ctime.as_system_time()))
}

#[cfg(not(windows))]
fn set_creation_time(path: &Path, creation: Option<Timestamp>) -> io::Result<()> {
    if creation.is_some() {
        log::debug!("creation time not settable on this platform: {}", path.display());
    }
    Ok(())
}

/// Applies an attribute bitmask.
///
/// Unix honors an embedded mode, or maps read-only onto the write bits.
/// Windows maps read-only onto the file permissions.
pub fn set_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    let path = long_path(path);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        if let Some(mode) = attributes.unix_mode() {
            perms.set_mode(mode);
        } else if attributes.is_readonly() {
            perms.set_mode(perms.mode() & !0o222);
        } else {
            return Ok(());
        }
        fs::set_permissions(&path, perms)
    }
    #[cfg(not(unix))]
    {
        if attributes.is_readonly() {
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(&path, perms)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_create_dir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a");
        create_dir(&dir).unwrap();
        create_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_create_dir_over_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"x").unwrap();
        assert!(create_dir(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_create_dir_replaces_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        create_dir(&link).unwrap();
        assert!(!fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(link.is_dir());
        assert!(outside.is_dir());
    }

    #[test]
    fn test_allocate_then_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let mut file = create_file(&path).unwrap();
        allocate(&mut file, 10).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 10);
        file.write_all(b"0123456789").unwrap();
        drop(file);
        assert_eq!(fs::read(&path).unwrap(), b"0123456789");
    }

    #[test]
    fn test_set_times() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"x").unwrap();
        let mtime = Timestamp::from_unix_secs(1_000_000_000).unwrap();
        set_times(&path, None, None, Some(mtime)).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(modified, mtime.as_system_time());
    }

    #[test]
    fn test_existing() {
        let temp = TempDir::new().unwrap();
        assert!(existing(&temp.path().join("nope")).unwrap().is_none());
        assert!(existing(temp.path()).unwrap().is_some());
    }

    #[test]
    fn test_attribute_bits() {
        let attrs = FileAttributes::from_unix_mode(0o100644, false);
        assert_eq!(attrs.unix_mode(), Some(0o644));
        assert!(!attrs.is_readonly());

        let attrs = FileAttributes::from_unix_mode(0o40555, true);
        assert!(attrs.is_readonly());
        assert!(attrs.contains(FileAttributes::DIRECTORY));

        let attrs = FileAttributes::from_bits(FileAttributes::READONLY | FileAttributes::ARCHIVE);
        assert_eq!(attrs.unix_mode(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_readonly_roundtrip() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"x").unwrap();
        set_attributes(&path, FileAttributes::from_bits(FileAttributes::READONLY)).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o222, 0);

        make_writable(&path).unwrap();
        assert_ne!(fs::metadata(&path).unwrap().permissions().mode() & 0o200, 0);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_long_path_is_identity() {
        assert_eq!(long_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
