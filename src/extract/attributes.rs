//! Attribute and timestamp restoration pass.

use std::io;
use std::path::Path;

use super::callbacks::JobContext;
use crate::Result;
use crate::fs;
use crate::tree::FileEntry;

/// Restores `index` and everything below it, deepest entries first.
///
/// A directory is handled after all of its descendants. Entries that never
/// made it to disk (skipped, failed, or created in a failed directory) are
/// left alone.
pub(super) fn restore(ctx: &JobContext<'_, '_>, index: u32) -> Result<()> {
    ctx.check()?;
    let tree = ctx.tree();
    let entry = &tree[index];
    if entry.is_dir {
        for &child in tree.children(index) {
            restore(ctx, child)?;
        }
    }
    if !ctx.is_materialized(index) || !has_metadata(entry) {
        return Ok(());
    }
    let path = ctx.dest_path(index);
    ctx.monitor().start_file(&path, 0);
    ctx.retry(&path, || apply(&path, entry))?;
    Ok(())
}

fn has_metadata(entry: &FileEntry) -> bool {
    entry.attributes.is_some()
        || entry.creation_time.is_some()
        || entry.access_time.is_some()
        || entry.modification_time.is_some()
}

/// Clears protection, writes the times, then applies the attributes last
/// so a read-only bit cannot block the time update.
fn apply(path: &Path, entry: &FileEntry) -> io::Result<()> {
    fs::make_writable(path)?;
    fs::set_times(path, entry.creation_time, entry.access_time, entry.modification_time)?;
    if let Some(attributes) = entry.attributes {
        fs::set_attributes(path, attributes)?;
    }
    Ok(())
}
