//! Directory skeleton pass.

use std::path::Path;

use super::callbacks::JobContext;
use crate::fs;
use crate::tree::ROOT;
use crate::Result;

/// Creates the destination and every selected directory, returning the
/// selected files as an ascending, duplicate-free index list.
pub(super) fn prepare(ctx: &JobContext<'_, '_>, roots: &[u32]) -> Result<Vec<u32>> {
    ensure_dir(ctx, ctx.dest())?;

    let mut files = Vec::new();
    for &root in roots {
        let parent = ctx.tree()[root].parent;
        if parent != ROOT {
            // Roots below the source directory need their ancestors.
            if let Some(dir) = ctx.dest_path(root).parent() {
                ensure_dir(ctx, dir)?;
            }
        }
        walk(ctx, root, &mut files)?;
    }
    files.sort_unstable();
    files.dedup();
    Ok(files)
}

fn ensure_dir(ctx: &JobContext<'_, '_>, path: &Path) -> Result<()> {
    ctx.retry(path, || fs::create_dir_all(path))?;
    Ok(())
}

fn walk(ctx: &JobContext<'_, '_>, index: u32, files: &mut Vec<u32>) -> Result<()> {
    ctx.check()?;
    let tree = ctx.tree();
    if !tree[index].is_dir {
        files.push(index);
        return Ok(());
    }
    let path = ctx.dest_path(index);
    ctx.monitor().start_file(&path, 0);
    if ctx.retry(&path, || fs::create_dir(&path))?.is_some() {
        ctx.mark_materialized(index);
    }
    for &child in tree.children(index) {
        walk(ctx, child, files)?;
    }
    Ok(())
}
