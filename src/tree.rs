//! Arena-owned file tree of an open archive.
//!
//! Entries live in one `Vec`; every relationship is an index into it. Index
//! `i < item_count()` is archive item `i`, so engine indices and tree indices
//! agree. Directories that the archive implies but never lists (`a/` for an
//! item `a/b.txt`) are synthesized after the real items.

use std::collections::HashMap;
use std::ops::Index;
use std::path::PathBuf;

use crate::codec::ArchiveItem;
use crate::fs::FileAttributes;
use crate::timestamp::Timestamp;

/// Parent index of top-level entries.
pub const ROOT: u32 = u32::MAX;

/// Parent index of directory items that name the archive root itself
/// (`./` in tars built with `tar -C dir -cf x.tar .`).
///
/// Such entries keep their index but are never children of [`ROOT`], so
/// extraction neither creates nor restores them.
pub const DETACHED: u32 = u32::MAX - 1;

/// One node of the archive tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct FileEntry {
    /// Last path component.
    pub name: String,
    /// Index of the parent directory, [`ROOT`], or [`DETACHED`].
    pub parent: u32,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Attribute bitmask, if the archive stores one.
    pub attributes: Option<FileAttributes>,
    /// Creation time.
    pub creation_time: Option<Timestamp>,
    /// Last access time.
    pub access_time: Option<Timestamp>,
    /// Last modification time.
    pub modification_time: Option<Timestamp>,
    /// Whether the payload is encrypted.
    pub encrypted: bool,
    /// True for directories synthesized from item paths.
    pub implicit: bool,
}

impl FileEntry {
    fn directory(name: String, parent: u32) -> Self {
        Self {
            name,
            parent,
            is_dir: true,
            size: 0,
            attributes: None,
            creation_time: None,
            access_time: None,
            modification_time: None,
            encrypted: false,
            implicit: true,
        }
    }
}

/// The entries of an open archive with children range queries.
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    entries: Vec<FileEntry>,
    item_count: u32,
    /// All indices ordered by (parent, index); children are a contiguous run.
    by_parent: Vec<u32>,
}

impl FileTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the tree from engine items, in item order.
    pub fn from_items(items: Vec<ArchiveItem>) -> Self {
        let item_count = items.len() as u32;
        let components: Vec<Vec<String>> = items.iter().map(|item| sanitize(&item.path)).collect();

        // Real directories win over synthesized ones for the same path.
        let mut dirs: HashMap<String, u32> = HashMap::new();
        for (index, (item, parts)) in items.iter().zip(&components).enumerate() {
            if item.is_dir && !parts.is_empty() {
                dirs.entry(parts.join("/")).or_insert(index as u32);
            }
        }

        let mut entries: Vec<FileEntry> = Vec::with_capacity(items.len());
        let mut implicit = Vec::new();
        for (index, (item, parts)) in items.into_iter().zip(components).enumerate() {
            let parent = match parts.split_last() {
                Some((_, prefix)) => resolve_dir(prefix, item_count, &mut dirs, &mut implicit),
                None if item.is_dir => DETACHED,
                None => ROOT,
            };
            let name = match parts.last() {
                Some(name) => name.clone(),
                None if item.is_dir => String::new(),
                None => format!("[{index}]"),
            };
            entries.push(FileEntry {
                name,
                parent,
                is_dir: item.is_dir,
                size: if item.is_dir { 0 } else { item.size },
                attributes: item.attributes.map(FileAttributes::from_bits),
                creation_time: item.creation_time,
                access_time: item.access_time,
                modification_time: item.modification_time,
                encrypted: item.encrypted,
                implicit: false,
            });
        }
        entries.extend(implicit);

        let mut by_parent: Vec<u32> = (0..entries.len() as u32).collect();
        by_parent.sort_by_key(|&i| (entries[i as usize].parent, i));

        Self {
            entries,
            item_count,
            by_parent,
        }
    }

    /// Returns the number of entries, synthesized directories included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries backed by archive items.
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: u32) -> Option<&FileEntry> {
        self.entries.get(index as usize)
    }

    /// Returns true if `index` is a directory item naming the archive root.
    pub fn is_root_alias(&self, index: u32) -> bool {
        self.get(index).is_some_and(|entry| entry.parent == DETACHED)
    }

    /// Iterates over `(index, entry)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FileEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i as u32, e))
    }

    /// Returns the children of `index` ([`ROOT`] for top level), in archive order.
    pub fn children(&self, index: u32) -> &[u32] {
        let start = self
            .by_parent
            .partition_point(|&i| self.entries[i as usize].parent < index);
        let end = self
            .by_parent
            .partition_point(|&i| self.entries[i as usize].parent <= index);
        &self.by_parent[start..end]
    }

    /// Returns the path of `index` relative to the directory `base`.
    ///
    /// The walk stops at `base` or at the root, whichever comes first.
    pub fn relative_path(&self, index: u32, base: u32) -> PathBuf {
        let mut names = Vec::new();
        let mut current = index;
        while current != base && current != ROOT {
            let Some(entry) = self.get(current) else { break };
            names.push(entry.name.as_str());
            current = entry.parent;
        }
        names.iter().rev().collect()
    }

    /// Returns true if `ancestor` is `index` or one of its parents.
    pub fn is_within(&self, index: u32, ancestor: u32) -> bool {
        if ancestor == ROOT {
            return true;
        }
        let mut current = index;
        while current != ROOT {
            if current == ancestor {
                return true;
            }
            match self.get(current) {
                Some(entry) => current = entry.parent,
                None => return false,
            }
        }
        false
    }

    /// Looks up an entry by its slash-separated path.
    pub fn find(&self, path: &str) -> Option<u32> {
        let mut current = ROOT;
        for part in sanitize(path) {
            current = *self
                .children(current)
                .iter()
                .find(|&&i| self.entries[i as usize].name == part)?;
        }
        (current != ROOT).then_some(current)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_parent.clear();
        self.item_count = 0;
    }
}

impl Index<u32> for FileTree {
    type Output = FileEntry;

    fn index(&self, index: u32) -> &FileEntry {
        &self.entries[index as usize]
    }
}

fn resolve_dir(
    parts: &[String],
    item_count: u32,
    dirs: &mut HashMap<String, u32>,
    implicit: &mut Vec<FileEntry>,
) -> u32 {
    let Some((name, prefix)) = parts.split_last() else {
        return ROOT;
    };
    let key = parts.join("/");
    if let Some(&index) = dirs.get(&key) {
        return index;
    }
    let parent = resolve_dir(prefix, item_count, dirs, implicit);
    let index = item_count + implicit.len() as u32;
    implicit.push(FileEntry::directory(name.clone(), parent));
    dirs.insert(key, index);
    index
}

/// Splits an archive path into safe components.
///
/// Both separators are accepted. Empty, `.` and `..` components and drive
/// prefixes are dropped so no entry can escape the destination.
fn sanitize(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .filter(|part| !(part.len() == 2 && part.ends_with(':')))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(path: &str, is_dir: bool, size: u64) -> ArchiveItem {
        ArchiveItem {
            path: path.into(),
            is_dir,
            size,
            ..ArchiveItem::default()
        }
    }

    #[test]
    fn test_explicit_tree() {
        let tree = FileTree::from_items(vec![
            item("dir", true, 0),
            item("dir/a.txt", false, 10),
            item("b.txt", false, 0),
        ]);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children(ROOT), &[0, 2]);
        assert_eq!(tree.children(0), &[1]);
        assert!(tree.children(1).is_empty());
        assert_eq!(tree.relative_path(1, ROOT), PathBuf::from("dir/a.txt"));
        assert_eq!(tree.relative_path(1, 0), PathBuf::from("a.txt"));
        assert_eq!(tree.find("dir/a.txt"), Some(1));
    }

    #[test]
    fn test_implicit_directories() {
        let tree = FileTree::from_items(vec![item("a/b/c.txt", false, 3), item("a/d.txt", false, 1)]);
        assert_eq!(tree.item_count(), 2);
        assert_eq!(tree.len(), 4);
        let a = tree.find("a").unwrap();
        let b = tree.find("a/b").unwrap();
        assert!(tree[a].implicit && tree[a].is_dir);
        assert_eq!(tree[b].parent, a);
        assert_eq!(tree[0].parent, b);
        assert_eq!(tree.children(a), &[1, b]);
    }

    #[test]
    fn test_directory_listed_after_children() {
        let tree = FileTree::from_items(vec![item("dir/x", false, 1), item("dir/", true, 0)]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].parent, 1);
        assert!(!tree[1].implicit);
    }

    #[test]
    fn test_traversal_components_dropped() {
        let tree = FileTree::from_items(vec![item("../../etc/passwd", false, 1), item("C:\\x\\y", false, 1)]);
        assert_eq!(tree.relative_path(0, ROOT), PathBuf::from("etc/passwd"));
        assert_eq!(tree.relative_path(1, ROOT), PathBuf::from("x/y"));
    }

    #[test]
    fn test_dot_directory_is_detached() {
        let tree = FileTree::from_items(vec![item("./", true, 0), item("./a.txt", false, 1), item("./d/", true, 0)]);
        assert!(tree.is_root_alias(0));
        assert!(!tree.is_root_alias(1));
        assert_eq!(tree.children(ROOT), &[1, 2]);
        assert_eq!(tree.relative_path(1, ROOT), PathBuf::from("a.txt"));
        assert!(!tree.is_within(0, 2));
    }

    #[test]
    fn test_nameless_file_keeps_placeholder() {
        let tree = FileTree::from_items(vec![item("", false, 4)]);
        assert_eq!(tree[0].name, "[0]");
        assert_eq!(tree.children(ROOT), &[0]);
    }

    #[test]
    fn test_is_within() {
        let tree = FileTree::from_items(vec![item("d", true, 0), item("d/e", true, 0), item("d/e/f", false, 1)]);
        assert!(tree.is_within(2, 0));
        assert!(tree.is_within(2, ROOT));
        assert!(!tree.is_within(0, 1));
    }

    #[test]
    fn test_clear() {
        let mut tree = FileTree::from_items(vec![item("a", false, 1)]);
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.children(ROOT).is_empty());
    }

    proptest! {
        #[test]
        fn prop_every_entry_is_reachable(paths in prop::collection::vec("[a-c]{1,2}(/[a-c]{1,2}){0,3}", 1..20)) {
            let items = paths.iter().map(|p| item(p, false, 1)).collect();
            let tree = FileTree::from_items(items);
            for (index, entry) in tree.iter() {
                prop_assert!(tree.children(entry.parent).contains(&index));
                if entry.parent != ROOT {
                    prop_assert!(tree[entry.parent].is_dir);
                }
            }
            for (index, path) in paths.iter().enumerate() {
                prop_assert_eq!(tree.relative_path(index as u32, ROOT), PathBuf::from(path));
            }
        }
    }
}
