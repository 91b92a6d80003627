//! File selection using glob patterns.

use arcx::{FileTree, ROOT};
use glob::Pattern;

/// Error type for file selector operations
#[derive(Debug)]
pub struct PatternError(pub String);

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid glob pattern: {}", self.0)
    }
}

impl std::error::Error for PatternError {}

/// File selector based on include and exclude glob patterns
pub struct FileSelector {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileSelector {
    /// Creates a new file selector from pattern strings
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        let include = include
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| PatternError(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let exclude = exclude
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| PatternError(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { include, exclude })
    }

    /// Returns true if no pattern was given.
    pub fn selects_all(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Checks if a path matches the selection criteria
    pub fn matches(&self, path: &str) -> bool {
        // If include patterns specified, at least one must match
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(path)) {
            return false;
        }

        // None of the exclude patterns should match
        !self.exclude.iter().any(|p| p.matches(path))
    }

    /// Returns the extraction roots for `tree`, or `None` to take everything.
    ///
    /// A matching directory brings its whole subtree, so entries below an
    /// already selected directory are not listed again. Excluded entries
    /// inside a selected directory are therefore still extracted.
    pub fn roots(&self, tree: &FileTree) -> Option<Vec<u32>> {
        if self.selects_all() {
            return None;
        }
        let mut roots = Vec::new();
        let mut stack: Vec<u32> = tree.children(ROOT).iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            if self.matches(&tree_path(tree, index)) {
                roots.push(index);
                continue;
            }
            stack.extend(tree.children(index).iter().rev());
        }
        Some(roots)
    }
}

/// Slash-separated path of `index` from the root.
pub fn tree_path(tree: &FileTree, index: u32) -> String {
    let path = tree.relative_path(index, ROOT);
    let parts: Vec<_> = path.iter().map(|part| part.to_string_lossy()).collect();
    parts.join("/")
}
