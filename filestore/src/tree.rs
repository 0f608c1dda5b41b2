// Ordered in-memory directory trees over backends without a tree primitive

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::errors::FilestoreError;
use crate::paths::{self, PathStyle, UserRootFolder};

/// Fixed ordering of a tree's children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeOrder {
    /// Case-insensitive by name
    #[default]
    ByName,
    /// Newest first
    ByDate,
}

impl TreeOrder {
    /// `"bydate"` selects date ordering; every other token selects name ordering
    pub fn from_token(token: &str) -> Self {
        if token.trim().eq_ignore_ascii_case("bydate") {
            TreeOrder::ByDate
        } else {
            TreeOrder::ByName
        }
    }

    pub fn compare(&self, a: &TreeNode, b: &TreeNode) -> Ordering {
        let by_name = || {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        };
        match self {
            TreeOrder::ByName => by_name(),
            TreeOrder::ByDate => match (a.modified, b.modified) {
                (Some(x), Some(y)) => y.cmp(&x).then_with(by_name),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => by_name(),
            },
        }
    }
}

/// One file or folder in a built tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Absolute path, canonical form
    pub node_path: String,
    pub logic_path: String,
    pub is_folder: bool,
    pub children: Vec<TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Display size, e.g. `1.5 KB`; empty for folders
    pub file_size: String,
    /// Display date as `yyyy-MM-dd`; empty when unknown
    pub file_date: String,
}

impl TreeNode {
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A directory entry as reported by a backend, path in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Listing primitives a backend exposes to the tree builder
pub trait TreeSource {
    /// Describe the entry the tree starts from
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError>;

    /// Immediate children of `folder`; a failure on one entry is reported in place
    fn list_children(
        &mut self,
        folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError>;
}

/// Builds exactly one level of an ordered tree per call
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'a> {
    order: TreeOrder,
    style: PathStyle,
    root_folder: Option<&'a UserRootFolder>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(order: TreeOrder, style: PathStyle) -> Self {
        Self {
            order,
            style,
            root_folder: None,
        }
    }

    pub fn with_root_folder(mut self, root_folder: Option<&'a UserRootFolder>) -> Self {
        self.root_folder = root_folder;
        self
    }

    pub fn order(&self) -> TreeOrder {
        self.order
    }

    /// Resolve `path` to a root node and attach its ordered, non-hidden children
    pub fn build<S: TreeSource + ?Sized>(
        &self,
        source: &mut S,
        path: &str,
    ) -> Result<TreeNode, FilestoreError> {
        let root_entry = source.resolve_root(path)?;
        let mut root = self.node_for(&root_entry);
        if !root_entry.is_folder {
            return Ok(root);
        }

        for child in source.list_children(&root_entry)? {
            match child {
                Ok(entry) if paths::is_hidden(&entry.name) => {
                    debug!(name = %entry.name, "Skipping hidden entry");
                }
                Ok(entry) => root.children.push(self.node_for(&entry)),
                Err(e) => {
                    warn!(error = %e, parent = %root.node_path, "Skipping unreadable entry");
                }
            }
        }
        self.sort(&mut root.children);

        debug!(
            path = %root.node_path,
            children = root.children.len(),
            order = ?self.order,
            "Tree level built"
        );
        Ok(root)
    }

    /// Build a tree node from a native entry
    pub fn node_for(&self, entry: &RemoteEntry) -> TreeNode {
        let node_path = paths::to_canonical_separator(self.style, &entry.path);
        let logic_path = paths::compute_logic_path(&node_path, self.root_folder);
        let (size_bytes, file_size) = if entry.is_folder {
            (None, String::new())
        } else {
            (Some(entry.size), format_size(entry.size))
        };
        TreeNode {
            name: entry.name.clone(),
            node_path,
            logic_path,
            is_folder: entry.is_folder,
            children: Vec::new(),
            size_bytes,
            modified: entry.modified,
            file_size,
            file_date: entry
                .modified
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }

    pub fn sort(&self, children: &mut [TreeNode]) {
        children.sort_by(|a, b| self.order.compare(a, b));
    }

    /// Descend through every folder below `path`.
    /// For backends whose listing is cheap enough to walk in one call.
    pub fn build_recursive<S: TreeSource + ?Sized>(
        &self,
        source: &mut S,
        path: &str,
    ) -> Result<TreeNode, FilestoreError> {
        let root_entry = source.resolve_root(path)?;
        let mut root = self.node_for(&root_entry);
        if root_entry.is_folder {
            self.descend(source, &root_entry, &mut root);
        }
        Ok(root)
    }

    fn descend<S: TreeSource + ?Sized>(
        &self,
        source: &mut S,
        entry: &RemoteEntry,
        node: &mut TreeNode,
    ) {
        let children = match source.list_children(entry) {
            Ok(children) => children,
            Err(e) => {
                warn!(error = %e, path = %node.node_path, "Cannot list folder, leaving it empty");
                return;
            }
        };
        for child in children {
            match child {
                Ok(child_entry) if paths::is_hidden(&child_entry.name) => {}
                Ok(child_entry) => {
                    let mut child_node = self.node_for(&child_entry);
                    if child_entry.is_folder {
                        self.descend(source, &child_entry, &mut child_node);
                    }
                    node.children.push(child_node);
                }
                Err(e) => {
                    warn!(error = %e, parent = %node.node_path, "Skipping unreadable entry");
                }
            }
        }
        self.sort(&mut node.children);
    }
}

/// Human readable size with binary units
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    /// In-memory backend keyed by native folder path
    struct FakeSource {
        root: RemoteEntry,
        listings: HashMap<String, Vec<Result<RemoteEntry, FilestoreError>>>,
    }

    impl TreeSource for FakeSource {
        fn resolve_root(&mut self, _path: &str) -> Result<RemoteEntry, FilestoreError> {
            Ok(self.root.clone())
        }

        fn list_children(
            &mut self,
            folder: &RemoteEntry,
        ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
            self.listings
                .remove(&folder.path)
                .ok_or_else(|| FilestoreError::connection(&folder.path, "not listed"))
        }
    }

    fn entry(name: &str, parent: &str, folder: bool, day: Option<u32>) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            path: format!("{}\\{}", parent, name),
            is_folder: folder,
            size: 2048,
            modified: day.map(|d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()),
        }
    }

    fn source(children: Vec<Result<RemoteEntry, FilestoreError>>) -> FakeSource {
        let root = RemoteEntry {
            name: "docs".to_string(),
            path: "sub\\docs".to_string(),
            is_folder: true,
            size: 0,
            modified: None,
        };
        let mut listings = HashMap::new();
        listings.insert(root.path.clone(), children);
        FakeSource { root, listings }
    }

    #[test]
    fn test_by_name_is_case_insensitive() {
        let mut src = source(vec![
            Ok(entry("b", "sub\\docs", false, None)),
            Ok(entry("A", "sub\\docs", false, None)),
            Ok(entry("c", "sub\\docs", false, None)),
        ]);
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.child_names(), vec!["A", "b", "c"]);
        assert_eq!(tree.node_path, "sub/docs");
        assert_eq!(tree.children[0].node_path, "sub/docs/A");
    }

    #[test]
    fn test_by_date_is_descending() {
        let mut src = source(vec![
            Ok(entry("old", "sub\\docs", false, Some(1))),
            Ok(entry("new", "sub\\docs", false, Some(20))),
            Ok(entry("mid", "sub\\docs", false, Some(10))),
        ]);
        let tree = TreeBuilder::new(TreeOrder::from_token("bydate"), PathStyle::Backslash)
            .build(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.child_names(), vec!["new", "mid", "old"]);
        assert_eq!(tree.children[0].file_date, "2024-03-20");
    }

    #[test]
    fn test_same_day_entries_compare_on_time() {
        let mut early = entry("early", "sub\\docs", false, Some(5));
        early.modified = Some(Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap());
        let late = entry("late", "sub\\docs", false, Some(5));
        let mut src = source(vec![Ok(early), Ok(late)]);
        let tree = TreeBuilder::new(TreeOrder::ByDate, PathStyle::Backslash)
            .build(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.child_names(), vec!["late", "early"]);
    }

    #[test]
    fn test_hidden_and_failing_entries_are_skipped() {
        let mut src = source(vec![
            Ok(entry(".DS_Store", "sub\\docs", false, None)),
            Err(FilestoreError::connection("sub/docs/locked", "access denied")),
            Ok(entry("plate.csv", "sub\\docs", false, None)),
        ]);
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.child_names(), vec!["plate.csv"]);
    }

    #[test]
    fn test_build_does_not_recurse() {
        let mut src = source(vec![Ok(entry("nested", "sub\\docs", true, None))]);
        src.listings.insert(
            "sub\\docs\\nested".to_string(),
            vec![Ok(entry("deep.txt", "sub\\docs\\nested", false, None))],
        );
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build(&mut src, "sub/docs")
            .unwrap();
        assert!(tree.children[0].is_folder);
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn test_build_recursive_descends() {
        let mut src = source(vec![Ok(entry("nested", "sub\\docs", true, None))]);
        src.listings.insert(
            "sub\\docs\\nested".to_string(),
            vec![Ok(entry("deep.txt", "sub\\docs\\nested", false, None))],
        );
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build_recursive(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.children[0].child_names(), vec!["deep.txt"]);
    }

    #[test]
    fn test_logic_path_uses_root_folder() {
        let root = UserRootFolder::new(4, "sub");
        let mut src = source(vec![Ok(entry("a.txt", "sub\\docs", false, None))]);
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .with_root_folder(Some(&root))
            .build(&mut src, "sub/docs")
            .unwrap();
        assert_eq!(tree.logic_path, "4:/docs");
        assert_eq!(tree.children[0].logic_path, "4:/docs/a.txt");
        assert_eq!(tree.children[0].file_size, "2.0 KB");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
