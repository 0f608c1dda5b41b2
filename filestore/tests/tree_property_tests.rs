// Property-based tests for tree ordering and hidden entry filtering

use chrono::{DateTime, TimeZone, Utc};
use filestore::errors::FilestoreError;
use filestore::paths::PathStyle;
use filestore::tree::{RemoteEntry, TreeBuilder, TreeOrder, TreeSource};
use proptest::prelude::*;

struct FlatFolder {
    children: Vec<RemoteEntry>,
}

impl TreeSource for FlatFolder {
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError> {
        Ok(RemoteEntry {
            name: "root".to_string(),
            path: path.to_string(),
            is_folder: true,
            size: 0,
            modified: None,
        })
    }

    fn list_children(
        &mut self,
        _folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
        Ok(self.children.iter().cloned().map(Ok).collect())
    }
}

fn entry(name: String, modified: Option<DateTime<Utc>>) -> RemoteEntry {
    RemoteEntry {
        path: format!("\\share\\{}", name),
        name,
        is_folder: false,
        size: 1,
        modified,
    }
}

fn entries() -> impl Strategy<Value = Vec<RemoteEntry>> {
    prop::collection::vec(
        (
            "\\.?[A-Za-z]{1,6}",
            prop::option::of(0i64..2_000_000_000),
        ),
        0..25,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(name, secs)| entry(name, secs.and_then(|s| Utc.timestamp_opt(s, 0).single())))
            .collect()
    })
}

/// Hidden entries never appear; every visible entry appears once
#[test]
fn property_hidden_entries_excluded() {
    proptest!(|(children in entries())| {
        let visible = children.iter().filter(|e| !e.name.starts_with('.')).count();
        let mut source = FlatFolder { children };
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build(&mut source, "\\share")
            .unwrap();
        prop_assert_eq!(tree.children.len(), visible);
        prop_assert!(tree.children.iter().all(|c| !c.name.starts_with('.')));
        prop_assert!(tree.children.iter().all(|c| !c.node_path.contains('\\')));
    });
}

/// Name order is case-insensitive and non-decreasing
#[test]
fn property_by_name_ordering() {
    proptest!(|(children in entries())| {
        let mut source = FlatFolder { children };
        let tree = TreeBuilder::new(TreeOrder::ByName, PathStyle::Backslash)
            .build(&mut source, "\\share")
            .unwrap();
        for pair in tree.children.windows(2) {
            prop_assert!(pair[0].name.to_lowercase() <= pair[1].name.to_lowercase());
        }
    });
}

/// Date order is newest first, with undated entries last
#[test]
fn property_by_date_ordering() {
    proptest!(|(children in entries())| {
        let mut source = FlatFolder { children };
        let tree = TreeBuilder::new(TreeOrder::from_token("bydate"), PathStyle::Backslash)
            .build(&mut source, "\\share")
            .unwrap();
        for pair in tree.children.windows(2) {
            match (pair[0].modified, pair[1].modified) {
                (Some(a), Some(b)) => prop_assert!(a >= b),
                (None, Some(_)) => prop_assert!(false, "undated entry before a dated one"),
                _ => {}
            }
        }
    });
}
