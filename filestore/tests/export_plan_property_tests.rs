// Property-based tests for export plan deduplication and login tracking

use filestore::export_plan::{link_key, ExportPlan, FoundFilesystem, FoundLink};
use filestore::models::{FilestoreConfig, FilestoreKind};
use filestore::resource::ResourceDetails;
use proptest::prelude::*;
use std::collections::HashSet;

fn tracked_plan(ids: &[i64]) -> ExportPlan {
    let mut plan = ExportPlan::new(1024);
    for id in ids {
        let config = FilestoreConfig::new(*id, FilestoreKind::Sftp, format!("host-{}", id));
        plan.add_found_filesystem(FoundFilesystem::from_config(&config));
    }
    plan
}

fn link_inputs() -> impl Strategy<Value = Vec<(i64, String)>> {
    prop::collection::vec((1i64..4, "/[a-c]{1,2}(/[a-c]{1,2})?"), 0..40)
}

/// Each (filestore, path) key is stored once, however often it is added
#[test]
fn property_found_links_deduplicated() {
    proptest!(|(inputs in link_inputs())| {
        let mut plan = tracked_plan(&[1, 2, 3]);
        for (id, path) in &inputs {
            plan.add_found_link(*id, path, FoundLink::file(*id, path.clone()));
        }

        let distinct: HashSet<String> = inputs.iter().map(|(id, p)| link_key(*id, p)).collect();
        prop_assert_eq!(plan.found_links().len(), distinct.len());

        let per_fs_total: usize = [1, 2, 3]
            .iter()
            .map(|id| plan.found_links_for(*id).len())
            .sum();
        prop_assert_eq!(per_fs_total, distinct.len());
    });
}

/// Adding the same link twice leaves one entry in the map and in the filestore's list
#[test]
fn property_double_add_is_noop() {
    proptest!(|(id in 1i64..100, path in "/[a-z]{1,10}")| {
        let mut plan = tracked_plan(&[id]);
        prop_assert!(plan.add_found_link(id, &path, FoundLink::file(id, path.clone())));
        prop_assert!(!plan.add_found_link(id, &path, FoundLink::file(id, path.clone())));
        prop_assert_eq!(plan.found_links().len(), 1);
        prop_assert_eq!(plan.found_links_for(id).len(), 1);
    });
}

/// Verified sizes are counted once per key
#[test]
fn property_verified_size_counts_each_key_once() {
    proptest!(|(entries in prop::collection::vec(("/[a-d]", 0u64..10_000), 0..30))| {
        let mut plan = tracked_plan(&[1]);
        let mut expected = std::collections::HashMap::new();
        for (path, size) in &entries {
            plan.add_checked_link(1, path, ResourceDetails::file(path, *size, None));
            expected.entry(path.clone()).or_insert(*size);
        }
        prop_assert_eq!(plan.checked_links().len(), expected.len());
        prop_assert_eq!(plan.verified_size_bytes(), expected.values().sum::<u64>());

        plan.clear_checked_links();
        prop_assert_eq!(plan.verified_size_bytes(), 0);
    });
}

/// The login count drops by one for each filestore that logs in
#[test]
fn property_login_count_tracks_logins() {
    proptest!(|(count in 1usize..12, logins in prop::collection::vec(0usize..12, 0..20))| {
        let ids: Vec<i64> = (1..=count as i64).collect();
        let mut plan = tracked_plan(&ids);
        prop_assert_eq!(plan.count_filesystems_requiring_login(), count);

        let mut logged_in = HashSet::new();
        for index in logins {
            let id = index as i64 + 1;
            let before = plan.count_filesystems_requiring_login();
            let tracked = plan.set_logged_as(id, "alice");
            prop_assert_eq!(tracked, index < count);
            let fresh = tracked && logged_in.insert(id);
            let expected = if fresh { before - 1 } else { before };
            prop_assert_eq!(plan.count_filesystems_requiring_login(), expected);
        }
        prop_assert_eq!(plan.count_filesystems_requiring_login(), count - logged_in.len());
    });
}
