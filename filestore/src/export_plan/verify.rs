// Verification of discovered links against a live client

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{ExportPlan, LinkKind};
use crate::client::RemoteClient;
use crate::models::Target;
use crate::telemetry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub verified: usize,
    pub failed: usize,
    /// Links checked by an earlier pass
    pub skipped: usize,
}

/// Query every unchecked link of `filestore_id` and record the outcome in the plan
#[instrument(skip(plan, client), fields(plan_id = %plan.id(), kind = %client.kind()))]
pub fn check_found_links(
    plan: &mut ExportPlan,
    filestore_id: i64,
    client: &mut dyn RemoteClient,
) -> VerificationSummary {
    let mut summary = VerificationSummary::default();

    for link in plan.found_links_for(filestore_id) {
        if plan.is_already_checked(filestore_id, &link.path) {
            summary.skipped += 1;
            continue;
        }
        let target = Target::with_id(link.path.as_str(), filestore_id);
        let outcome = match link.kind {
            LinkKind::File => client
                .query_for_file(&target)
                .ok_or_else(|| format!("File {} could not be read", link.path)),
            LinkKind::Folder => client
                .query_for_folder(&target)
                .map_err(|e| e.to_string()),
        };

        telemetry::record_link_checked(outcome.is_ok());
        match outcome {
            Ok(details) => {
                plan.add_checked_link(filestore_id, &link.path, details);
                summary.verified += 1;
            }
            Err(message) => {
                warn!(path = %link.path, error = %message, "Link verification failed");
                plan.add_checked_link_error(filestore_id, &link.path, message);
                summary.failed += 1;
            }
        }
    }

    info!(
        filestore_id,
        verified = summary.verified,
        failed = summary.failed,
        skipped = summary.skipped,
        "Found links checked"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FilestoreError;
    use crate::export_plan::{FoundFilesystem, FoundLink};
    use crate::models::{FilestoreConfig, FilestoreKind};
    use crate::paths::UserRootFolder;
    use crate::resource::ResourceDetails;
    use crate::tree::TreeNode;

    /// Knows one file and one folder
    struct KnownPaths {
        queries: usize,
    }

    impl RemoteClient for KnownPaths {
        fn kind(&self) -> FilestoreKind {
            FilestoreKind::Sftp
        }

        fn username(&self) -> &str {
            "alice"
        }

        fn is_logged_in(&self) -> bool {
            true
        }

        fn try_connect_and_read_target(&mut self, _path: &str) -> Result<(), FilestoreError> {
            Ok(())
        }

        fn create_file_tree(
            &mut self,
            path: &str,
            _order_token: &str,
            _root_folder: Option<&UserRootFolder>,
        ) -> Result<TreeNode, FilestoreError> {
            Err(FilestoreError::connection(path, "not used"))
        }

        fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails> {
            self.queries += 1;
            (target.path == "/data/a.txt").then(|| ResourceDetails::file(&target.path, 100, None))
        }

        fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError> {
            self.queries += 1;
            if target.path == "/data/runs" {
                Ok(ResourceDetails::folder(&target.path, vec![]))
            } else {
                Err(FilestoreError::connection(&target.path, "No such folder"))
            }
        }
    }

    #[test]
    fn test_records_outcomes_and_skips_checked() {
        let mut plan = ExportPlan::new(100);
        let config = FilestoreConfig::new(1, FilestoreKind::Sftp, "files.lab.org");
        plan.add_found_filesystem(FoundFilesystem::from_config(&config));
        for link in [
            FoundLink::file(1, "/data/a.txt"),
            FoundLink::file(1, "/data/missing.txt"),
            FoundLink::folder(1, "/data/runs"),
            FoundLink::folder(1, "/data/gone"),
        ] {
            let path = link.path.clone();
            plan.add_found_link(1, &path, link);
        }

        let mut client = KnownPaths { queries: 0 };
        let summary = check_found_links(&mut plan, 1, &mut client);
        assert_eq!(
            summary,
            VerificationSummary {
                verified: 2,
                failed: 2,
                skipped: 0
            }
        );
        assert_eq!(plan.verified_size_bytes(), 100);
        assert!(plan.link_errors()["1_/data/gone"].contains("/data/gone"));

        let again = check_found_links(&mut plan, 1, &mut client);
        assert_eq!(again.skipped, 4);
        assert_eq!(client.queries, 4);
    }

    #[test]
    fn test_checks_links_found_before_filesystem_tracked() {
        let mut plan = ExportPlan::new(100);
        plan.add_found_link(1, "/data/a.txt", FoundLink::file(1, "/data/a.txt"));
        let config = FilestoreConfig::new(1, FilestoreKind::Sftp, "files.lab.org");
        plan.add_found_filesystem(FoundFilesystem::from_config(&config));

        let mut client = KnownPaths { queries: 0 };
        let summary = check_found_links(&mut plan, 1, &mut client);
        assert_eq!(summary.verified, 1);
        assert_eq!(client.queries, 1);
        assert_eq!(plan.filesystem(1).unwrap().checked_links, vec!["/data/a.txt"]);
        assert_eq!(plan.verified_size_bytes(), 100);
    }
}
