// Export plan aggregation
// Collects links found across filestores for one bulk export, deduplicated by
// (filestore id, absolute path). One plan belongs to one export request.

mod verify;

pub use verify::{check_found_links, VerificationSummary};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::models::{FilestoreConfig, FilestoreKind};
use crate::resource::ResourceDetails;

/// Map key shared by the found, checked and error maps
pub fn link_key(filestore_id: i64, path: &str) -> String {
    format!("{}_{}", filestore_id, path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    File,
    Folder,
}

/// A link to a remote resource discovered in exported content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundLink {
    pub filestore_id: i64,
    /// Absolute path on the filestore
    pub path: String,
    pub kind: LinkKind,
    /// Text the link was shown with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
}

impl FoundLink {
    pub fn file(filestore_id: i64, path: impl Into<String>) -> Self {
        Self {
            filestore_id,
            path: path.into(),
            kind: LinkKind::File,
            link_text: None,
        }
    }

    pub fn folder(filestore_id: i64, path: impl Into<String>) -> Self {
        Self {
            filestore_id,
            path: path.into(),
            kind: LinkKind::Folder,
            link_text: None,
        }
    }

    pub fn with_link_text(mut self, text: impl Into<String>) -> Self {
        self.link_text = Some(text.into());
        self
    }

    pub fn key(&self) -> String {
        link_key(self.filestore_id, &self.path)
    }
}

/// A filestore touched by the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundFilesystem {
    pub id: i64,
    pub name: String,
    pub kind: FilestoreKind,
    pub address: String,
    pub found_links: Vec<FoundLink>,
    /// Paths recorded as verified or failed
    pub checked_links: Vec<String>,
    pub logged_as: Option<String>,
}

impl FoundFilesystem {
    pub fn from_config(config: &FilestoreConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            kind: config.kind,
            address: config.address.clone(),
            found_links: Vec::new(),
            checked_links: Vec::new(),
            logged_as: None,
        }
    }

    pub fn requires_login(&self) -> bool {
        self.logged_as.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPlan {
    id: Uuid,
    filesystems: Vec<FoundFilesystem>,
    found_links: BTreeMap<String, FoundLink>,
    checked_links: BTreeMap<String, ResourceDetails>,
    link_errors: BTreeMap<String, String>,
    max_archive_size_mb: u64,
    currently_allowed_archive_size_mb: u64,
    verified_size_bytes: u64,
}

impl ExportPlan {
    pub fn new(max_archive_size_mb: u64) -> Self {
        let plan = Self {
            id: Uuid::new_v4(),
            filesystems: Vec::new(),
            found_links: BTreeMap::new(),
            checked_links: BTreeMap::new(),
            link_errors: BTreeMap::new(),
            max_archive_size_mb,
            currently_allowed_archive_size_mb: max_archive_size_mb,
            verified_size_bytes: 0,
        };
        debug!(plan_id = %plan.id, max_archive_size_mb, "Export plan created");
        plan
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.max_archive_size_mb)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filesystems(&self) -> &[FoundFilesystem] {
        &self.filesystems
    }

    pub fn filesystem(&self, filestore_id: i64) -> Option<&FoundFilesystem> {
        self.filesystems.iter().find(|fs| fs.id == filestore_id)
    }

    fn filesystem_mut(&mut self, filestore_id: i64) -> Option<&mut FoundFilesystem> {
        self.filesystems.iter_mut().find(|fs| fs.id == filestore_id)
    }

    /// Track a filestore; returns false when one with the same id is already tracked
    ///
    /// Links discovered before the filestore was tracked are attached to it here,
    /// so the outcome does not depend on the order of discovery passes.
    pub fn add_found_filesystem(&mut self, mut filesystem: FoundFilesystem) -> bool {
        if self.filesystem(filesystem.id).is_some() {
            return false;
        }
        let pending: Vec<FoundLink> = self
            .found_links
            .values()
            .filter(|link| link.filestore_id == filesystem.id)
            .filter(|link| !filesystem.found_links.iter().any(|l| l.path == link.path))
            .cloned()
            .collect();
        debug!(
            plan_id = %self.id,
            filestore_id = filesystem.id,
            attached = pending.len(),
            "Filesystem tracked"
        );
        filesystem.found_links.extend(pending);
        self.filesystems.push(filesystem);
        true
    }

    /// Record a discovered link once per key
    ///
    /// The key comes from `filestore_id` and `path`; the stored link always carries them.
    pub fn add_found_link(&mut self, filestore_id: i64, path: &str, mut link: FoundLink) -> bool {
        debug_assert_eq!(
            (link.filestore_id, link.path.as_str()),
            (filestore_id, path),
            "link identity differs from its key"
        );
        let key = link_key(filestore_id, path);
        if self.found_links.contains_key(&key) {
            return false;
        }
        link.filestore_id = filestore_id;
        link.path = path.to_string();
        self.found_links.insert(key, link.clone());
        match self.filesystem_mut(filestore_id) {
            Some(fs) => fs.found_links.push(link),
            None => debug!(filestore_id, path = %path, "Link found for an untracked filesystem"),
        }
        true
    }

    /// Record verified details once per key
    pub fn add_checked_link(
        &mut self,
        filestore_id: i64,
        path: &str,
        details: ResourceDetails,
    ) -> bool {
        let key = link_key(filestore_id, path);
        if self.checked_links.contains_key(&key) {
            return false;
        }
        self.verified_size_bytes = self.verified_size_bytes.saturating_add(details.total_size());
        self.checked_links.insert(key, details);
        self.mark_checked(filestore_id, path);
        true
    }

    /// Record a verification failure once per key
    pub fn add_checked_link_error(
        &mut self,
        filestore_id: i64,
        path: &str,
        message: impl Into<String>,
    ) -> bool {
        let key = link_key(filestore_id, path);
        if self.link_errors.contains_key(&key) {
            return false;
        }
        self.link_errors.insert(key, message.into());
        self.mark_checked(filestore_id, path);
        true
    }

    fn mark_checked(&mut self, filestore_id: i64, path: &str) {
        if let Some(fs) = self.filesystem_mut(filestore_id) {
            if !fs.checked_links.iter().any(|p| p == path) {
                fs.checked_links.push(path.to_string());
            }
        }
    }

    /// Verified or failed already
    pub fn is_already_checked(&self, filestore_id: i64, path: &str) -> bool {
        let key = link_key(filestore_id, path);
        self.checked_links.contains_key(&key) || self.link_errors.contains_key(&key)
    }

    /// Forget verification results, keeping discovered links
    pub fn clear_checked_links(&mut self) {
        self.checked_links.clear();
        self.link_errors.clear();
        self.verified_size_bytes = 0;
        for fs in &mut self.filesystems {
            fs.checked_links.clear();
        }
        info!(plan_id = %self.id, found = self.found_links.len(), "Checked links cleared");
    }

    pub fn count_filesystems_requiring_login(&self) -> usize {
        self.filesystems.iter().filter(|fs| fs.requires_login()).count()
    }

    /// Record the username a tracked filestore is logged in as
    pub fn set_logged_as(&mut self, filestore_id: i64, username: impl Into<String>) -> bool {
        match self.filesystem_mut(filestore_id) {
            Some(fs) => {
                fs.logged_as = Some(username.into());
                true
            }
            None => false,
        }
    }

    /// Discovered links of one filestore, in discovery order
    pub fn found_links_for(&self, filestore_id: i64) -> Vec<FoundLink> {
        match self.filesystem(filestore_id) {
            Some(fs) => fs.found_links.clone(),
            None => self
                .found_links
                .values()
                .filter(|link| link.filestore_id == filestore_id)
                .cloned()
                .collect(),
        }
    }

    pub fn found_links(&self) -> &BTreeMap<String, FoundLink> {
        &self.found_links
    }

    pub fn checked_links(&self) -> &BTreeMap<String, ResourceDetails> {
        &self.checked_links
    }

    pub fn link_errors(&self) -> &BTreeMap<String, String> {
        &self.link_errors
    }

    pub fn max_archive_size_mb(&self) -> u64 {
        self.max_archive_size_mb
    }

    pub fn set_max_archive_size_mb(&mut self, size_mb: u64) {
        self.max_archive_size_mb = size_mb;
    }

    pub fn currently_allowed_archive_size_mb(&self) -> u64 {
        self.currently_allowed_archive_size_mb
    }

    pub fn set_currently_allowed_archive_size_mb(&mut self, size_mb: u64) {
        self.currently_allowed_archive_size_mb = size_mb;
    }

    /// Total bytes of verified resources
    pub fn verified_size_bytes(&self) -> u64 {
        self.verified_size_bytes
    }
}
