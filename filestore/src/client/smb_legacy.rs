// Legacy SMB1 client
// One NTLM principal for the client lifetime; every access resolves its own
// smb:// URL under the configured base.

use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::smb_engine::{SmbAddress, SmbCredentials, SmbUrlResolver};
use super::{RemoteClient, RemoteDownload};
use crate::config::TimeoutConfig;
use crate::errors::FilestoreError;
use crate::models::{FilestoreKind, Target};
use crate::paths::{self, PathStyle, UserRootFolder};
use crate::process::{self, SMB_CONNECT_TIMEOUT_MS, SMB_RESPONSE_TIMEOUT_MS, SMB_SO_TIMEOUT_MS};
use crate::resource::{FileDetails, ResourceDetails};
use crate::telemetry;
use crate::tree::{RemoteEntry, TreeBuilder, TreeNode, TreeOrder, TreeSource};

const KIND: FilestoreKind = FilestoreKind::SmbLegacy;

/// Socket timeouts for SMB1 access, fixed at client construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySmbTimeouts {
    pub response: Duration,
    pub socket: Duration,
    pub connect: Duration,
}

impl LegacySmbTimeouts {
    /// Process properties override the configured timeouts
    pub fn from_process(defaults: &TimeoutConfig) -> Self {
        Self {
            response: process::duration_property(SMB_RESPONSE_TIMEOUT_MS, defaults.response()),
            socket: process::duration_property(SMB_SO_TIMEOUT_MS, defaults.read()),
            connect: process::duration_property(SMB_CONNECT_TIMEOUT_MS, defaults.connect()),
        }
    }
}

impl Default for LegacySmbTimeouts {
    fn default() -> Self {
        Self::from_process(&TimeoutConfig::default())
    }
}

pub struct LegacySmbClient {
    resolver: Box<dyn SmbUrlResolver>,
    filestore_id: i64,
    base_url: String,
    principal: SmbCredentials,
    timeouts: LegacySmbTimeouts,
}

impl LegacySmbClient {
    pub fn new(
        resolver: Box<dyn SmbUrlResolver>,
        filestore_id: i64,
        address: &str,
        principal: SmbCredentials,
        timeouts: LegacySmbTimeouts,
    ) -> Result<Self, FilestoreError> {
        let parsed = SmbAddress::parse(address)?;
        let share = parsed.share.as_deref().ok_or_else(|| {
            FilestoreError::configuration(format!("SMB address '{}' has no share", address))
        })?;
        let mut base_url = parsed.share_url(share);
        if !parsed.sub_path.is_empty() {
            base_url = paths::join_native(&base_url, &parsed.sub_path);
            base_url.push('/');
        }
        Ok(Self {
            resolver,
            filestore_id,
            base_url,
            principal,
            timeouts,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `smb://` URL of a canonical path below the base
    pub fn url_for(&self, path: &str) -> String {
        let relative = paths::strip_leading_separator(path);
        if relative.is_empty() {
            return self.base_url.clone();
        }
        paths::join_native(&self.base_url, relative)
    }

    /// Directory URLs end with a separator
    fn directory_url(&self, path: &str) -> String {
        let mut url = self.url_for(path);
        if !url.ends_with('/') {
            url.push('/');
        }
        url
    }

    fn stat(&mut self, path: &str) -> Result<(String, super::SmbEntry), FilestoreError> {
        let absolute = absolute_path(path);
        let url = self.url_for(&absolute);
        let entry = self
            .resolver
            .stat(&url, &self.principal, &self.timeouts)
            .map_err(|e| e.into_filestore(KIND, &absolute))?;
        Ok((absolute, entry))
    }
}

/// Canonical absolute form used for every path this client hands out
fn absolute_path(path: &str) -> String {
    let canonical = paths::to_canonical_separator(PathStyle::Backslash, path);
    let relative = paths::strip_leading_separator(&canonical).trim_end_matches('/');
    format!("/{}", relative)
}

impl TreeSource for LegacySmbClient {
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError> {
        let absolute = absolute_path(path);
        if absolute == "/" {
            return Ok(RemoteEntry {
                name: String::new(),
                path: absolute,
                is_folder: true,
                size: 0,
                modified: None,
            });
        }
        let (absolute, entry) = self.stat(&absolute)?;
        Ok(RemoteEntry {
            name: entry.name,
            path: absolute,
            is_folder: entry.is_directory,
            size: entry.size,
            modified: entry.modified,
        })
    }

    fn list_children(
        &mut self,
        folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
        let url = self.directory_url(&folder.path);
        let entries = self
            .resolver
            .list(&url, &self.principal, &self.timeouts)
            .map_err(|e| e.into_filestore(KIND, &folder.path))?;

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                Ok(entry) => Ok(RemoteEntry {
                    path: paths::join_canonical(&folder.path, &entry.name),
                    name: entry.name,
                    is_folder: entry.is_directory,
                    size: entry.size,
                    modified: entry.modified,
                }),
                Err(e) => Err(e.into_filestore(KIND, &folder.path)),
            })
            .collect())
    }
}

impl RemoteClient for LegacySmbClient {
    fn kind(&self) -> FilestoreKind {
        KIND
    }

    fn username(&self) -> &str {
        &self.principal.username
    }

    fn is_logged_in(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    fn try_connect_and_read_target(&mut self, path: &str) -> Result<(), FilestoreError> {
        let url = self.directory_url(path);
        let result = self
            .resolver
            .list(&url, &self.principal, &self.timeouts)
            .map(|entries| debug!(entries = entries.len(), "Target listed"))
            .map_err(|e| e.into_filestore(KIND, path));
        telemetry::record_remote_call(KIND, "connect", &result);
        if let Err(e) = &result {
            warn!(error = %e, path = %path, "SMB reachability check failed");
        }
        result
    }

    #[instrument(skip(self, root_folder), fields(base_url = %self.base_url))]
    fn create_file_tree(
        &mut self,
        path: &str,
        order_token: &str,
        root_folder: Option<&UserRootFolder>,
    ) -> Result<TreeNode, FilestoreError> {
        let builder = TreeBuilder::new(TreeOrder::from_token(order_token), PathStyle::Slash)
            .with_root_folder(root_folder);
        let result = builder.build(self, path);
        telemetry::record_remote_call(KIND, "tree", &result);
        if let Ok(tree) = &result {
            telemetry::record_tree_children(KIND, tree.children.len());
        }
        result
    }

    fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails> {
        let result = self.stat(&target.path);
        telemetry::record_remote_call(KIND, "stat", &result);
        match result {
            Ok((_, entry)) if entry.is_directory => None,
            Ok((absolute, entry)) => Some(
                ResourceDetails::file(&absolute, entry.size, entry.modified)
                    .with_filestore_id(self.filestore_id),
            ),
            Err(e) => {
                warn!(error = %e, path = %target.path, "Cannot describe SMB file");
                None
            }
        }
    }

    fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError> {
        let root = self.resolve_root(&target.path)?;
        if !root.is_folder {
            return Err(FilestoreError::connection(&target.path, "Not a folder"));
        }
        let children = self.list_children(&root);
        telemetry::record_remote_call(KIND, "list", &children);

        let content = children?
            .into_iter()
            .filter_map(|child| match child {
                Ok(entry) if paths::is_hidden(&entry.name) => None,
                Ok(entry) if entry.is_folder => Some(ResourceDetails::folder(&entry.path, vec![])),
                Ok(entry) => Some(ResourceDetails::file(&entry.path, entry.size, entry.modified)),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .collect();
        Ok(ResourceDetails::folder(&root.path, content).with_filestore_id(self.filestore_id))
    }

    fn query_file_for_download(&mut self, target: &Target) -> Result<RemoteDownload, FilestoreError> {
        let (absolute, entry) = self.stat(&target.path)?;
        if entry.is_directory {
            return Err(FilestoreError::connection(absolute, "Cannot download a folder"));
        }
        let url = self.url_for(&absolute);
        let reader = self
            .resolver
            .open_read(&url, &self.principal, &self.timeouts)
            .map_err(|e| e.into_filestore(KIND, &absolute))?;
        let details =
            FileDetails::new(&absolute, entry.size, entry.modified).with_filestore_id(self.filestore_id);
        Ok(RemoteDownload::new(details, reader))
    }
}
