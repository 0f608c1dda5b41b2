// SMB2/3 client
// connect -> authenticate -> connect_share, cached until the engine reports
// the connection gone. Paths crossing this boundary carry the share name;
// paths handed to the engine never do.

use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use super::smb_engine::{SmbAddress, SmbConnectOptions, SmbCredentials, Smb2Engine};
use super::{RemoteClient, RemoteDownload};
use crate::errors::FilestoreError;
use crate::models::{FilestoreKind, Target};
use crate::paths::{self, PathStyle, UserRootFolder};
use crate::resource::{FileDetails, ResourceDetails};
use crate::telemetry;
use crate::tree::{RemoteEntry, TreeBuilder, TreeNode, TreeOrder, TreeSource};

/// Where on the server a modern SMB filestore lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2Location {
    pub filestore_id: i64,
    pub host: String,
    pub share: String,
    /// Part of the configured address after the share name
    pub sub_path: String,
    /// Reject incoming paths that do not start with the share name
    pub share_name_must_match_path: bool,
}

impl Smb2Location {
    /// Split `address`; `share_name` wins over the share segment of the address
    pub fn from_address(
        filestore_id: i64,
        address: &str,
        share_name: Option<&str>,
    ) -> Result<Self, FilestoreError> {
        let parsed = SmbAddress::parse(address)?;
        let share = share_name
            .map(str::to_string)
            .or(parsed.share)
            .ok_or_else(|| {
                FilestoreError::configuration(format!(
                    "Filestore {} has no share name in '{}' or its options",
                    filestore_id, address
                ))
            })?;
        Ok(Self {
            filestore_id,
            host: parsed.host,
            share,
            sub_path: parsed.sub_path,
            share_name_must_match_path: false,
        })
    }

    pub fn with_share_name_must_match_path(mut self, required: bool) -> Self {
        self.share_name_must_match_path = required;
        self
    }
}

pub struct Smb2Client {
    engine: Box<dyn Smb2Engine>,
    location: Smb2Location,
    credentials: SmbCredentials,
    options: SmbConnectOptions,
    kind: FilestoreKind,
    session_ready: bool,
}

impl Smb2Client {
    pub fn new(
        engine: Box<dyn Smb2Engine>,
        location: Smb2Location,
        credentials: SmbCredentials,
        options: SmbConnectOptions,
    ) -> Self {
        Self {
            engine,
            location,
            credentials,
            options,
            kind: FilestoreKind::Smb2,
            session_ready: false,
        }
    }

    /// Report a different kind, used when legacy filestores are served by this engine
    pub fn with_reported_kind(mut self, kind: FilestoreKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn location(&self) -> &Smb2Location {
        &self.location
    }

    /// Share-relative engine path for an incoming canonical path
    pub fn engine_path(&self, path: &str) -> Result<String, FilestoreError> {
        let canonical = paths::to_canonical_separator(PathStyle::Backslash, path);
        let canonical = paths::strip_leading_separator(&canonical).trim_end_matches('/');
        let share = self.location.share.as_str();

        let relative = if canonical == share {
            ""
        } else if let Some(rest) = canonical
            .strip_prefix(share)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            rest
        } else if self.location.share_name_must_match_path && !canonical.is_empty() {
            return Err(FilestoreError::connection(
                path,
                format!("Path must start with share name '{}'", share),
            ));
        } else {
            canonical
        };
        Ok(paths::to_native_separator(PathStyle::Backslash, relative))
    }

    /// Outgoing canonical path for an engine path, share name re-added
    pub fn outgoing_path(&self, engine_path: &str) -> String {
        paths::join_canonical(
            &self.location.share,
            &paths::to_canonical_separator(PathStyle::Backslash, engine_path),
        )
    }

    fn ensure_session(&mut self) -> Result<(), FilestoreError> {
        if self.session_ready && self.engine.is_connected() {
            return Ok(());
        }
        if self.session_ready {
            info!(host = %self.location.host, "SMB connection found disconnected, re-establishing session");
            self.engine.disconnect();
        }
        self.session_ready = false;

        let kind = self.kind;
        let host = self.location.host.clone();
        self.engine
            .connect(&host, &self.options)
            .map_err(|e| e.into_filestore(kind, &host))?;
        // A connected engine must not outlive a failed setup
        if let Err(e) = self.open_share() {
            debug!(host = %host, error = %e, "SMB session setup failed, disconnecting");
            self.engine.disconnect();
            return Err(e);
        }

        self.session_ready = true;
        debug!(host = %host, share = %self.location.share, "SMB session established");
        Ok(())
    }

    fn open_share(&mut self) -> Result<(), FilestoreError> {
        let kind = self.kind;
        let host = self.location.host.as_str();
        self.engine
            .authenticate(&self.credentials)
            .map_err(|e| e.into_filestore(kind, host))?;
        self.engine
            .connect_share(&self.location.share)
            .map_err(|e| e.into_filestore(kind, &self.location.share))
    }

    fn list_resources(&mut self, engine_path: &str) -> Result<Vec<ResourceDetails>, FilestoreError> {
        let kind = self.kind;
        let entries = self
            .engine
            .list(engine_path)
            .map_err(|e| e.into_filestore(kind, &self.outgoing_path(engine_path)))?;

        let filestore_id = self.location.filestore_id;
        Ok(entries
            .into_iter()
            .filter(|entry| !paths::is_hidden(&entry.name))
            .map(|entry| {
                let child = self.outgoing_path(&child_engine_path(engine_path, &entry.name));
                let resource = if entry.is_directory {
                    ResourceDetails::folder(&child, Vec::new())
                } else {
                    ResourceDetails::file(&child, entry.size, entry.modified)
                };
                resource.with_filestore_id(filestore_id)
            })
            .collect())
    }

    fn strip_share(&self, native: &str) -> String {
        match native.strip_prefix(self.location.share.as_str()) {
            Some("") => String::new(),
            Some(rest) if rest.starts_with('\\') => rest[1..].to_string(),
            _ => native.to_string(),
        }
    }
}

fn child_engine_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", parent, name)
    }
}

impl TreeSource for Smb2Client {
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError> {
        let engine_path = self.engine_path(path)?;
        let share = self.location.share.clone();
        if engine_path.is_empty() {
            return Ok(RemoteEntry {
                name: share.clone(),
                path: share,
                is_folder: true,
                size: 0,
                modified: None,
            });
        }

        let kind = self.kind;
        let entry = self
            .engine
            .stat(&engine_path)
            .map_err(|e| e.into_filestore(kind, path))?;
        Ok(RemoteEntry {
            name: entry.name,
            path: format!("{}\\{}", share, engine_path),
            is_folder: entry.is_directory,
            size: entry.size,
            modified: entry.modified,
        })
    }

    fn list_children(
        &mut self,
        folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
        let engine_path = self.strip_share(&folder.path);
        let kind = self.kind;
        let entries = self.engine.list(&engine_path).map_err(|e| {
            e.into_filestore(kind, &paths::to_canonical_separator(PathStyle::Backslash, &folder.path))
        })?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                Ok(RemoteEntry {
                    path: format!("{}\\{}", folder.path, entry.name),
                    name: entry.name,
                    is_folder: entry.is_directory,
                    size: entry.size,
                    modified: entry.modified,
                })
            })
            .collect())
    }
}

impl RemoteClient for Smb2Client {
    fn kind(&self) -> FilestoreKind {
        self.kind
    }

    fn username(&self) -> &str {
        &self.credentials.username
    }

    fn is_logged_in(&self) -> bool {
        !self.credentials.username.is_empty()
    }

    #[instrument(skip(self), fields(host = %self.location.host, share = %self.location.share))]
    fn try_connect_and_read_target(&mut self, path: &str) -> Result<(), FilestoreError> {
        let result = self.ensure_session().and_then(|_| {
            let engine_path = self.engine_path(path)?;
            let kind = self.kind;
            self.engine
                .list(&engine_path)
                .map(|entries| debug!(entries = entries.len(), "Target listed"))
                .map_err(|e| e.into_filestore(kind, path))
        });
        telemetry::record_remote_call(self.kind, "connect", &result);
        if let Err(e) = &result {
            warn!(error = %e, path = %path, "SMB reachability check failed");
        }
        result
    }

    #[instrument(skip(self, root_folder), fields(share = %self.location.share))]
    fn create_file_tree(
        &mut self,
        path: &str,
        order_token: &str,
        root_folder: Option<&UserRootFolder>,
    ) -> Result<TreeNode, FilestoreError> {
        self.ensure_session()?;
        let builder = TreeBuilder::new(TreeOrder::from_token(order_token), PathStyle::Backslash)
            .with_root_folder(root_folder);
        let result = builder.build(self, path);
        telemetry::record_remote_call(self.kind, "tree", &result);
        if let Ok(tree) = &result {
            telemetry::record_tree_children(self.kind, tree.children.len());
        }
        result
    }

    fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails> {
        let result = self.ensure_session().and_then(|_| {
            let engine_path = self.engine_path(&target.path)?;
            let kind = self.kind;
            self.engine
                .stat(&engine_path)
                .map(|entry| (engine_path, entry))
                .map_err(|e| e.into_filestore(kind, &target.path))
        });
        telemetry::record_remote_call(self.kind, "stat", &result);

        match result {
            Ok((_, entry)) if entry.is_directory => {
                debug!(path = %target.path, "Target is a folder, not a file");
                None
            }
            Ok((engine_path, entry)) => Some(
                ResourceDetails::file(&self.outgoing_path(&engine_path), entry.size, entry.modified)
                    .with_filestore_id(self.location.filestore_id),
            ),
            Err(e) => {
                warn!(error = %e, path = %target.path, "Cannot describe SMB file");
                None
            }
        }
    }

    #[instrument(skip(self), fields(share = %self.location.share))]
    fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError> {
        let result = self.ensure_session().and_then(|_| {
            let engine_path = self.engine_path(&target.path)?;
            let content = self.list_resources(&engine_path)?;
            Ok(ResourceDetails::folder(&self.outgoing_path(&engine_path), content)
                .with_filestore_id(self.location.filestore_id))
        });
        telemetry::record_remote_call(self.kind, "list", &result);
        result
    }

    fn query_file_for_download(&mut self, target: &Target) -> Result<RemoteDownload, FilestoreError> {
        self.ensure_session()?;
        let engine_path = self.engine_path(&target.path)?;
        let kind = self.kind;
        let entry = self
            .engine
            .stat(&engine_path)
            .map_err(|e| e.into_filestore(kind, &target.path))?;
        if entry.is_directory {
            return Err(FilestoreError::connection(
                &target.path,
                "Cannot download a folder",
            ));
        }
        let reader = self
            .engine
            .open_read(&engine_path)
            .map_err(|e| e.into_filestore(kind, &target.path))?;

        let details = FileDetails::new(&self.outgoing_path(&engine_path), entry.size, entry.modified)
            .with_filestore_id(self.location.filestore_id);
        Ok(RemoteDownload::new(details, reader))
    }

    fn release_after_download(&mut self, download: RemoteDownload) {
        debug!(path = %download.details.path, "Releasing SMB file handle");
        drop(download);
    }

    fn close_session(&mut self) {
        if self.session_ready {
            self.engine.disconnect();
            self.session_ready = false;
            debug!(host = %self.location.host, "SMB session closed");
        }
    }

    fn supports_current_directory(&self) -> bool {
        true
    }

    fn upload_files(
        &mut self,
        _folder: &str,
        _files: &[PathBuf],
    ) -> Result<Vec<ResourceDetails>, FilestoreError> {
        Err(super::write_unsupported(self.kind, "upload"))
    }

    fn delete_files(&mut self, _paths: &[String]) -> Result<usize, FilestoreError> {
        Err(super::write_unsupported(self.kind, "delete"))
    }
}

impl Drop for Smb2Client {
    fn drop(&mut self) {
        self.close_session();
    }
}
