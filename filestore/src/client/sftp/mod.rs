// SFTP client module
// Lazy ssh2 session keyed by password or key pair; the only backend with write support

mod connection;
mod operations;

pub use connection::{host_key_matches, SftpConnection, SftpEndpoint};
pub use operations::SftpTreeSource;

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{RemoteClient, RemoteDownload};
use crate::config::TimeoutConfig;
use crate::errors::FilestoreError;
use crate::models::{Credentials, FilestoreKind, Target};
use crate::paths::{self, PathStyle, UserRootFolder};
use crate::resource::{FileDetails, ResourceDetails};
use crate::telemetry;
use crate::tree::{TreeBuilder, TreeNode, TreeOrder};

const KIND: FilestoreKind = FilestoreKind::Sftp;

pub struct SftpClient {
    filestore_id: i64,
    endpoint: SftpEndpoint,
    credentials: Credentials,
    server_public_key: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    connection: Option<SftpConnection>,
}

impl SftpClient {
    pub fn new(
        filestore_id: i64,
        address: &str,
        credentials: Credentials,
        server_public_key: Option<String>,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, FilestoreError> {
        Ok(Self {
            filestore_id,
            endpoint: SftpEndpoint::parse(address)?,
            credentials,
            server_public_key,
            connect_timeout: timeouts.connect(),
            read_timeout: timeouts.read(),
            connection: None,
        })
    }

    pub fn endpoint(&self) -> &SftpEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Absolute remote path for a canonical target path.
    /// Relative paths resolve under the base directory, or the login directory.
    pub fn remote_path(&self, path: &str) -> String {
        let canonical = paths::to_canonical_separator(PathStyle::Slash, path.trim());
        let trimmed = match canonical.trim_end_matches('/') {
            "" if canonical.starts_with('/') => "/",
            other => other,
        };
        match (trimmed, &self.endpoint.base_dir) {
            ("", Some(base)) => base.clone(),
            ("", None) => ".".to_string(),
            (absolute, _) if absolute.starts_with('/') => absolute.to_string(),
            (relative, Some(base)) => paths::join_canonical(base, relative),
            (relative, None) => relative.to_string(),
        }
    }

    fn connection(&mut self) -> Result<&SftpConnection, FilestoreError> {
        if self.connection.is_none() {
            let connection = SftpConnection::connect(
                &self.endpoint,
                &self.credentials,
                self.server_public_key.as_deref(),
                self.connect_timeout,
                self.read_timeout,
            )?;
            self.connection = Some(connection);
        }
        self.connection
            .as_ref()
            .ok_or_else(|| FilestoreError::connection(&self.endpoint.host, "SFTP session unavailable"))
    }

    /// Drop the cached session when a failed call left it dead, so the next call reconnects
    fn discard_if_lost<T>(
        &mut self,
        result: Result<T, FilestoreError>,
    ) -> Result<T, FilestoreError> {
        if result.is_err() && self.connection.as_ref().is_some_and(|c| !c.is_alive()) {
            info!(host = %self.endpoint.host, "SFTP session lost, will reconnect on next call");
            self.connection = None;
        }
        result
    }
}

impl RemoteClient for SftpClient {
    fn kind(&self) -> FilestoreKind {
        KIND
    }

    fn username(&self) -> &str {
        self.credentials.username()
    }

    fn is_logged_in(&self) -> bool {
        !self.credentials.username().is_empty()
    }

    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    fn try_connect_and_read_target(&mut self, path: &str) -> Result<(), FilestoreError> {
        let remote = self.remote_path(path);
        let result = self.connection().and_then(|conn| {
            operations::list_entries(conn.sftp(), &remote)
                .map(|entries| debug!(entries = entries.len(), "Target listed"))
        });
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "connect", &result);
        if let Err(e) = &result {
            warn!(error = %e, path = %remote, "SFTP reachability check failed");
        }
        result
    }

    #[instrument(skip(self, root_folder), fields(host = %self.endpoint.host))]
    fn create_file_tree(
        &mut self,
        path: &str,
        order_token: &str,
        root_folder: Option<&UserRootFolder>,
    ) -> Result<TreeNode, FilestoreError> {
        let remote = self.remote_path(path);
        let builder = TreeBuilder::new(TreeOrder::from_token(order_token), PathStyle::Slash)
            .with_root_folder(root_folder);
        let result = self.connection().and_then(|conn| {
            builder.build_recursive(&mut SftpTreeSource::new(conn.sftp()), &remote)
        });
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "tree", &result);
        if let Ok(tree) = &result {
            telemetry::record_tree_children(KIND, tree.children.len());
        }
        result
    }

    fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails> {
        let remote = self.remote_path(&target.path);
        let result = self
            .connection()
            .and_then(|conn| operations::stat_entry(conn.sftp(), &remote));
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "stat", &result);
        match result {
            Ok(entry) if entry.is_folder => None,
            Ok(entry) => Some(
                ResourceDetails::file(&entry.path, entry.size, entry.modified)
                    .with_filestore_id(self.filestore_id),
            ),
            Err(e) => {
                warn!(error = %e, path = %remote, "Cannot describe SFTP file");
                None
            }
        }
    }

    fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError> {
        let remote = self.remote_path(&target.path);
        let result = self.connection().and_then(|conn| {
            operations::list_entries(conn.sftp(), &remote)
        });
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "list", &result);

        let content = result?
            .into_iter()
            .filter(|entry| !paths::is_hidden(&entry.name))
            .map(|entry| {
                if entry.is_folder {
                    ResourceDetails::folder(&entry.path, vec![])
                } else {
                    ResourceDetails::file(&entry.path, entry.size, entry.modified)
                }
            })
            .collect();
        Ok(ResourceDetails::folder(&remote, content).with_filestore_id(self.filestore_id))
    }

    fn query_file_for_download(&mut self, target: &Target) -> Result<RemoteDownload, FilestoreError> {
        let remote = self.remote_path(&target.path);
        let result = self.connection().and_then(|conn| {
            let entry = operations::stat_entry(conn.sftp(), &remote)?;
            if entry.is_folder {
                return Err(FilestoreError::connection(&remote, "Cannot download a folder"));
            }
            operations::read_file(conn.sftp(), &remote).map(|reader| (entry, reader))
        });
        let (entry, reader) = self.discard_if_lost(result)?;
        let details = FileDetails::new(&entry.path, entry.size, entry.modified)
            .with_filestore_id(self.filestore_id);
        Ok(RemoteDownload::new(details, reader))
    }

    fn close_session(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
            info!(host = %self.endpoint.host, "SFTP session closed");
        }
    }

    fn supports_current_directory(&self) -> bool {
        true
    }

    fn supports_write(&self) -> bool {
        true
    }

    #[instrument(skip(self, files), fields(host = %self.endpoint.host, count = files.len()))]
    fn upload_files(
        &mut self,
        folder: &str,
        files: &[PathBuf],
    ) -> Result<Vec<ResourceDetails>, FilestoreError> {
        let remote_dir = self.remote_path(folder);
        let filestore_id = self.filestore_id;
        let result = self.connection().and_then(|conn| {
            operations::create_remote_dirs(conn.sftp(), &remote_dir)?;
            files
                .iter()
                .map(|local| {
                    operations::upload_file(conn.sftp(), local, &remote_dir)
                        .map(|details| ResourceDetails::File(details.with_filestore_id(filestore_id)))
                })
                .collect::<Result<Vec<_>, _>>()
        });
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "upload", &result);
        result
    }

    #[instrument(skip(self, paths), fields(host = %self.endpoint.host, count = paths.len()))]
    fn delete_files(&mut self, paths: &[String]) -> Result<usize, FilestoreError> {
        let remote: Vec<String> = paths.iter().map(|p| self.remote_path(p)).collect();
        let result = self.connection().and_then(|conn| {
            remote
                .iter()
                .try_for_each(|path| operations::delete_file(conn.sftp(), path))
                .map(|_| remote.len())
        });
        let result = self.discard_if_lost(result);
        telemetry::record_remote_call(KIND, "delete", &result);
        result
    }
}

impl Drop for SftpClient {
    fn drop(&mut self) {
        self.close_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn client(address: &str) -> SftpClient {
        SftpClient::new(
            5,
            address,
            Credentials::password("carol", "pw"),
            None,
            &TimeoutConfig {
                connect_timeout_seconds: 1,
                read_timeout_seconds: 1,
                response_timeout_seconds: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_remote_path_resolution() {
        let plain = client("files.lab.org");
        assert_eq!(plain.remote_path(""), ".");
        assert_eq!(plain.remote_path("/"), "/");
        assert_eq!(plain.remote_path("/srv/data/"), "/srv/data");
        assert_eq!(plain.remote_path("runs/1"), "runs/1");

        let based = client("files.lab.org:2022/data");
        assert_eq!(based.remote_path(""), "/data");
        assert_eq!(based.remote_path("runs/1"), "/data/runs/1");
        assert_eq!(based.remote_path("/etc/x"), "/etc/x");
    }

    #[test]
    fn test_session_is_lazy() {
        let c = client("files.lab.org");
        assert!(c.is_logged_in());
        assert!(!c.is_connected());
        assert!(c.supports_write());
        assert_eq!(c.username(), "carol");
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let mut c = client("127.0.0.1:1");
        let err = c.try_connect_and_read_target("/").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(!c.is_connected());
        assert!(c.query_for_file(&Target::new("/a.txt")).is_none());
    }

    #[test]
    fn test_failed_calls_leave_no_cached_session() {
        let mut c = client("127.0.0.1:1");
        for _ in 0..2 {
            let err = c.query_for_folder(&Target::new("/data")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Connection);
            assert!(!c.is_connected());
        }
        let err = c.discard_if_lost::<()>(Err(FilestoreError::connection("/x", "reset")));
        assert!(err.is_err());
        assert!(!c.is_connected());
    }

    #[test]
    fn test_invalid_address_is_configuration_error() {
        let result = SftpClient::new(
            1,
            "host:notaport",
            Credentials::password("u", "p"),
            None,
            &TimeoutConfig::default(),
        );
        assert!(matches!(result, Err(FilestoreError::Configuration(_))));
    }
}
