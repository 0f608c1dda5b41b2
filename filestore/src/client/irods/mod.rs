// iRODS client module
// Account object plus a gateway seam; relative targets resolve under the home collection

mod http;

pub use http::HttpIrodsGateway;

use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{RemoteClient, RemoteDownload};
use crate::errors::FilestoreError;
use crate::models::{FilestoreConfig, FilestoreKind, Target};
use crate::paths::{self, PathStyle, UserRootFolder};
use crate::resource::{FileDetails, ResourceDetails};
use crate::telemetry;
use crate::tree::{RemoteEntry, TreeBuilder, TreeNode, TreeOrder, TreeSource};

const KIND: FilestoreKind = FilestoreKind::Irods;

/// Port of the iRODS HTTP API when the filestore sets none
pub const DEFAULT_HTTP_API_PORT: u16 = 9000;

/// Everything needed to open an iRODS session for one user
#[derive(Clone, PartialEq, Eq)]
pub struct IrodsAccount {
    pub host: String,
    pub port: u16,
    pub zone: String,
    /// Home collection, e.g. `/labZone/home/alice`
    pub home_dir: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for IrodsAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrodsAccount")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("zone", &self.zone)
            .field("home_dir", &self.home_dir)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl IrodsAccount {
    /// Zone comes from `irodsZone`, else the first segment of `irodsHomeDir`.
    /// The home collection defaults to `/<zone>/home/<user>`.
    pub fn from_config(
        config: &FilestoreConfig,
        username: &str,
        password: &str,
    ) -> Result<Self, FilestoreError> {
        let options = &config.options;
        let home_zone = options
            .irods_home_dir
            .as_deref()
            .map(|dir| paths::strip_leading_separator(dir))
            .and_then(|dir| dir.split('/').next())
            .filter(|zone| !zone.is_empty())
            .map(str::to_string);
        let zone = options.irods_zone.clone().or(home_zone).ok_or_else(|| {
            FilestoreError::configuration(format!(
                "iRODS filestore {} needs irodsZone or irodsHomeDir",
                config.id
            ))
        })?;
        let home_dir = options
            .irods_home_dir
            .as_deref()
            .map(|dir| dir.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("/{}/home/{}", zone, username));

        let host = config
            .address
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split(['/', ':'])
            .next()
            .unwrap_or_default()
            .to_string();
        if host.is_empty() {
            return Err(FilestoreError::configuration(format!(
                "iRODS filestore {} has no host in '{}'",
                config.id, config.address
            )));
        }

        Ok(Self {
            host,
            port: options.irods_port.unwrap_or(DEFAULT_HTTP_API_PORT),
            zone,
            home_dir,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// A data object or collection as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrodsObject {
    /// Absolute logical path
    pub path: String,
    pub is_collection: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrodsError {
    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("no such data object or collection: {0}")]
    NotFound(String),

    #[error("iRODS request failed: {0}")]
    Transport(String),
}

impl IrodsError {
    pub fn into_filestore(self, path: &str) -> FilestoreError {
        match self {
            IrodsError::Unauthorized(message) => FilestoreError::auth(KIND, message),
            other => FilestoreError::connection(path, other.to_string()),
        }
    }
}

/// Session-level access to an iRODS zone
#[cfg_attr(test, mockall::automock)]
pub trait IrodsGateway: Send {
    fn authenticate(&mut self, account: &IrodsAccount) -> Result<(), IrodsError>;

    fn stat(&mut self, logical_path: &str) -> Result<IrodsObject, IrodsError>;

    /// Immediate members of a collection
    fn list_collection(&mut self, logical_path: &str) -> Result<Vec<IrodsObject>, IrodsError>;

    fn read(&mut self, logical_path: &str) -> Result<Box<dyn Read + Send>, IrodsError>;

    fn close(&mut self);
}

pub struct IrodsClient {
    filestore_id: i64,
    account: IrodsAccount,
    gateway: Box<dyn IrodsGateway>,
    authenticated: bool,
}

impl IrodsClient {
    pub fn new(filestore_id: i64, account: IrodsAccount, gateway: Box<dyn IrodsGateway>) -> Self {
        Self {
            filestore_id,
            account,
            gateway,
            authenticated: false,
        }
    }

    pub fn account(&self) -> &IrodsAccount {
        &self.account
    }

    /// Absolute logical path; relative targets resolve under the home collection
    pub fn logical_path(&self, path: &str) -> String {
        let trimmed = path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            self.account.home_dir.clone()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            paths::join_canonical(&self.account.home_dir, trimmed)
        }
    }

    fn ensure_authenticated(&mut self) -> Result<(), FilestoreError> {
        if self.authenticated {
            return Ok(());
        }
        self.gateway
            .authenticate(&self.account)
            .map_err(|e| e.into_filestore(&self.account.home_dir))?;
        self.authenticated = true;
        debug!(user = %self.account.username, zone = %self.account.zone, "iRODS session opened");
        Ok(())
    }

    /// Run one gateway request; a rejected token is dropped and the request retried once
    fn call<T>(
        &mut self,
        logical: &str,
        mut request: impl FnMut(&mut dyn IrodsGateway, &str) -> Result<T, IrodsError>,
    ) -> Result<T, FilestoreError> {
        self.ensure_authenticated()?;
        let outcome = match request(self.gateway.as_mut(), logical) {
            Err(IrodsError::Unauthorized(message)) => {
                info!(error = %message, user = %self.account.username, "iRODS session rejected, authenticating again");
                self.authenticated = false;
                self.ensure_authenticated()?;
                request(self.gateway.as_mut(), logical)
            }
            other => other,
        };
        outcome.map_err(|e| e.into_filestore(logical))
    }

    fn stat(&mut self, path: &str) -> Result<IrodsObject, FilestoreError> {
        let logical = self.logical_path(path);
        self.call(&logical, |gateway, p| gateway.stat(p))
    }

    fn list(&mut self, logical: &str) -> Result<Vec<IrodsObject>, FilestoreError> {
        self.call(logical, |gateway, p| gateway.list_collection(p))
    }
}

fn entry_from_object(object: IrodsObject) -> RemoteEntry {
    RemoteEntry {
        name: paths::file_name(&object.path).to_string(),
        path: object.path,
        is_folder: object.is_collection,
        size: object.size,
        modified: object.modified,
    }
}

impl TreeSource for IrodsClient {
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError> {
        self.stat(path).map(entry_from_object)
    }

    fn list_children(
        &mut self,
        folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
        let members = self.list(&folder.path)?;
        Ok(members.into_iter().map(|m| Ok(entry_from_object(m))).collect())
    }
}

impl RemoteClient for IrodsClient {
    fn kind(&self) -> FilestoreKind {
        KIND
    }

    fn username(&self) -> &str {
        &self.account.username
    }

    fn is_logged_in(&self) -> bool {
        !self.account.username.is_empty()
    }

    #[instrument(skip(self), fields(host = %self.account.host, zone = %self.account.zone))]
    fn try_connect_and_read_target(&mut self, path: &str) -> Result<(), FilestoreError> {
        let logical = self.logical_path(path);
        let result = self
            .list(&logical)
            .map(|members| debug!(members = members.len(), "Collection listed"));
        telemetry::record_remote_call(KIND, "connect", &result);
        if let Err(e) = &result {
            warn!(error = %e, path = %logical, "iRODS reachability check failed");
        }
        result
    }

    #[instrument(skip(self, root_folder), fields(zone = %self.account.zone))]
    fn create_file_tree(
        &mut self,
        path: &str,
        order_token: &str,
        root_folder: Option<&UserRootFolder>,
    ) -> Result<TreeNode, FilestoreError> {
        self.ensure_authenticated()?;
        let logical = self.logical_path(path);
        let builder = TreeBuilder::new(TreeOrder::from_token(order_token), PathStyle::Slash)
            .with_root_folder(root_folder);
        let result = builder.build_recursive(self, &logical);
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
            Ok(object) if object.is_collection => None,
            Ok(object) => Some(
                ResourceDetails::file(&object.path, object.size, object.modified)
                    .with_filestore_id(self.filestore_id),
            ),
            Err(e) => {
                warn!(error = %e, path = %target.path, "Cannot describe iRODS data object");
                None
            }
        }
    }

    fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError> {
        let logical = self.logical_path(&target.path);
        let result = self.list(&logical);
        telemetry::record_remote_call(KIND, "list", &result);

        let content = result?
            .into_iter()
            .filter(|member| !paths::is_hidden(paths::file_name(&member.path)))
            .map(|member| {
                if member.is_collection {
                    ResourceDetails::folder(&member.path, vec![])
                } else {
                    ResourceDetails::file(&member.path, member.size, member.modified)
                }
            })
            .collect();
        Ok(ResourceDetails::folder(&logical, content).with_filestore_id(self.filestore_id))
    }

    fn query_file_for_download(&mut self, target: &Target) -> Result<RemoteDownload, FilestoreError> {
        let object = self.stat(&target.path)?;
        if object.is_collection {
            return Err(FilestoreError::connection(&object.path, "Cannot download a collection"));
        }
        let reader = self.call(&object.path, |gateway, p| gateway.read(p))?;
        let details = FileDetails::new(&object.path, object.size, object.modified)
            .with_filestore_id(self.filestore_id);
        Ok(RemoteDownload::new(details, reader))
    }

    fn close_session(&mut self) {
        if self.authenticated {
            self.gateway.close();
            self.authenticated = false;
        }
    }
}
