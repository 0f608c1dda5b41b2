// Narrow seams over the native SMB protocol libraries
// Both SMB clients talk to the wire only through these traits; engine errors
// never cross the client boundary untranslated.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

use super::smb_legacy::LegacySmbTimeouts;
use crate::errors::FilestoreError;
use crate::models::FilestoreKind;
use crate::paths::{self, PathStyle};

const SMB_SCHEME: &str = "smb://";

/// A configured SMB address split into host, share and the remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbAddress {
    pub host: String,
    pub share: Option<String>,
    /// Canonical path after the share segment, possibly empty
    pub sub_path: String,
}

impl SmbAddress {
    /// Accepts `host/share/sub`, `\\host\share\sub` and `smb://host/share/` forms
    pub fn parse(address: &str) -> Result<Self, FilestoreError> {
        let trimmed = address.trim();
        let without_scheme = match trimmed.get(..SMB_SCHEME.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(SMB_SCHEME) => {
                &trimmed[SMB_SCHEME.len()..]
            }
            _ => trimmed,
        };
        let canonical = paths::to_canonical_separator(PathStyle::Backslash, without_scheme);
        let mut segments = canonical.split('/').filter(|s| !s.is_empty());
        let host = segments.next().ok_or_else(|| {
            FilestoreError::configuration(format!("SMB address '{}' has no host", address))
        })?;
        let share = segments.next().map(str::to_string);
        let sub_path = segments.collect::<Vec<_>>().join("/");
        Ok(Self {
            host: host.to_string(),
            share,
            sub_path,
        })
    }

    /// `smb://host/share/`, always with a trailing separator
    pub fn share_url(&self, share: &str) -> String {
        format!("{}{}/{}/", SMB_SCHEME, self.host, share)
    }
}

/// One directory entry or stat result reported by an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl SmbEntry {
    pub fn file(name: impl Into<String>, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size,
            modified,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: 0,
            modified: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmbEngineError {
    /// The server refused the principal (bad password, locked account)
    #[error("logon failure: {0}")]
    LogonFailure(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("connection lost")]
    Disconnected,

    #[error("i/o error: {0}")]
    Io(String),
}

impl SmbEngineError {
    /// Translate into the caller-facing taxonomy.
    /// Only a logon failure is an authentication problem; everything else,
    /// including access denied on a listing, is a connection failure.
    pub fn into_filestore(self, kind: FilestoreKind, path: &str) -> FilestoreError {
        match self {
            SmbEngineError::LogonFailure(message) => FilestoreError::auth(kind, message),
            other => FilestoreError::connection(path, other.to_string()),
        }
    }
}

/// NTLM principal presented to the server
#[derive(Clone, PartialEq, Eq)]
pub struct SmbCredentials {
    pub domain: Option<String>,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbCredentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection parameters handed to the SMB2/3 engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbConnectOptions {
    pub domain: Option<String>,
    pub dfs_enabled: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub response_timeout: Duration,
}

/// SMB1 access where every call resolves its own `smb://` URL
#[cfg_attr(test, mockall::automock)]
pub trait SmbUrlResolver: Send {
    fn stat(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<SmbEntry, SmbEngineError>;

    /// Children of a directory URL; attribute lookups may fail per entry
    fn list(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<Vec<Result<SmbEntry, SmbEngineError>>, SmbEngineError>;

    fn open_read(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<Box<dyn Read + Send>, SmbEngineError>;
}

/// SMB2/3 session pipeline: connect, authenticate, then attach one share.
/// Paths are share-relative with backslash separators; `""` is the share root.
#[cfg_attr(test, mockall::automock)]
pub trait Smb2Engine: Send {
    fn connect(&mut self, host: &str, options: &SmbConnectOptions) -> Result<(), SmbEngineError>;

    fn authenticate(&mut self, credentials: &SmbCredentials) -> Result<(), SmbEngineError>;

    fn connect_share(&mut self, share: &str) -> Result<(), SmbEngineError>;

    fn is_connected(&self) -> bool;

    fn list(&mut self, path: &str) -> Result<Vec<SmbEntry>, SmbEngineError>;

    fn stat(&mut self, path: &str) -> Result<SmbEntry, SmbEngineError>;

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>, SmbEngineError>;

    fn disconnect(&mut self);
}
