// Data models for filestore configuration, credentials and query targets

use crate::errors::FilestoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Filestore configuration
// ============================================================================

/// Backend protocol of a configured filestore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilestoreKind {
    /// SMB1 over `smb://` URLs
    #[serde(rename = "smb")]
    SmbLegacy,
    /// SMB2/3 with explicit connection, session and share
    #[serde(rename = "samba")]
    Smb2,
    #[serde(rename = "sftp")]
    Sftp,
    #[serde(rename = "irods")]
    Irods,
}

impl FilestoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilestoreKind::SmbLegacy => "smb",
            FilestoreKind::Smb2 => "samba",
            FilestoreKind::Sftp => "sftp",
            FilestoreKind::Irods => "irods",
        }
    }

    /// SMB variants have no recursive listing call and use the tree builder
    pub fn is_smb_family(&self) -> bool {
        matches!(self, FilestoreKind::SmbLegacy | FilestoreKind::Smb2)
    }

    pub fn supports_public_key(&self) -> bool {
        matches!(self, FilestoreKind::Sftp)
    }
}

impl fmt::Display for FilestoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilestoreKind {
    type Err = FilestoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smb" | "smb1" => Ok(FilestoreKind::SmbLegacy),
            "samba" | "smb2" | "smb3" => Ok(FilestoreKind::Smb2),
            "sftp" => Ok(FilestoreKind::Sftp),
            "irods" => Ok(FilestoreKind::Irods),
            other => Err(FilestoreError::configuration(format!(
                "Unknown filestore kind '{}'",
                other
            ))),
        }
    }
}

/// How a user proves identity to a filestore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Password,
    #[serde(rename = "pubkey")]
    PublicKey,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthKind::Password => f.write_str("password"),
            AuthKind::PublicKey => f.write_str("pubkey"),
        }
    }
}

impl FromStr for AuthKind {
    type Err = FilestoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "password" => Ok(AuthKind::Password),
            "pubkey" | "publickey" | "public_key" => Ok(AuthKind::PublicKey),
            other => Err(FilestoreError::configuration(format!(
                "Unknown authentication kind '{}'",
                other
            ))),
        }
    }
}

/// Option keys understood in a filestore record
pub mod option_keys {
    pub const DOMAIN: &str = "domain";
    pub const SHARE_NAME: &str = "shareName";
    pub const SFTP_SERVER_PUBLIC_KEY: &str = "sftpServerPublicKey";
    pub const IRODS_PORT: &str = "irodsPort";
    pub const IRODS_HOME_DIR: &str = "irodsHomeDir";
    pub const IRODS_ZONE: &str = "irodsZone";
}

/// Kind-specific options, typed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilestoreOptions {
    pub domain: Option<String>,
    pub share_name: Option<String>,
    pub sftp_server_public_key: Option<String>,
    pub irods_port: Option<u16>,
    pub irods_home_dir: Option<String>,
    pub irods_zone: Option<String>,
}

impl FilestoreOptions {
    /// Read typed options from the raw string map of a filestore record.
    /// Keys match case-insensitively; unknown keys are ignored and blank values count as absent.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, FilestoreError> {
        let get = |key: &str| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let irods_port = match get(option_keys::IRODS_PORT) {
            Some(raw) => Some(raw.parse::<u16>().map_err(|e| {
                FilestoreError::configuration(format!("Invalid irodsPort '{}': {}", raw, e))
            })?),
            None => None,
        };

        Ok(Self {
            domain: get(option_keys::DOMAIN),
            share_name: get(option_keys::SHARE_NAME),
            sftp_server_public_key: get(option_keys::SFTP_SERVER_PUBLIC_KEY),
            irods_port,
            irods_home_dir: get(option_keys::IRODS_HOME_DIR),
            irods_zone: get(option_keys::IRODS_ZONE),
        })
    }
}

/// Filestore definition as delivered by the configuration store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilestoreRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub kind: String,
    pub address: String,
    #[serde(default = "default_auth_kind")]
    pub auth_kind: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_auth_kind() -> String {
    "password".to_string()
}

/// Validated filestore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilestoreConfig {
    pub id: i64,
    pub name: String,
    pub kind: FilestoreKind,
    pub address: String,
    pub auth_kind: AuthKind,
    pub options: FilestoreOptions,
}

impl FilestoreConfig {
    pub fn new(id: i64, kind: FilestoreKind, address: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            kind,
            address: address.into(),
            auth_kind: AuthKind::Password,
            options: FilestoreOptions::default(),
        }
    }

    pub fn with_auth_kind(mut self, auth_kind: AuthKind) -> Self {
        self.auth_kind = auth_kind;
        self
    }

    pub fn with_options(mut self, options: FilestoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check the structural rules every backend relies on
    pub fn validate(&self) -> Result<(), FilestoreError> {
        if self.address.trim().is_empty() {
            return Err(FilestoreError::configuration(format!(
                "Filestore {} has no address",
                self.id
            )));
        }
        Ok(())
    }
}

impl TryFrom<FilestoreRecord> for FilestoreConfig {
    type Error = FilestoreError;

    fn try_from(record: FilestoreRecord) -> Result<Self, Self::Error> {
        let config = FilestoreConfig {
            id: record.id,
            name: record.name,
            kind: record.kind.parse()?,
            address: record.address.trim().to_string(),
            auth_kind: record.auth_kind.parse()?,
            options: FilestoreOptions::from_map(&record.options)?,
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// A user's registered SSH key pair
#[derive(Clone, PartialEq, Eq)]
pub struct UserKeyPair {
    /// OpenSSH public key line
    pub public_key: String,
    /// PEM or OpenSSH encoded private key
    pub private_key: String,
}

impl fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Credential material held for the duration of a login call
#[derive(Clone)]
pub enum Credentials {
    Password {
        username: String,
        password: String,
    },
    KeyPair {
        username: String,
        key_pair: UserKeyPair,
        passphrase: Option<String>,
    },
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Credentials::Password { username, .. } => username,
            Credentials::KeyPair { username, .. } => username,
        }
    }

    pub fn auth_kind(&self) -> AuthKind {
        match self {
            Credentials::Password { .. } => AuthKind::Password,
            Credentials::KeyPair { .. } => AuthKind::PublicKey,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::KeyPair {
                username, key_pair, ..
            } => f
                .debug_struct("KeyPair")
                .field("username", username)
                .field("key_pair", key_pair)
                .field("passphrase", &"<redacted>")
                .finish(),
        }
    }
}

// ============================================================================
// Query targets
// ============================================================================

/// Locator passed into query operations; `path` uses forward slashes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Target {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            id: None,
        }
    }

    pub fn with_id(path: impl Into<String>, id: i64) -> Self {
        Self {
            path: path.into(),
            id: Some(id),
        }
    }
}
