// Error handling for the filestore client layer
// Native protocol errors are translated into FilestoreError at the client boundary

use crate::models::FilestoreKind;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Coarse error classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Auth,
    Connection,
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Auth => "auth",
            ErrorKind::Connection => "connection",
            ErrorKind::Unsupported => "unsupported",
        };
        f.write_str(label)
    }
}

/// Errors produced by remote clients, the factory and authentication strategies
#[derive(Error, Debug)]
pub enum FilestoreError {
    #[error("Invalid filestore configuration: {0}")]
    Configuration(String),

    #[error("Authentication rejected by {kind} backend: {message}")]
    Auth {
        kind: FilestoreKind,
        message: String,
    },

    #[error("Cannot reach '{path}': {message}")]
    Connection { path: String, message: String },

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl FilestoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        FilestoreError::Configuration(message.into())
    }

    pub fn auth(kind: FilestoreKind, message: impl Into<String>) -> Self {
        FilestoreError::Auth {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(path: impl Into<String>, message: impl Into<String>) -> Self {
        FilestoreError::Connection {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        FilestoreError::Unsupported(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FilestoreError::Configuration(_) => ErrorKind::Configuration,
            FilestoreError::Auth { .. } => ErrorKind::Auth,
            FilestoreError::Connection { .. } => ErrorKind::Connection,
            FilestoreError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Whether asking the user again (or retrying later) can change the outcome
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilestoreError::Auth { .. } | FilestoreError::Connection { .. }
        )
    }
}

/// Localizable message codes handed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    NoUsername,
    NoPassword,
    NoPublicKey,
    AuthFailed(FilestoreKind),
}

impl MessageCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCode::NoUsername => "netfilestores.login.error.no.username",
            MessageCode::NoPassword => "netfilestores.login.error.no.password",
            MessageCode::NoPublicKey => "netfilestores.login.error.no.publickey",
            MessageCode::AuthFailed(FilestoreKind::SmbLegacy) => {
                "netfilestores.login.error.auth.smb"
            }
            MessageCode::AuthFailed(FilestoreKind::Smb2) => "netfilestores.login.error.auth.samba",
            MessageCode::AuthFailed(FilestoreKind::Sftp) => "netfilestores.login.error.auth.sftp",
            MessageCode::AuthFailed(FilestoreKind::Irods) => "netfilestores.login.error.auth.irods",
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Credential validation failures, raised before any client is built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CredentialError {
    pub code: MessageCode,
    pub message: String,
}

impl CredentialError {
    pub fn new(code: MessageCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error payload for callers that render failures to users
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub kind: Option<ErrorKind>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: None,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<&FilestoreError> for ErrorResponse {
    fn from(err: &FilestoreError) -> Self {
        let code = match err {
            FilestoreError::Configuration(_) => "FILESTORE_MISCONFIGURED".to_string(),
            FilestoreError::Auth { kind, .. } => MessageCode::AuthFailed(*kind).to_string(),
            FilestoreError::Connection { .. } => "FILESTORE_UNREACHABLE".to_string(),
            FilestoreError::Unsupported(_) => "FILESTORE_UNSUPPORTED".to_string(),
        };
        let mut response = ErrorResponse::new(code, err.to_string());
        response.kind = Some(err.kind());
        if let FilestoreError::Connection { path, .. } = err {
            response = response.with_path(path.clone());
        }
        response
    }
}

impl From<FilestoreError> for ErrorResponse {
    fn from(err: FilestoreError) -> Self {
        ErrorResponse::from(&err)
    }
}

impl From<CredentialError> for ErrorResponse {
    fn from(err: CredentialError) -> Self {
        ErrorResponse::new(err.code.as_str(), err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FilestoreError::configuration("no address").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            FilestoreError::auth(FilestoreKind::Sftp, "denied").kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            FilestoreError::connection("/a", "timeout").kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            FilestoreError::unsupported("delete").kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn test_unsupported_is_not_recoverable() {
        assert!(!FilestoreError::unsupported("upload").is_recoverable());
        assert!(FilestoreError::connection("/x", "reset").is_recoverable());
    }

    #[test]
    fn test_connection_error_mentions_path() {
        let err = FilestoreError::connection("share/docs", "host unreachable");
        assert!(err.to_string().contains("share/docs"));
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, "FILESTORE_UNREACHABLE");
        assert_eq!(response.path.as_deref(), Some("share/docs"));
    }

    #[test]
    fn test_auth_error_response_uses_backend_code() {
        let err = FilestoreError::auth(FilestoreKind::Irods, "bad password");
        let response: ErrorResponse = err.into();
        assert_eq!(response.code, "netfilestores.login.error.auth.irods");
        assert_eq!(response.kind, Some(ErrorKind::Auth));
    }

    #[test]
    fn test_credential_error_response() {
        let err = CredentialError::new(MessageCode::NoPassword, "Password is required");
        let response: ErrorResponse = err.into();
        assert_eq!(response.code, "netfilestores.login.error.no.password");
    }
}
