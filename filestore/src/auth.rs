// Authentication strategies for filestore logins
// Validate the user's credential material, then hand it to the client factory

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::client::RemoteClient;
use crate::errors::{CredentialError, ErrorKind, ErrorResponse, FilestoreError, MessageCode};
use crate::factory::ClientFactory;
use crate::models::{AuthKind, Credentials, FilestoreConfig, FilestoreKind, UserKeyPair};

/// One login attempt by an ELN user against a filestore
#[derive(Clone, Default)]
pub struct LoginRequest {
    /// The ELN user on whose behalf the login happens
    pub acting_user: String,
    /// Remote account name
    pub username: String,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn new(acting_user: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            acting_user: acting_user.into(),
            username: username.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("acting_user", &self.acting_user)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Filestore(#[from] FilestoreError),
}

impl LoginError {
    /// Code shown to the user; the strategy's auth code only when the backend rejected the login
    pub fn message_code(&self, strategy: &dyn AuthenticationStrategy, kind: FilestoreKind) -> String {
        match self {
            LoginError::Credentials(e) => e.code.to_string(),
            LoginError::Filestore(e) if e.kind() == ErrorKind::Auth => {
                strategy.message_code_for_auth_exception(kind).to_string()
            }
            LoginError::Filestore(e) => ErrorResponse::from(e).code,
        }
    }
}

impl From<LoginError> for ErrorResponse {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Credentials(e) => e.into(),
            LoginError::Filestore(e) => e.into(),
        }
    }
}

/// How a user proves their identity to a filestore
pub trait AuthenticationStrategy: Send + Sync {
    fn auth_kind(&self) -> AuthKind;

    /// Check the request carries usable credential material, without network access
    fn validate_credentials(&self, request: &LoginRequest) -> Result<(), CredentialError>;

    /// Validate, then build a client through the factory
    fn login(
        &self,
        factory: &ClientFactory,
        config: &FilestoreConfig,
        request: &LoginRequest,
    ) -> Result<Box<dyn RemoteClient>, LoginError>;

    /// Message code shown when the backend rejects the credentials
    fn message_code_for_auth_exception(&self, kind: FilestoreKind) -> MessageCode {
        MessageCode::AuthFailed(kind)
    }
}

fn require_username(request: &LoginRequest) -> Result<(), CredentialError> {
    if request.username.trim().is_empty() {
        return Err(CredentialError::new(
            MessageCode::NoUsername,
            "A username is required to log in to the filestore",
        ));
    }
    Ok(())
}

// ============================================================================
// Password
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordAuthStrategy;

impl AuthenticationStrategy for PasswordAuthStrategy {
    fn auth_kind(&self) -> AuthKind {
        AuthKind::Password
    }

    fn validate_credentials(&self, request: &LoginRequest) -> Result<(), CredentialError> {
        require_username(request)?;
        match request.password.as_deref() {
            Some(password) if !password.is_empty() => Ok(()),
            _ => Err(CredentialError::new(
                MessageCode::NoPassword,
                "A password is required to log in to the filestore",
            )),
        }
    }

    #[instrument(skip(self, factory, config, request), fields(filestore_id = config.id, kind = %config.kind))]
    fn login(
        &self,
        factory: &ClientFactory,
        config: &FilestoreConfig,
        request: &LoginRequest,
    ) -> Result<Box<dyn RemoteClient>, LoginError> {
        self.validate_credentials(request)?;
        let credentials = Credentials::password(
            request.username.trim(),
            request.password.clone().unwrap_or_default(),
        );
        debug!(username = %request.username, "Password login");
        Ok(factory.create_client(config, credentials)?)
    }
}

// ============================================================================
// Public key
// ============================================================================

/// A registered key pair with its optional passphrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeyPair {
    pub key_pair: UserKeyPair,
    pub passphrase: Option<String>,
}

/// Lookup of SSH key pairs registered by ELN users
pub trait KeyPairStore: Send + Sync {
    fn key_pair_for(&self, acting_user: &str) -> Option<StoredKeyPair>;
}

/// In-memory key pair store
#[derive(Debug, Default)]
pub struct StaticKeyPairStore {
    pairs: RwLock<HashMap<String, StoredKeyPair>>,
}

impl StaticKeyPairStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        acting_user: impl Into<String>,
        key_pair: UserKeyPair,
        passphrase: Option<String>,
    ) {
        let mut pairs = match self.pairs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pairs.insert(
            acting_user.into(),
            StoredKeyPair {
                key_pair,
                passphrase,
            },
        );
    }

    pub fn remove(&self, acting_user: &str) -> Option<StoredKeyPair> {
        match self.pairs.write() {
            Ok(mut guard) => guard.remove(acting_user),
            Err(poisoned) => poisoned.into_inner().remove(acting_user),
        }
    }
}

impl KeyPairStore for StaticKeyPairStore {
    fn key_pair_for(&self, acting_user: &str) -> Option<StoredKeyPair> {
        match self.pairs.read() {
            Ok(guard) => guard.get(acting_user).cloned(),
            Err(poisoned) => poisoned.into_inner().get(acting_user).cloned(),
        }
    }
}

pub struct PublicKeyAuthStrategy {
    store: Arc<dyn KeyPairStore>,
}

impl PublicKeyAuthStrategy {
    pub fn new(store: Arc<dyn KeyPairStore>) -> Self {
        Self { store }
    }

    fn registered_pair(&self, request: &LoginRequest) -> Result<StoredKeyPair, CredentialError> {
        self.store
            .key_pair_for(&request.acting_user)
            .filter(|stored| !stored.key_pair.private_key.trim().is_empty())
            .ok_or_else(|| {
                CredentialError::new(
                    MessageCode::NoPublicKey,
                    format!("User {} has no registered key pair", request.acting_user),
                )
            })
    }
}

impl AuthenticationStrategy for PublicKeyAuthStrategy {
    fn auth_kind(&self) -> AuthKind {
        AuthKind::PublicKey
    }

    fn validate_credentials(&self, request: &LoginRequest) -> Result<(), CredentialError> {
        require_username(request)?;
        self.registered_pair(request).map(|_| ())
    }

    #[instrument(skip(self, factory, config, request), fields(filestore_id = config.id, kind = %config.kind))]
    fn login(
        &self,
        factory: &ClientFactory,
        config: &FilestoreConfig,
        request: &LoginRequest,
    ) -> Result<Box<dyn RemoteClient>, LoginError> {
        if !config.kind.supports_public_key() {
            warn!("Public key login requested for a backend without key support");
            return Err(FilestoreError::unsupported(format!(
                "Public key authentication is not available for {} filestores",
                config.kind
            ))
            .into());
        }
        require_username(request)?;
        let stored = self.registered_pair(request)?;
        let credentials = Credentials::KeyPair {
            username: request.username.trim().to_string(),
            key_pair: stored.key_pair,
            passphrase: stored.passphrase,
        };
        debug!(username = %request.username, acting_user = %request.acting_user, "Key pair login");
        Ok(factory.create_client(config, credentials)?)
    }
}

/// Strategy for a filestore's configured authentication kind
pub fn strategy_for(
    auth_kind: AuthKind,
    store: Arc<dyn KeyPairStore>,
) -> Box<dyn AuthenticationStrategy> {
    match auth_kind {
        AuthKind::Password => Box::new(PasswordAuthStrategy),
        AuthKind::PublicKey => Box::new(PublicKeyAuthStrategy::new(store)),
    }
}
