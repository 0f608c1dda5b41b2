// SFTP connection management
// TCP connect with timeout, handshake, host key check, then authentication

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use ssh2::{HashType, Session, Sftp};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::errors::FilestoreError;
use crate::models::{Credentials, FilestoreKind};

const DEFAULT_PORT: u16 = 22;
const KIND: FilestoreKind = FilestoreKind::Sftp;

/// Host, port and optional base directory parsed from a filestore address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpEndpoint {
    pub host: String,
    pub port: u16,
    /// Directory relative targets resolve under; the login directory when unset
    pub base_dir: Option<String>,
}

impl SftpEndpoint {
    /// Accepts `host`, `host:port`, `host:port/base` and `sftp://` forms
    pub fn parse(address: &str) -> Result<Self, FilestoreError> {
        let trimmed = address.trim();
        let without_scheme = trimmed
            .strip_prefix("sftp://")
            .or_else(|| trimmed.strip_prefix("SFTP://"))
            .unwrap_or(trimmed);
        let (authority, base_dir) = match without_scheme.find('/') {
            Some(idx) => (&without_scheme[..idx], Some(&without_scheme[idx..])),
            None => (without_scheme, None),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    FilestoreError::configuration(format!(
                        "Invalid SFTP port in '{}': {}",
                        address, e
                    ))
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(FilestoreError::configuration(format!(
                "SFTP address '{}' has no host",
                address
            )));
        }
        let base_dir = base_dir
            .map(|dir| dir.trim_end_matches('/'))
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);
        Ok(Self {
            host: host.to_string(),
            port,
            base_dir,
        })
    }
}

/// Live SSH session with its SFTP channel
pub struct SftpConnection {
    session: Session,
    sftp: Sftp,
    _tcp: TcpStream,
}

impl SftpConnection {
    /// Establish an authenticated SFTP channel.
    /// `expected_host_key` is the configured `sftpServerPublicKey`, if any.
    #[instrument(skip(credentials, expected_host_key), fields(host = %endpoint.host, port = endpoint.port))]
    pub fn connect(
        endpoint: &SftpEndpoint,
        credentials: &Credentials,
        expected_host_key: Option<&str>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, FilestoreError> {
        let target = format!("{}:{}", endpoint.host, endpoint.port);
        let connection_error = |message: String| FilestoreError::connection(&target, message);

        info!("Establishing SFTP connection");
        let addr = target
            .to_socket_addrs()
            .map_err(|e| connection_error(format!("Cannot resolve host: {}", e)))?
            .next()
            .ok_or_else(|| connection_error("Host resolved to no address".to_string()))?;

        let tcp = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|e| {
            error!(error = %e, "Failed to connect");
            connection_error(format!("Failed to connect: {}", e))
        })?;
        tcp.set_read_timeout(Some(read_timeout))
            .map_err(|e| connection_error(format!("Failed to set read timeout: {}", e)))?;
        tcp.set_write_timeout(Some(read_timeout))
            .map_err(|e| connection_error(format!("Failed to set write timeout: {}", e)))?;

        let mut session = Session::new()
            .map_err(|e| connection_error(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(
            tcp.try_clone()
                .map_err(|e| connection_error(format!("Failed to clone TCP stream: {}", e)))?,
        );
        session.set_timeout(u32::try_from(read_timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake().map_err(|e| {
            error!(error = %e, "SSH handshake failed");
            connection_error(format!("SSH handshake failed: {}", e))
        })?;

        if let Some(expected) = expected_host_key {
            verify_host_key(&session, expected, &target)?;
        }

        authenticate(&session, credentials)?;
        if !session.authenticated() {
            error!("Session not authenticated after authentication call");
            return Err(FilestoreError::auth(KIND, "Authentication failed"));
        }

        let sftp = session
            .sftp()
            .map_err(|e| connection_error(format!("Failed to open SFTP channel: {}", e)))?;

        info!(username = %credentials.username(), "SFTP connection established");
        Ok(Self {
            session,
            sftp,
            _tcp: tcp,
        })
    }

    pub fn sftp(&self) -> &Sftp {
        &self.sftp
    }

    /// Keepalive round trip; false once the transport is gone
    pub fn is_alive(&self) -> bool {
        self.session.keepalive_send().is_ok()
    }

    pub fn disconnect(&self) {
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            debug!(error = %e, "SSH disconnect reported an error");
        }
    }
}

fn verify_host_key(session: &Session, expected: &str, target: &str) -> Result<(), FilestoreError> {
    let (raw_key, _key_type) = session
        .host_key()
        .ok_or_else(|| FilestoreError::connection(target, "Server presented no host key"))?;
    let sha256 = session.host_key_hash(HashType::Sha256).unwrap_or_default();

    if host_key_matches(expected, sha256, raw_key)? {
        debug!("Host key verified");
        Ok(())
    } else {
        error!(
            presented = %format!("SHA256:{}", STANDARD_NO_PAD.encode(sha256)),
            "Host key mismatch"
        );
        Err(FilestoreError::connection(
            target,
            "Server host key does not match the configured key",
        ))
    }
}

/// Compare a configured host key against the one the server presented.
///
/// The configured value may be an OpenSSH public key line (`ssh-ed25519 AAAA...`),
/// an OpenSSH fingerprint (`SHA256:base64`) or a hex SHA-256 digest with or
/// without colons.
pub fn host_key_matches(
    expected: &str,
    sha256: &[u8],
    raw_key: &[u8],
) -> Result<bool, FilestoreError> {
    let expected = expected.trim();
    let invalid = |reason: String| {
        FilestoreError::configuration(format!("Invalid sftpServerPublicKey: {}", reason))
    };

    if let Some(fingerprint) = expected.strip_prefix("SHA256:") {
        let digest = STANDARD_NO_PAD
            .decode(fingerprint.trim_end_matches('='))
            .map_err(|e| invalid(e.to_string()))?;
        return Ok(digest == sha256);
    }

    let mut fields = expected.split_whitespace();
    if let (Some(_key_type), Some(blob)) = (fields.next(), fields.next()) {
        let key = STANDARD.decode(blob).map_err(|e| invalid(e.to_string()))?;
        return Ok(key == raw_key);
    }

    let digest = hex::decode(expected.replace(':', "")).map_err(|e| invalid(e.to_string()))?;
    Ok(digest == sha256)
}

fn authenticate(session: &Session, credentials: &Credentials) -> Result<(), FilestoreError> {
    match credentials {
        Credentials::Password { username, password } => {
            debug!(username = %username, "Authenticating with password");
            session.userauth_password(username, password).map_err(|e| {
                error!(error = %e, username = %username, "Password authentication failed");
                FilestoreError::auth(
                    KIND,
                    format!("Password authentication failed for user {}: {}", username, e),
                )
            })
        }
        Credentials::KeyPair {
            username,
            key_pair,
            passphrase,
        } => {
            debug!(username = %username, "Authenticating with key pair");
            session
                .userauth_pubkey_memory(
                    username,
                    Some(key_pair.public_key.as_str()),
                    &key_pair.private_key,
                    passphrase.as_deref(),
                )
                .map_err(|e| {
                    error!(error = %e, username = %username, "Key pair authentication failed");
                    FilestoreError::auth(
                        KIND,
                        format!("Key pair authentication failed for user {}: {}", username, e),
                    )
                })
        }
    }
}
