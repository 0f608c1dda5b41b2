// libsmbclient-backed SMB engines (feature `smb-native`)
// A pavao context is opened per operation and dropped before returning, so
// no native handle outlives a call.

use chrono::{DateTime, Utc};
use pavao::{
    SmbClient, SmbCredentials as PavaoCredentials, SmbDirentType, SmbError, SmbOpenOptions,
    SmbOptions,
};
use std::io::{Cursor, ErrorKind as IoErrorKind, Read};
use tracing::debug;

use super::smb_engine::{
    SmbAddress, SmbConnectOptions, SmbCredentials, SmbEngineError, SmbEntry, Smb2Engine,
    SmbUrlResolver,
};
use super::smb_legacy::LegacySmbTimeouts;
use crate::paths::{self, PathStyle};

fn translate(err: SmbError, path: &str) -> SmbEngineError {
    match err {
        SmbError::Io(io) => match io.kind() {
            IoErrorKind::NotFound => SmbEngineError::NotFound(path.to_string()),
            IoErrorKind::PermissionDenied => SmbEngineError::AccessDenied(path.to_string()),
            IoErrorKind::ConnectionReset | IoErrorKind::ConnectionAborted => {
                SmbEngineError::Disconnected
            }
            _ => SmbEngineError::Io(io.to_string()),
        },
        other => SmbEngineError::Io(other.to_string()),
    }
}

/// Login failures surface from libsmbclient as permission errors on the first call
fn translate_login(err: SmbError, path: &str) -> SmbEngineError {
    match translate(err, path) {
        SmbEngineError::AccessDenied(message) => SmbEngineError::LogonFailure(message),
        other => other,
    }
}

fn open_client(
    host: &str,
    share: &str,
    credentials: &SmbCredentials,
) -> Result<SmbClient, SmbEngineError> {
    let mut pavao_credentials = PavaoCredentials::default()
        .server(format!("smb://{}", host))
        .share(format!("/{}", share))
        .username(credentials.username.as_str())
        .password(credentials.password.as_str());
    if let Some(domain) = &credentials.domain {
        pavao_credentials = pavao_credentials.workgroup(domain.as_str());
    }
    SmbClient::new(
        pavao_credentials,
        SmbOptions::default().one_share_per_server(true),
    )
    .map_err(|e| translate_login(e, host))
}

/// `sub\docs` -> `/sub/docs`
fn pavao_path(engine_path: &str) -> String {
    let canonical = paths::to_canonical_separator(PathStyle::Backslash, engine_path);
    format!("/{}", paths::strip_leading_separator(&canonical))
}

fn list_dir(client: &SmbClient, path: &str) -> Result<Vec<SmbEntry>, SmbEngineError> {
    let entries = client
        .list_dir(path)
        .map_err(|e| translate(e, path))?
        .into_iter()
        .filter(|dirent| dirent.name() != "." && dirent.name() != "..")
        .filter_map(|dirent| match dirent.get_type() {
            SmbDirentType::Dir => Some(SmbEntry::directory(dirent.name())),
            SmbDirentType::File => {
                let child = paths::join_canonical(path, dirent.name());
                let (size, modified) = client
                    .stat(child.as_str())
                    .map(|stat| (stat.size, Some(DateTime::<Utc>::from(stat.modified))))
                    .unwrap_or((0, None));
                Some(SmbEntry::file(dirent.name(), size, modified))
            }
            _ => None,
        })
        .collect();
    Ok(entries)
}

fn stat_entry(client: &SmbClient, path: &str) -> Result<SmbEntry, SmbEngineError> {
    let name = paths::file_name(path);
    if name.is_empty() {
        return Ok(SmbEntry::directory(""));
    }
    let parent = match paths::parent_path(path) {
        p if p.is_empty() => "/".to_string(),
        p => p,
    };
    list_dir(client, &parent)?
        .into_iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| SmbEngineError::NotFound(path.to_string()))
}

fn read_all(client: &SmbClient, path: &str) -> Result<Box<dyn Read + Send>, SmbEngineError> {
    let mut file = client
        .open_with(path, SmbOpenOptions::default().read(true))
        .map_err(|e| translate(e, path))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .map_err(|e| SmbEngineError::Io(e.to_string()))?;
    Ok(Box::new(Cursor::new(buffer)))
}

/// SMB2/3 engine over libsmbclient
#[derive(Debug, Default)]
pub struct PavaoSmb2Engine {
    host: Option<String>,
    credentials: Option<SmbCredentials>,
    share: Option<String>,
}

impl PavaoSmb2Engine {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<SmbClient, SmbEngineError> {
        match (&self.host, &self.share, &self.credentials) {
            (Some(host), Some(share), Some(credentials)) => open_client(host, share, credentials),
            _ => Err(SmbEngineError::Disconnected),
        }
    }
}

impl Smb2Engine for PavaoSmb2Engine {
    fn connect(&mut self, host: &str, options: &SmbConnectOptions) -> Result<(), SmbEngineError> {
        // libsmbclient timeouts and DFS come from smb.conf; pavao has no per-context switch
        debug!(
            host = %host,
            dfs = options.dfs_enabled,
            connect_timeout_ms = options.connect_timeout.as_millis() as u64,
            "Preparing libsmbclient context"
        );
        self.host = Some(host.to_string());
        Ok(())
    }

    fn authenticate(&mut self, credentials: &SmbCredentials) -> Result<(), SmbEngineError> {
        self.credentials = Some(credentials.clone());
        Ok(())
    }

    fn connect_share(&mut self, share: &str) -> Result<(), SmbEngineError> {
        self.share = Some(share.to_string());
        let client = self.client()?;
        client
            .list_dir("/")
            .map(|_| ())
            .map_err(|e| translate_login(e, share))
    }

    fn is_connected(&self) -> bool {
        self.host.is_some() && self.share.is_some() && self.credentials.is_some()
    }

    fn list(&mut self, path: &str) -> Result<Vec<SmbEntry>, SmbEngineError> {
        let client = self.client()?;
        list_dir(&client, &pavao_path(path))
    }

    fn stat(&mut self, path: &str) -> Result<SmbEntry, SmbEngineError> {
        let client = self.client()?;
        stat_entry(&client, &pavao_path(path))
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>, SmbEngineError> {
        let client = self.client()?;
        read_all(&client, &pavao_path(path))
    }

    fn disconnect(&mut self) {
        self.host = None;
        self.credentials = None;
        self.share = None;
    }
}

/// SMB1 URL resolver over libsmbclient
#[derive(Debug, Default)]
pub struct PavaoUrlResolver;

impl PavaoUrlResolver {
    fn open(
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<(SmbClient, String), SmbEngineError> {
        let address = SmbAddress::parse(url).map_err(|e| SmbEngineError::Io(e.to_string()))?;
        let share = address
            .share
            .as_deref()
            .ok_or_else(|| SmbEngineError::NotFound(url.to_string()))?;
        debug!(url = %url, connect_timeout_ms = timeouts.connect.as_millis() as u64, "Resolving SMB URL");
        let client = open_client(&address.host, share, principal)?;
        Ok((client, format!("/{}", address.sub_path)))
    }
}

impl SmbUrlResolver for PavaoUrlResolver {
    fn stat(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<SmbEntry, SmbEngineError> {
        let (client, path) = Self::open(url, principal, timeouts)?;
        stat_entry(&client, &path)
    }

    fn list(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<Vec<Result<SmbEntry, SmbEngineError>>, SmbEngineError> {
        let (client, path) = Self::open(url, principal, timeouts)?;
        Ok(list_dir(&client, &path)?.into_iter().map(Ok).collect())
    }

    fn open_read(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        timeouts: &LegacySmbTimeouts,
    ) -> Result<Box<dyn Read + Send>, SmbEngineError> {
        let (client, path) = Self::open(url, principal, timeouts)?;
        read_all(&client, &path)
    }
}
