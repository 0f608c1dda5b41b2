// In-memory filestore backends for end-to-end scenarios
// Each double records the calls it receives in a shared log

use chrono::{DateTime, Utc};
use filestore::client::irods::{IrodsAccount, IrodsError, IrodsGateway, IrodsObject};
use filestore::client::smb_engine::{SmbConnectOptions, SmbCredentials};
use filestore::client::smb_legacy::LegacySmbTimeouts;
use filestore::client::{Smb2Engine, SmbEngineError, SmbEntry, SmbUrlResolver};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[derive(Clone)]
struct Node {
    is_dir: bool,
    content: Vec<u8>,
    modified: Option<DateTime<Utc>>,
    broken: bool,
}

/// Nodes keyed by path; `separator` splits parents from names
#[derive(Clone)]
struct NodeTree {
    separator: char,
    root: String,
    nodes: BTreeMap<String, Node>,
}

impl NodeTree {
    fn new(separator: char, root: &str) -> Self {
        Self {
            separator,
            root: root.to_string(),
            nodes: BTreeMap::new(),
        }
    }

    fn insert(&mut self, path: &str, node: Node) {
        self.nodes.insert(path.to_string(), node);
    }

    fn name_of<'p>(&self, path: &'p str) -> &'p str {
        path.rsplit(self.separator).next().unwrap_or(path)
    }

    fn parent_of(&self, path: &str) -> String {
        match path.rfind(self.separator) {
            Some(0) if self.root.len() == 1 => self.root.clone(),
            Some(idx) => path[..idx].to_string(),
            None => self.root.clone(),
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        path == self.root || self.nodes.get(path).is_some_and(|n| n.is_dir)
    }

    fn children(&self, path: &str) -> Option<Vec<(&String, &Node)>> {
        if !self.is_dir(path) {
            return None;
        }
        Some(
            self.nodes
                .iter()
                .filter(|(child, _)| child.as_str() != self.root && self.parent_of(child) == path)
                .collect(),
        )
    }

    fn entry(&self, path: &str, node: &Node) -> SmbEntry {
        let name = self.name_of(path);
        if node.is_dir {
            SmbEntry::directory(name)
        } else {
            SmbEntry::file(name, node.content.len() as u64, node.modified)
        }
    }
}

fn file_node(content: &[u8], modified: Option<DateTime<Utc>>) -> Node {
    Node {
        is_dir: false,
        content: content.to_vec(),
        modified,
        broken: false,
    }
}

fn dir_node() -> Node {
    Node {
        is_dir: true,
        content: Vec::new(),
        modified: None,
        broken: false,
    }
}

// ============================================================================
// SMB2/3 share
// ============================================================================

/// One share served over SMB2/3; engine paths are share-relative with backslashes
#[derive(Clone)]
pub struct FakeShare {
    tree: NodeTree,
    log: CallLog,
    connected: bool,
}

impl FakeShare {
    pub fn new(log: CallLog) -> Self {
        Self {
            tree: NodeTree::new('\\', ""),
            log,
            connected: false,
        }
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.tree.insert(path, dir_node());
        self
    }

    pub fn file(mut self, path: &str, content: &[u8], modified: Option<DateTime<Utc>>) -> Self {
        self.tree.insert(path, file_node(content, modified));
        self
    }
}

impl Smb2Engine for FakeShare {
    fn connect(&mut self, host: &str, _options: &SmbConnectOptions) -> Result<(), SmbEngineError> {
        self.log.push(format!("connect:{}", host));
        Ok(())
    }

    fn authenticate(&mut self, credentials: &SmbCredentials) -> Result<(), SmbEngineError> {
        self.log.push(format!("auth:{}", credentials.username));
        if credentials.password == "wrong" {
            return Err(SmbEngineError::LogonFailure(format!(
                "bad password for {}",
                credentials.username
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn connect_share(&mut self, share: &str) -> Result<(), SmbEngineError> {
        self.log.push(format!("share:{}", share));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn list(&mut self, path: &str) -> Result<Vec<SmbEntry>, SmbEngineError> {
        self.log.push(format!("list:{}", path));
        let children = self
            .tree
            .children(path)
            .ok_or_else(|| SmbEngineError::NotFound(path.to_string()))?;
        Ok(children
            .into_iter()
            .map(|(child, node)| self.tree.entry(child, node))
            .collect())
    }

    fn stat(&mut self, path: &str) -> Result<SmbEntry, SmbEngineError> {
        self.log.push(format!("stat:{}", path));
        self.tree
            .nodes
            .get(path)
            .map(|node| self.tree.entry(path, node))
            .ok_or_else(|| SmbEngineError::NotFound(path.to_string()))
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>, SmbEngineError> {
        self.log.push(format!("read:{}", path));
        match self.tree.nodes.get(path) {
            Some(node) if !node.is_dir => Ok(Box::new(Cursor::new(node.content.clone()))),
            _ => Err(SmbEngineError::NotFound(path.to_string())),
        }
    }

    fn disconnect(&mut self) {
        self.log.push("disconnect".to_string());
        self.connected = false;
    }
}

// ============================================================================
// SMB1 URL tree
// ============================================================================

/// Paths below `base_url`, canonical absolute (`/docs/a.txt`)
#[derive(Clone)]
pub struct FakeUrlTree {
    base_url: String,
    tree: NodeTree,
    log: CallLog,
}

impl FakeUrlTree {
    pub fn new(base_url: &str, log: CallLog) -> Self {
        Self {
            base_url: base_url.to_string(),
            tree: NodeTree::new('/', "/"),
            log,
        }
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.tree.insert(path, dir_node());
        self
    }

    pub fn file(mut self, path: &str, content: &[u8], modified: Option<DateTime<Utc>>) -> Self {
        self.tree.insert(path, file_node(content, modified));
        self
    }

    /// An entry whose attributes cannot be read
    pub fn broken(mut self, path: &str) -> Self {
        let mut node = file_node(b"", None);
        node.broken = true;
        self.tree.insert(path, node);
        self
    }

    fn path_of(&self, url: &str) -> Result<String, SmbEngineError> {
        let rest = url
            .strip_prefix(&self.base_url)
            .ok_or_else(|| SmbEngineError::AccessDenied(url.to_string()))?;
        Ok(format!("/{}", rest.trim_end_matches('/')))
    }
}

impl SmbUrlResolver for FakeUrlTree {
    fn stat(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        _timeouts: &LegacySmbTimeouts,
    ) -> Result<SmbEntry, SmbEngineError> {
        self.log.push(format!("stat:{}", url));
        if principal.password == "wrong" {
            return Err(SmbEngineError::LogonFailure(principal.username.clone()));
        }
        let path = self.path_of(url)?;
        match self.tree.nodes.get(&path) {
            Some(node) if !node.broken => Ok(self.tree.entry(&path, node)),
            _ => Err(SmbEngineError::NotFound(path)),
        }
    }

    fn list(
        &mut self,
        url: &str,
        principal: &SmbCredentials,
        _timeouts: &LegacySmbTimeouts,
    ) -> Result<Vec<Result<SmbEntry, SmbEngineError>>, SmbEngineError> {
        self.log.push(format!("list:{}", url));
        if principal.password == "wrong" {
            return Err(SmbEngineError::LogonFailure(principal.username.clone()));
        }
        let path = self.path_of(url)?;
        let children = self
            .tree
            .children(&path)
            .ok_or_else(|| SmbEngineError::NotFound(path.clone()))?;
        Ok(children
            .into_iter()
            .map(|(child, node)| {
                if node.broken {
                    Err(SmbEngineError::AccessDenied(child.clone()))
                } else {
                    Ok(self.tree.entry(child, node))
                }
            })
            .collect())
    }

    fn open_read(
        &mut self,
        url: &str,
        _principal: &SmbCredentials,
        _timeouts: &LegacySmbTimeouts,
    ) -> Result<Box<dyn Read + Send>, SmbEngineError> {
        self.log.push(format!("read:{}", url));
        let path = self.path_of(url)?;
        match self.tree.nodes.get(&path) {
            Some(node) if !node.is_dir => Ok(Box::new(Cursor::new(node.content.clone()))),
            _ => Err(SmbEngineError::NotFound(path)),
        }
    }
}

// ============================================================================
// iRODS zone
// ============================================================================

#[derive(Clone)]
pub struct FakeZone {
    password: String,
    tree: NodeTree,
    log: CallLog,
    token: bool,
}

impl FakeZone {
    pub fn new(password: &str, log: CallLog) -> Self {
        Self {
            password: password.to_string(),
            tree: NodeTree::new('/', "/"),
            log,
            token: false,
        }
    }

    pub fn collection(mut self, path: &str) -> Self {
        self.tree.insert(path, dir_node());
        self
    }

    pub fn data_object(mut self, path: &str, content: &[u8], modified: Option<DateTime<Utc>>) -> Self {
        self.tree.insert(path, file_node(content, modified));
        self
    }

    fn object(&self, path: &str, node: &Node) -> IrodsObject {
        IrodsObject {
            path: path.to_string(),
            is_collection: node.is_dir,
            size: node.content.len() as u64,
            modified: node.modified,
        }
    }

    fn require_token(&self) -> Result<(), IrodsError> {
        if self.token {
            Ok(())
        } else {
            Err(IrodsError::Unauthorized("no session".to_string()))
        }
    }
}

impl IrodsGateway for FakeZone {
    fn authenticate(&mut self, account: &IrodsAccount) -> Result<(), IrodsError> {
        self.log.push(format!("authenticate:{}@{}", account.username, account.zone));
        if account.password != self.password {
            return Err(IrodsError::Unauthorized(account.username.clone()));
        }
        self.token = true;
        Ok(())
    }

    fn stat(&mut self, logical_path: &str) -> Result<IrodsObject, IrodsError> {
        self.require_token()?;
        self.log.push(format!("stat:{}", logical_path));
        self.tree
            .nodes
            .get(logical_path)
            .map(|node| self.object(logical_path, node))
            .ok_or_else(|| IrodsError::NotFound(logical_path.to_string()))
    }

    fn list_collection(&mut self, logical_path: &str) -> Result<Vec<IrodsObject>, IrodsError> {
        self.require_token()?;
        self.log.push(format!("list:{}", logical_path));
        let children = self
            .tree
            .children(logical_path)
            .ok_or_else(|| IrodsError::NotFound(logical_path.to_string()))?;
        Ok(children
            .into_iter()
            .map(|(path, node)| self.object(path, node))
            .collect())
    }

    fn read(&mut self, logical_path: &str) -> Result<Box<dyn Read + Send>, IrodsError> {
        self.require_token()?;
        self.log.push(format!("read:{}", logical_path));
        match self.tree.nodes.get(logical_path) {
            Some(node) if !node.is_dir => Ok(Box::new(Cursor::new(node.content.clone()))),
            _ => Err(IrodsError::NotFound(logical_path.to_string())),
        }
    }

    fn close(&mut self) {
        self.log.push("close".to_string());
        self.token = false;
    }
}
