// Path canonicalization between backend-native and canonical (forward-slash) forms

use serde::{Deserialize, Serialize};

pub const CANONICAL_SEPARATOR: char = '/';

/// Separator convention used natively by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// SFTP and iRODS
    Slash,
    /// SMB family
    Backslash,
}

impl PathStyle {
    pub fn separator(&self) -> char {
        match self {
            PathStyle::Slash => '/',
            PathStyle::Backslash => '\\',
        }
    }
}

/// A user's saved folder that logic paths are expressed relative to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRootFolder {
    pub id: i64,
    /// Absolute path of the folder, canonical form
    pub path: String,
}

impl UserRootFolder {
    pub fn new(id: i64, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

pub fn to_native_separator(style: PathStyle, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    match style {
        PathStyle::Slash => path.to_string(),
        PathStyle::Backslash => path.replace(CANONICAL_SEPARATOR, "\\"),
    }
}

pub fn to_canonical_separator(style: PathStyle, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    match style {
        PathStyle::Slash => path.to_string(),
        PathStyle::Backslash => path.replace('\\', "/"),
    }
}

pub fn strip_leading_separator(path: &str) -> &str {
    path.trim_start_matches(['/', '\\'])
}

/// Append `name` to `base`, adding a `/` between them when `base` lacks one.
/// Used to build `smb://` URLs, which always take forward slashes.
pub fn join_native(base: &str, name: &str) -> String {
    let mut joined = String::with_capacity(base.len() + name.len() + 1);
    joined.push_str(base);
    if !joined.ends_with(CANONICAL_SEPARATOR) {
        joined.push(CANONICAL_SEPARATOR);
    }
    joined.push_str(&to_canonical_separator(PathStyle::Backslash, name));
    joined
}

/// Join two canonical path fragments with exactly one separator between them
pub fn join_canonical(base: &str, name: &str) -> String {
    let name = strip_leading_separator(name);
    if base.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches(CANONICAL_SEPARATOR), name)
}

/// Express `absolute_path` relative to the user's root folder.
///
/// Returns `"<rootId>:<suffix>"` only when the root folder path is a strict
/// prefix of the absolute path; otherwise the absolute path is returned as is.
pub fn compute_logic_path(absolute_path: &str, root: Option<&UserRootFolder>) -> String {
    let Some(root) = root else {
        return absolute_path.to_string();
    };
    match absolute_path.strip_prefix(root.path.as_str()) {
        Some(suffix) if !suffix.is_empty() => format!("{}:{}", root.id, suffix),
        _ => absolute_path.to_string(),
    }
}

/// Canonical parent of a canonical path; empty for top-level entries
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches(CANONICAL_SEPARATOR);
    match trimmed.rfind(CANONICAL_SEPARATOR) {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Last segment of a canonical path
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(CANONICAL_SEPARATOR);
    match trimmed.rfind(CANONICAL_SEPARATOR) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Dot-prefixed names are hidden on every backend
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
