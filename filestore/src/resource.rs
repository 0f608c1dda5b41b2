// Normalized description of remote files and folders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempPath;

use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetails {
    pub name: String,
    /// Absolute path on the backend, canonical form
    pub path: String,
    pub parent_path: String,
    pub filestore_id: Option<i64>,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileDetails {
    /// Details derived from a canonical absolute path
    pub fn new(path: &str, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: paths::file_name(path).to_string(),
            path: path.to_string(),
            parent_path: paths::parent_path(path),
            filestore_id: None,
            size,
            modified,
        }
    }

    pub fn with_filestore_id(mut self, filestore_id: i64) -> Self {
        self.filestore_id = Some(filestore_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDetails {
    pub name: String,
    pub path: String,
    pub parent_path: String,
    pub filestore_id: Option<i64>,
    /// Immediate children
    pub content: Vec<ResourceDetails>,
}

/// A remote resource discovered by a query or a tree walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceDetails {
    File(FileDetails),
    Folder(FolderDetails),
}

impl ResourceDetails {
    /// File entry derived from a canonical absolute path
    pub fn file(path: &str, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        ResourceDetails::File(FileDetails::new(path, size, modified))
    }

    /// Folder entry derived from a canonical absolute path
    pub fn folder(path: &str, content: Vec<ResourceDetails>) -> Self {
        ResourceDetails::Folder(FolderDetails {
            name: paths::file_name(path).to_string(),
            path: path.to_string(),
            parent_path: paths::parent_path(path),
            filestore_id: None,
            content,
        })
    }

    /// Stamp the owning filestore on this resource and everything below it
    pub fn with_filestore_id(mut self, filestore_id: i64) -> Self {
        self.set_filestore_id(filestore_id);
        self
    }

    fn set_filestore_id(&mut self, filestore_id: i64) {
        match self {
            ResourceDetails::File(file) => file.filestore_id = Some(filestore_id),
            ResourceDetails::Folder(folder) => {
                folder.filestore_id = Some(filestore_id);
                for child in &mut folder.content {
                    child.set_filestore_id(filestore_id);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceDetails::File(file) => &file.name,
            ResourceDetails::Folder(folder) => &folder.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ResourceDetails::File(file) => &file.path,
            ResourceDetails::Folder(folder) => &folder.path,
        }
    }

    pub fn parent_path(&self) -> &str {
        match self {
            ResourceDetails::File(file) => &file.parent_path,
            ResourceDetails::Folder(folder) => &folder.parent_path,
        }
    }

    pub fn filestore_id(&self) -> Option<i64> {
        match self {
            ResourceDetails::File(file) => file.filestore_id,
            ResourceDetails::Folder(folder) => folder.filestore_id,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, ResourceDetails::Folder(_))
    }

    /// Byte size; folders have none of their own
    pub fn size(&self) -> Option<u64> {
        match self {
            ResourceDetails::File(file) => Some(file.size),
            ResourceDetails::Folder(_) => None,
        }
    }

    /// Sum of all file sizes at and below this resource
    pub fn total_size(&self) -> u64 {
        match self {
            ResourceDetails::File(file) => file.size,
            ResourceDetails::Folder(folder) => {
                folder.content.iter().map(ResourceDetails::total_size).sum()
            }
        }
    }
}

/// A remote file copied to a temporary local file.
/// The local copy is deleted when this value is dropped.
#[derive(Debug)]
pub struct MaterializedFile {
    pub details: FileDetails,
    local: TempPath,
}

impl MaterializedFile {
    pub fn new(details: FileDetails, local: TempPath) -> Self {
        Self { details, local }
    }

    pub fn local_path(&self) -> &Path {
        &self.local
    }

    /// Keep the local copy past the lifetime of this value
    pub fn keep(self) -> std::io::Result<std::path::PathBuf> {
        self.local.keep().map_err(|e| e.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_from_path() {
        let file = ResourceDetails::file("/lab/run1/plate.csv", 42, None);
        assert_eq!(file.name(), "plate.csv");
        assert_eq!(file.parent_path(), "/lab/run1");
        assert_eq!(file.size(), Some(42));
        assert!(!file.is_folder());
    }

    #[test]
    fn test_folder_total_size_and_filestore_stamp() {
        let nested = ResourceDetails::folder(
            "/lab/run1/raw",
            vec![ResourceDetails::file("/lab/run1/raw/a.bin", 10, None)],
        );
        let folder = ResourceDetails::folder(
            "/lab/run1",
            vec![
                ResourceDetails::file("/lab/run1/plate.csv", 5, None),
                nested,
            ],
        )
        .with_filestore_id(3);

        assert_eq!(folder.total_size(), 15);
        assert_eq!(folder.size(), None);
        assert_eq!(folder.filestore_id(), Some(3));
        if let ResourceDetails::Folder(details) = &folder {
            assert!(details.content.iter().all(|c| c.filestore_id() == Some(3)));
        }
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let json = serde_json::to_value(ResourceDetails::file("/a/b.txt", 1, None)).unwrap();
        assert_eq!(json["type"], "file");
        let json = serde_json::to_value(ResourceDetails::folder("/a", vec![])).unwrap();
        assert_eq!(json["type"], "folder");
    }
}
