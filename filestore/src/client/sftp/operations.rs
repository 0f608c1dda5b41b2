// SFTP listing, transfer and delete operations over an open channel

use chrono::{DateTime, Utc};
use ssh2::{FileStat, Sftp};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tracing::{debug, error, info};

use crate::errors::FilestoreError;
use crate::paths;
use crate::resource::FileDetails;
use crate::tree::{RemoteEntry, TreeSource};

fn operation_error(path: &str, what: &str, e: impl std::fmt::Display) -> FilestoreError {
    FilestoreError::connection(path, format!("{}: {}", what, e))
}

fn modified(stat: &FileStat) -> Option<DateTime<Utc>> {
    stat.mtime
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn entry_from_stat(path: &str, stat: &FileStat) -> RemoteEntry {
    RemoteEntry {
        name: paths::file_name(path).to_string(),
        path: path.to_string(),
        is_folder: stat.is_dir(),
        size: stat.size.unwrap_or(0),
        modified: modified(stat),
    }
}

pub fn stat_entry(sftp: &Sftp, path: &str) -> Result<RemoteEntry, FilestoreError> {
    let stat = sftp.stat(Path::new(path)).map_err(|e| {
        debug!(error = %e, path = %path, "Remote stat failed");
        operation_error(path, "File not found", e)
    })?;
    Ok(entry_from_stat(path, &stat))
}

/// Immediate children of a remote directory, `.` and `..` excluded
pub fn list_entries(sftp: &Sftp, path: &str) -> Result<Vec<RemoteEntry>, FilestoreError> {
    let entries = sftp
        .readdir(Path::new(path))
        .map_err(|e| operation_error(path, "Failed to read directory", e))?;

    Ok(entries
        .into_iter()
        .filter_map(|(child, stat)| {
            let name = child.file_name()?.to_str()?.to_string();
            if name == "." || name == ".." {
                return None;
            }
            let child_path = paths::join_canonical(path, &name);
            Some(entry_from_stat(&child_path, &stat))
        })
        .collect())
}

/// Read a whole remote file into memory
pub fn read_file(sftp: &Sftp, path: &str) -> Result<Box<dyn Read + Send>, FilestoreError> {
    let mut remote = sftp
        .open(Path::new(path))
        .map_err(|e| operation_error(path, "Failed to open remote file", e))?;
    let mut buffer = Vec::new();
    remote.read_to_end(&mut buffer).map_err(|e| {
        error!(error = %e, path = %path, "Failed to read file");
        operation_error(path, "Failed to read file", e)
    })?;
    Ok(Box::new(Cursor::new(buffer)))
}

/// Create a remote directory and its missing parents
pub fn create_remote_dirs(sftp: &Sftp, dir: &str) -> Result<(), FilestoreError> {
    if dir.is_empty() || dir == "/" || dir == "." {
        return Ok(());
    }
    if sftp.stat(Path::new(dir)).is_ok_and(|stat| stat.is_dir()) {
        return Ok(());
    }
    let parent = paths::parent_path(dir);
    create_remote_dirs(sftp, &parent)?;

    match sftp.mkdir(Path::new(dir), 0o755) {
        Ok(()) => {
            debug!(dir = %dir, "Created remote directory");
            Ok(())
        }
        // Another writer may have created it in between
        Err(_) if sftp.stat(Path::new(dir)).is_ok_and(|stat| stat.is_dir()) => Ok(()),
        Err(e) => Err(operation_error(dir, "Failed to create directory", e)),
    }
}

/// Upload one local file into `remote_dir`, keeping its file name
pub fn upload_file(sftp: &Sftp, local: &Path, remote_dir: &str) -> Result<FileDetails, FilestoreError> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            FilestoreError::configuration(format!("Local path {} has no file name", local.display()))
        })?;
    let remote_path = paths::join_canonical(remote_dir, name);

    let mut source = File::open(local).map_err(|e| {
        operation_error(&local.display().to_string(), "Failed to open local file", e)
    })?;
    let mut remote = sftp
        .create(Path::new(&remote_path))
        .map_err(|e| operation_error(&remote_path, "Failed to create remote file", e))?;
    let written = io::copy(&mut source, &mut remote)
        .map_err(|e| operation_error(&remote_path, "Failed to write file", e))?;

    info!(local = %local.display(), remote = %remote_path, size = written, "File uploaded");
    Ok(FileDetails::new(&remote_path, written, Some(Utc::now())))
}

pub fn delete_file(sftp: &Sftp, path: &str) -> Result<(), FilestoreError> {
    sftp.unlink(Path::new(path))
        .map_err(|e| operation_error(path, "Failed to delete file", e))?;
    info!(path = %path, "Remote file deleted");
    Ok(())
}

/// Tree source over an open SFTP channel
pub struct SftpTreeSource<'a> {
    sftp: &'a Sftp,
}

impl<'a> SftpTreeSource<'a> {
    pub fn new(sftp: &'a Sftp) -> Self {
        Self { sftp }
    }
}

impl TreeSource for SftpTreeSource<'_> {
    fn resolve_root(&mut self, path: &str) -> Result<RemoteEntry, FilestoreError> {
        stat_entry(self.sftp, path)
    }

    fn list_children(
        &mut self,
        folder: &RemoteEntry,
    ) -> Result<Vec<Result<RemoteEntry, FilestoreError>>, FilestoreError> {
        Ok(list_entries(self.sftp, &folder.path)?
            .into_iter()
            .map(Ok)
            .collect())
    }
}
