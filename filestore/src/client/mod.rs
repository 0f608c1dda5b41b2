// Remote client module
// One capability trait over the SMB, SFTP and iRODS backends

pub mod irods;
pub mod sftp;
pub mod smb2;
pub mod smb_engine;
pub mod smb_legacy;
#[cfg(feature = "smb-native")]
pub mod smb_native;

pub use irods::IrodsClient;
pub use sftp::SftpClient;
pub use smb2::Smb2Client;
pub use smb_engine::{Smb2Engine, SmbEngineError, SmbEntry, SmbUrlResolver};
pub use smb_legacy::LegacySmbClient;

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::FilestoreError;
use crate::models::{FilestoreKind, Target};
use crate::paths::UserRootFolder;
use crate::resource::{FileDetails, MaterializedFile, ResourceDetails};
use crate::tree::TreeNode;

/// A live byte stream over a remote file.
/// Hand it back through [`RemoteClient::release_after_download`] once read.
pub struct RemoteDownload {
    pub details: FileDetails,
    reader: Box<dyn Read + Send>,
}

impl RemoteDownload {
    pub fn new(details: FileDetails, reader: Box<dyn Read + Send>) -> Self {
        Self { details, reader }
    }

    pub fn into_parts(self) -> (FileDetails, Box<dyn Read + Send>) {
        (self.details, self.reader)
    }
}

impl Read for RemoteDownload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for RemoteDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDownload")
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

/// Uniform contract over every remote filestore backend.
///
/// A client belongs to one caller for one login and is not shared between
/// threads; methods that may touch the network take `&mut self`.
pub trait RemoteClient: Send {
    fn kind(&self) -> FilestoreKind;

    /// The username the client authenticates as
    fn username(&self) -> &str;

    /// True once credential material was accepted, not necessarily verified
    fn is_logged_in(&self) -> bool;

    /// Minimal listing of `path` proving the backend is reachable
    fn try_connect_and_read_target(&mut self, path: &str) -> Result<(), FilestoreError>;

    /// Ordered tree rooted at `path`; `order_token` is `"byname"` or `"bydate"`
    fn create_file_tree(
        &mut self,
        path: &str,
        order_token: &str,
        root_folder: Option<&UserRootFolder>,
    ) -> Result<TreeNode, FilestoreError>;

    /// Best-effort metadata lookup; `None` when the file cannot be described
    fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails>;

    fn query_for_folder(&mut self, target: &Target) -> Result<ResourceDetails, FilestoreError>;

    fn query_file_for_download(
        &mut self,
        _target: &Target,
    ) -> Result<RemoteDownload, FilestoreError> {
        Err(FilestoreError::unsupported(format!(
            "{} filestores do not support streaming downloads",
            self.kind()
        )))
    }

    /// Free the native handle behind a download
    fn release_after_download(&mut self, download: RemoteDownload) {
        drop(download);
    }

    /// Copy a remote file into a temporary file under `dir`
    fn download_to_local(
        &mut self,
        target: &Target,
        dir: &Path,
    ) -> Result<MaterializedFile, FilestoreError> {
        let mut download = self.query_file_for_download(target)?;
        let details = download.details.clone();
        let copied = copy_to_temp(&mut download, &details, dir);
        self.release_after_download(download);
        let local = copied?;
        debug!(path = %details.path, local = %local.display(), "Remote file materialized");
        Ok(MaterializedFile::new(details, local))
    }

    fn close_session(&mut self) {}

    fn supports_extra_directories(&self) -> bool {
        false
    }

    /// Whether an empty target resolves to the backend's current directory
    fn supports_current_directory(&self) -> bool {
        false
    }

    fn supports_write(&self) -> bool {
        false
    }

    /// Upload local files into `folder`
    fn upload_files(
        &mut self,
        _folder: &str,
        _files: &[PathBuf],
    ) -> Result<Vec<ResourceDetails>, FilestoreError> {
        Err(write_unsupported(self.kind(), "upload"))
    }

    /// Delete remote files, returning how many were removed
    fn delete_files(&mut self, _paths: &[String]) -> Result<usize, FilestoreError> {
        Err(write_unsupported(self.kind(), "delete"))
    }
}

pub(crate) fn write_unsupported(kind: FilestoreKind, operation: &str) -> FilestoreError {
    warn!(kind = %kind, operation = operation, "Rejected write operation on read-only filestore");
    FilestoreError::unsupported(format!("{} is not possible on {} filestores", operation, kind))
}

fn copy_to_temp(
    source: &mut RemoteDownload,
    details: &FileDetails,
    dir: &Path,
) -> Result<tempfile::TempPath, FilestoreError> {
    let local_error =
        |e: io::Error| FilestoreError::connection(&details.path, format!("Local copy failed: {}", e));

    let mut file = tempfile::Builder::new()
        .prefix("filestore-")
        .suffix(&format!("-{}", details.name))
        .tempfile_in(dir)
        .map_err(local_error)?;
    let copied = io::copy(source, file.as_file_mut()).map_err(local_error)?;
    if copied != details.size {
        debug!(path = %details.path, expected = details.size, copied = copied, "Downloaded size differs from listing");
    }
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Minimal read-only client over fixed content
    struct StaticClient {
        content: Vec<u8>,
        released: usize,
    }

    impl RemoteClient for StaticClient {
        fn kind(&self) -> FilestoreKind {
            FilestoreKind::Irods
        }
        fn username(&self) -> &str {
            "alice"
        }
        fn is_logged_in(&self) -> bool {
            true
        }
        fn try_connect_and_read_target(&mut self, _path: &str) -> Result<(), FilestoreError> {
            Ok(())
        }
        fn create_file_tree(
            &mut self,
            path: &str,
            _order_token: &str,
            _root_folder: Option<&UserRootFolder>,
        ) -> Result<TreeNode, FilestoreError> {
            Err(FilestoreError::connection(path, "not listed"))
        }
        fn query_for_file(&mut self, target: &Target) -> Option<ResourceDetails> {
            Some(ResourceDetails::file(&target.path, self.content.len() as u64, None))
        }
        fn query_for_folder(
            &mut self,
            target: &Target,
        ) -> Result<ResourceDetails, FilestoreError> {
            Ok(ResourceDetails::folder(&target.path, vec![]))
        }
        fn query_file_for_download(
            &mut self,
            target: &Target,
        ) -> Result<RemoteDownload, FilestoreError> {
            let Some(ResourceDetails::File(details)) = self.query_for_file(target) else {
                return Err(FilestoreError::connection(&target.path, "missing"));
            };
            Ok(RemoteDownload::new(
                details,
                Box::new(Cursor::new(self.content.clone())),
            ))
        }
        fn release_after_download(&mut self, download: RemoteDownload) {
            self.released += 1;
            drop(download);
        }
    }

    #[test]
    fn test_download_to_local_releases_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = StaticClient {
            content: b"plate readings".to_vec(),
            released: 0,
        };

        let file = client
            .download_to_local(&Target::new("/zone/home/alice/plate.csv"), dir.path())
            .unwrap();

        assert_eq!(client.released, 1);
        assert_eq!(
            std::fs::read(file.local_path()).unwrap(),
            b"plate readings".to_vec()
        );
        let local = file.local_path().to_path_buf();
        drop(file);
        assert!(!local.exists());
    }

    #[test]
    fn test_default_write_operations_are_unsupported() {
        let mut client = StaticClient {
            content: vec![],
            released: 0,
        };
        assert!(!client.supports_write());
        let err = client.upload_files("/a", &[PathBuf::from("x")]).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Unsupported);
        let err = client.delete_files(&["/a/x".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Unsupported);
    }
}
