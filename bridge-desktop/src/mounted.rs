//! Remote archive access through a mounted directory using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::RemoteConnection,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Archive reachable as a local filesystem (sshfs, SMB, NFS mounts)
///
/// The archive namespace root `/` maps onto `mount_point`, so the remote path
/// `/share/TARBIL/x` resolves to `<mount_point>/share/TARBIL/x`.
#[derive(Debug, Clone)]
pub struct MountedArchive {
    mount_point: PathBuf,
}

impl MountedArchive {
    /// Open an archive mounted at `mount_point`
    ///
    /// Fails when the mount point is missing or is not a directory, so an
    /// unmounted share is reported up front instead of as an empty archive.
    pub async fn open(mount_point: impl Into<PathBuf>) -> Result<Self> {
        let mount_point = mount_point.into();
        let metadata = fs::metadata(&mount_point).await.map_err(|e| {
            BridgeError::NotAvailable(format!("{}: {}", mount_point.display(), e))
        })?;

        if !metadata.is_dir() {
            return Err(BridgeError::NotAvailable(format!(
                "{} is not a directory",
                mount_point.display()
            )));
        }

        info!(mount_point = ?mount_point, "Opened mounted archive");
        Ok(Self { mount_point })
    }

    /// Resolve a remote path onto the mount
    pub fn resolve(&self, remote_path: &str) -> PathBuf {
        remote_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.mount_point.clone(), |path, segment| path.join(segment))
    }

    fn map_io_error(remote_path: &str, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(remote_path.to_string())
        } else {
            BridgeError::Io(e)
        }
    }
}

#[async_trait]
impl RemoteConnection for MountedArchive {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let local = self.resolve(path);
        let mut read_dir = fs::read_dir(&local)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        debug!(path = %path, count = names.len(), "Listed remote directory");
        Ok(names)
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let source = self.resolve(remote_path);
        let bytes = fs::copy(&source, local_path)
            .await
            .map_err(|e| Self::map_io_error(remote_path, e))?;

        debug!(remote = %remote_path, local = ?local_path, bytes, "Fetched file");
        Ok(bytes)
    }

    async fn close(&self) -> Result<()> {
        debug!(mount_point = ?self.mount_point, "Closed mounted archive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_mount_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = MountedArchive::open(dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_maps_root_onto_mount() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MountedArchive::open(dir.path()).await.unwrap();

        assert_eq!(
            archive.resolve("/share/TARBIL/TARLA-DISK 1"),
            dir.path().join("share").join("TARBIL").join("TARLA-DISK 1")
        );
    }

    #[tokio::test]
    async fn test_list_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let month = dir.path().join("archive").join("05");
        std::fs::create_dir_all(&month).unwrap();
        std::fs::write(month.join("2014_05_23-10_00-10x.jpeg"), b"jpeg-bytes").unwrap();

        let archive = MountedArchive::open(dir.path()).await.unwrap();
        let names = archive.list("/archive/05").await.unwrap();
        assert_eq!(names, vec!["2014_05_23-10_00-10x.jpeg".to_string()]);

        let target = dir.path().join("copy.jpeg");
        let bytes = archive
            .fetch("/archive/05/2014_05_23-10_00-10x.jpeg", &target)
            .await
            .unwrap();
        assert_eq!(bytes, 10);
        assert_eq!(std::fs::read(&target).unwrap(), b"jpeg-bytes");

        archive.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MountedArchive::open(dir.path()).await.unwrap();

        let err = archive.list("/nope").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(p) if p == "/nope"));
    }
}
