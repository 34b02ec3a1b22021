//! Remote Archive Abstractions
//!
//! The synchronization engine never opens sessions itself. Hosts hand it an
//! already connected and authenticated [`RemoteConnection`], and the engine
//! only lists directories and fetches files through it.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Listing and fetch capability over a remote archive
///
/// Paths are `/`-separated strings in the remote's namespace, independent of
/// the local platform's separator.
///
/// # Lifecycle
///
/// A connection is opened by the host before it is handed to the engine. The
/// engine calls [`close`](RemoteConnection::close) exactly once at the end of
/// a pass, after all transfers have been issued.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::remote::RemoteConnection;
///
/// async fn first_disk(conn: &dyn RemoteConnection) -> Result<Option<String>> {
///     let mut disks = conn.list("/share/TARBIL").await?;
///     disks.sort();
///     Ok(disks.into_iter().next())
/// }
/// ```
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// List the entry names (not full paths) directly under `path`
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Copy the remote file at `remote_path` to `local_path`
    ///
    /// Returns the number of bytes written. On error the content of
    /// `local_path` is unspecified and callers should discard it.
    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// Release the underlying session
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Join remote path segments with `/`
pub fn join_remote(base: &str, segment: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, segment)
    } else {
        format!("{}/{}", base, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;

    mock! {
        Remote {}

        #[async_trait]
        impl RemoteConnection for Remote {
            async fn list(&self, path: &str) -> Result<Vec<String>>;
            async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64>;
        }
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/share/TARBIL", "TARLA-DISK 1"), "/share/TARBIL/TARLA-DISK 1");
        assert_eq!(join_remote("/share/", "x"), "/share/x");
    }

    #[tokio::test]
    async fn test_default_close_is_ok() {
        let remote = MockRemote::new();
        assert!(remote.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_list_error_propagates() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .returning(|path| Err(BridgeError::NotFound(path.to_string())));

        let err = remote.list("/missing").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(p) if p == "/missing"));
    }
}
