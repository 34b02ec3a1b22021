//! In-memory archive and image fixtures for tests

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::RemoteConnection,
};
use image::{ImageFormat, RgbImage};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

/// Remote archive held in memory, recording every call
///
/// Directories exist implicitly as prefixes of the stored files.
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_lists: Mutex<BTreeSet<String>>,
    failing_fetches: Mutex<BTreeSet<String>>,
    list_calls: Mutex<Vec<String>>,
    fetch_calls: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: &str, bytes: &[u8]) {
        lock(&self.files).insert(normalize(path), bytes.to_vec());
    }

    /// Make `list(path)` fail
    pub fn fail_listing(&self, path: &str) {
        lock(&self.failing_lists).insert(normalize(path));
    }

    /// Make `fetch(path, ..)` fail after writing a partial file
    pub fn fail_fetch(&self, path: &str) {
        lock(&self.failing_fetches).insert(normalize(path));
    }

    pub fn list_calls(&self) -> Vec<String> {
        lock(&self.list_calls).clone()
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        lock(&self.fetch_calls).clone()
    }

    pub fn listed(&self, path: &str) -> bool {
        let path = normalize(path);
        lock(&self.list_calls).iter().any(|p| *p == path)
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteConnection for InMemoryArchive {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        lock(&self.list_calls).push(path.clone());

        if lock(&self.failing_lists).contains(&path) {
            return Err(BridgeError::OperationFailed(format!("listing {} refused", path)));
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        let children: BTreeSet<String> = lock(&self.files)
            .keys()
            .filter_map(|file| file.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if children.is_empty() {
            return Err(BridgeError::NotFound(path));
        }
        Ok(children.into_iter().collect())
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let remote_path = normalize(remote_path);
        lock(&self.fetch_calls).push(remote_path.clone());

        if lock(&self.failing_fetches).contains(&remote_path) {
            std::fs::write(local_path, b"partial")?;
            return Err(BridgeError::OperationFailed(format!(
                "transfer of {} interrupted",
                remote_path
            )));
        }

        let bytes = lock(&self.files)
            .get(&remote_path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(remote_path.clone()))?;

        std::fs::write(local_path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        *lock(&self.closed) = true;
        Ok(())
    }
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 31 % 256) as u8, (y * 17 % 256) as u8, 128])
    });

    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format)
        .expect("fixture encodes");
    buffer
}

/// A small valid JPEG
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

/// A small valid PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_implicit_directories() {
        let archive = InMemoryArchive::new();
        archive.add_file("/root/a/x.jpg", b"1");
        archive.add_file("/root/a/y.jpg", b"2");
        archive.add_file("/root/b/z.jpg", b"3");

        assert_eq!(archive.list("/root").await.unwrap(), vec!["a", "b"]);
        assert_eq!(archive.list("/root/a/").await.unwrap(), vec!["x.jpg", "y.jpg"]);
        assert!(matches!(
            archive.list("/root/c").await,
            Err(BridgeError::NotFound(_))
        ));
        assert_eq!(archive.list_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_fetch_leaves_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = InMemoryArchive::new();
        archive.add_file("/root/a/x.jpg", b"full");
        archive.fail_fetch("/root/a/x.jpg");

        let target = dir.path().join("x.part");
        assert!(archive.fetch("/root/a/x.jpg", &target).await.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"partial");
        assert_eq!(archive.fetch_calls(), vec!["/root/a/x.jpg".to_string()]);
    }

    #[test]
    fn test_image_fixtures_decode() {
        let jpeg = image::load_from_memory(&jpeg_bytes(5, 3)).unwrap();
        assert_eq!((jpeg.width(), jpeg.height()), (5, 3));
        let png = image::load_from_memory(&png_bytes(2, 2)).unwrap();
        assert_eq!((png.width(), png.height()), (2, 2));
    }
}
