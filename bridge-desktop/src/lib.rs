//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `RemoteConnection` using `tokio::fs` over a mounted archive share
//!
//! Session-based transports (SFTP, SMB clients) are supplied by the host; a
//! mount made with the operating system's own tooling is enough for
//! [`MountedArchive`].
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::MountedArchive;
//! use bridge_traits::RemoteConnection;
//!
//! #[tokio::main]
//! async fn main() {
//!     let archive = MountedArchive::open("/mnt/nas").await.unwrap();
//!     let disks = archive.list("/share/TARBIL").await.unwrap();
//! }
//! ```

mod mounted;

pub use mounted::MountedArchive;
