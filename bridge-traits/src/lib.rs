//! # Host Bridge Traits
//!
//! Capability traits that the host must supply to the synchronization core.
//!
//! ## Overview
//!
//! The core only walks and copies. Everything about reaching the archive
//! (hosts, credentials, sessions, transport) lives behind
//! [`RemoteConnection`](remote::RemoteConnection), implemented by the host or
//! by one of the bridge crates (`bridge-desktop` ships a mounted-directory
//! adapter).
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert transport-specific errors into it and include the remote
//! path in the message.
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync` so a connection can be shared behind an
//! `Arc` between the traversal task and the host.

pub mod error;
pub mod remote;

pub use error::BridgeError;
pub use remote::{join_remote, RemoteConnection};
