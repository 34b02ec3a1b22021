//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the mirror engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! ## Overview
//!
//! This crate holds the settings every other crate reads and the logging
//! conventions they write through. It has no knowledge of the archive layout.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{MirrorConfig, MirrorConfigBuilder, VerifyMode};
pub use error::{Error, Result};
