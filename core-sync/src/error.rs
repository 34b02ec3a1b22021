use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Listing {path} failed: {source}")]
    Listing {
        path: String,
        #[source]
        source: bridge_traits::BridgeError,
    },

    #[error("Transfer {remote_path} -> {} failed: {source}", local_path.display())]
    Transfer {
        remote_path: String,
        local_path: PathBuf,
        #[source]
        source: bridge_traits::BridgeError,
    },

    #[error("Filename does not embed a date and time: {0}")]
    FilenameParse(String),

    #[error("Integrity check failed for {}: {reason}", path.display())]
    Integrity { path: PathBuf, reason: String },

    #[error("Quarantine of {} failed: {source}", path.display())]
    Quarantine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation pipeline is closed")]
    PipelineClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
