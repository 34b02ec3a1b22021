//! Station image archive mirror
//!
//! Reads `MIRROR_*` settings (optionally from `.env`), mirrors the archive
//! reachable under `MIRROR_MOUNT_POINT` into `MIRROR_LOCAL_ROOT`, and writes
//! the run report to `MIRROR_REPORT_PATH` when set.

use anyhow::Context;
use bridge_desktop::MountedArchive;
use core_runtime::{logging::init_logging, MirrorConfig};
use core_sync::MirrorCoordinator;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MirrorConfig::from_env().context("invalid mirror configuration")?;
    init_logging(config.logging.clone()).context("failed to initialize logging")?;

    let archive = MountedArchive::open(config.mount_point.clone())
        .await
        .with_context(|| format!("archive not reachable at {}", config.mount_point.display()))?;

    let report_path = config.report_path.clone();
    let report = MirrorCoordinator::new(Arc::new(archive), config)
        .run()
        .await
        .context("mirror pass failed")?;

    if let Some(path) = report_path {
        let json = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = ?path, "Wrote run report");
    }

    Ok(())
}
