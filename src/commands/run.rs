//! `fleetd run`: supervise the fleet until a shutdown signal.

use anyhow::{Context, Result};
use std::path::Path;

use fleetd::Supervisor;
use fleetd::signals::shutdown_signal;

/// Load the manifest, start every worker and monitor them until SIGINT or
/// SIGTERM. A manifest error aborts before any worker is started.
pub async fn execute(manifest: &Path) -> Result<()> {
    // Handlers go in before any worker exists, so an early signal still
    // reaches the shutdown sweep.
    let shutdown = shutdown_signal();

    let mut supervisor = Supervisor::load(manifest)
        .with_context(|| format!("Cannot start fleet from {}", manifest.display()))?;

    let settings = &supervisor.manifest().supervisor;
    tracing::info!(
        manifest = %manifest.display(),
        workers = supervisor.registry().len(),
        interpreter = ?settings.interpreter,
        proxy_config = %supervisor.proxy().settings().config_path.display(),
        "Starting fleet"
    );

    supervisor.run(shutdown).await;
    Ok(())
}
