//! Reverse-proxy configuration generation.
//!
//! The generator turns the worker set into an nginx config, swaps it into
//! place atomically and asks the running proxy to reload. Every failure here
//! is reported to the caller and is non-fatal: workers keep running with
//! stale routing until the next successful regeneration.

mod plan;
mod render;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub use plan::{ProxyPlan, UpstreamGroup, upstream_name};
pub use render::render;

use crate::error::{Error, Result};
use crate::manifest::ProxySettings;

/// Renders, persists and reloads the proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfigGenerator {
    settings: ProxySettings,
}

impl ProxyConfigGenerator {
    pub const fn new(settings: ProxySettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn render(&self, plan: &ProxyPlan) -> String {
        render(plan, &self.settings)
    }

    /// Write `content` to the configured path via a temp file and rename,
    /// so a concurrent reload never reads a partial file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProxyWrite`] if the directory, temp file or rename fails.
    pub fn write(&self, content: &str) -> Result<PathBuf> {
        let path = &self.settings.config_path;
        let write_err = |source: std::io::Error| Error::ProxyWrite {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let temp_path = temp_path_for(path);
        fs::write(&temp_path, content).map_err(write_err)?;
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(e));
        }

        tracing::info!(path = %path.display(), bytes = content.len(), "Wrote proxy config");
        Ok(path.clone())
    }

    /// Run the reload command, bounded by `reload_timeout_secs`.
    ///
    /// The child is killed if the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProxyReload`] if the binary is missing, exits
    /// non-zero, or does not finish in time.
    pub async fn reload(&self) -> Result<()> {
        let binary = &self.settings.binary;
        let timeout = self.settings.reload_timeout();

        let output = tokio::process::Command::new(binary)
            .args(&self.settings.reload_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ProxyReload(format!(
                    "proxy binary not found: {}",
                    binary.display()
                )));
            },
            Ok(Err(e)) => {
                return Err(Error::ProxyReload(format!(
                    "failed to run {}: {e}",
                    binary.display()
                )));
            },
            Err(_) => {
                return Err(Error::ProxyReload(format!(
                    "{} did not finish within {}s",
                    binary.display(),
                    timeout.as_secs()
                )));
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProxyReload(format!(
                "{} exited with {}: {}",
                binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(binary = %binary.display(), "Proxy reloaded");
        Ok(())
    }

    /// Render, write and (if enabled) reload in one step.
    ///
    /// Does nothing when proxy generation is disabled.
    pub async fn apply(&self, plan: &ProxyPlan) -> Result<()> {
        if !self.settings.enabled {
            tracing::debug!("Proxy generation disabled");
            return Ok(());
        }

        self.write(&self.render(plan))?;

        if self.settings.reload {
            self.reload().await?;
        }
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
