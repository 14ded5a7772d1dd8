//! Worker log files.
//!
//! A worker appends stdout and stderr to `<log_dir>/<instance>.log`. When the
//! file has reached the size limit by the time the worker is (re)launched,
//! it is moved aside as `<instance>.log.<UTC stamp>`. Moved-aside copies past
//! `max_files` are pruned, oldest first.

use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::types::LogRotationConfig;
use crate::error::{Error, Result};

/// Fixed-width stamp: lexical order is chronological order.
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Live log file of `instance` inside `dir`.
pub(crate) fn log_file(dir: &Path, instance: &str) -> PathBuf {
    dir.join(format!("{instance}.log"))
}

impl LogRotationConfig {
    /// Move the live log of `instance` aside if it has reached `max_size`.
    ///
    /// Returns where the old log went, or `None` when nothing was moved
    /// (small file, or no file yet).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the log cannot be inspected or renamed.
    pub fn rotate(&self, dir: &Path, instance: &str) -> Result<Option<PathBuf>> {
        let live = log_file(dir, instance);
        let size = match fs::metadata(&live) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(format!("inspecting worker log {}", live.display()), e)),
        };
        if size < self.max_size {
            return Ok(None);
        }

        let aside = dir.join(format!("{instance}.log.{}", Utc::now().format(STAMP_FORMAT)));
        fs::rename(&live, &aside)
            .map_err(|e| Error::io(format!("moving worker log aside to {}", aside.display()), e))?;
        tracing::info!(instance, bytes = size, to = %aside.display(), "Rotated worker log");

        self.prune(dir, instance);
        Ok(Some(aside))
    }

    /// Delete moved-aside logs of `instance` beyond the newest `max_files`.
    fn prune(&self, dir: &Path, instance: &str) {
        let prefix = format!("{instance}.log.");
        let mut aside: Vec<String> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
                .filter(|name| name.starts_with(&prefix))
                .collect(),
            Err(e) => {
                tracing::warn!(instance, dir = %dir.display(), error = %e, "Cannot list worker logs");
                return;
            },
        };
        aside.sort_unstable_by(|a, b| b.cmp(a));

        for name in aside.iter().skip(self.max_files) {
            let path = dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(instance, path = %path.display(), "Pruned worker log"),
                Err(e) => {
                    tracing::warn!(instance, path = %path.display(), error = %e, "Cannot prune worker log");
                },
            }
        }
    }
}
