//! Type definitions for worker process management.
//!
//! [`LaunchConfig`] is the contract between supervisor and worker: every
//! value a worker needs to self-configure is carried here as a typed field
//! and only turned into environment variables at the spawn boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::constants;
use crate::manifest::SupervisorSettings;

/// Configuration for log rotation.
#[derive(Debug, Clone)]
pub struct LogRotationConfig {
    /// Maximum log file size in bytes before rotation.
    pub max_size: u64,
    /// Maximum number of rotated log files to keep.
    pub max_files: usize,
}

impl From<&SupervisorSettings> for LogRotationConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            max_size: settings.log_max_size_mb.saturating_mul(1024 * 1024),
            max_files: settings.log_max_files,
        }
    }
}

/// Everything needed to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Instance id (used for logging and the log file name).
    pub instance_id: String,
    /// Human-readable instance name handed to the worker.
    pub instance_name: String,
    /// Owning service.
    pub service: String,
    /// TCP port the worker must bind.
    pub port: u16,
    /// Thread hint.
    pub threads: u32,
    /// Script or executable to run.
    pub script: PathBuf,
    /// Interpreter that runs `script`, if any.
    pub interpreter: Option<PathBuf>,
    /// Extra environment from the manifest.
    pub env: BTreeMap<String, String>,
}

impl LaunchConfig {
    /// Program and arguments for the spawn call.
    ///
    /// With an interpreter the script becomes its single argument;
    /// otherwise the script is executed directly.
    pub fn program(&self) -> (PathBuf, Vec<PathBuf>) {
        match &self.interpreter {
            Some(interpreter) => (interpreter.clone(), vec![self.script.clone()]),
            None => (self.script.clone(), Vec::new()),
        }
    }

    /// Environment passed to the worker, manifest extras first so the
    /// contract variables always win.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.push((
            constants::ENV_INSTANCE_NAME.to_string(),
            self.instance_name.clone(),
        ));
        vars.push((
            constants::ENV_INSTANCE_PORT.to_string(),
            self.port.to_string(),
        ));
        vars.push((
            constants::ENV_WORKER_THREADS.to_string(),
            self.threads.to_string(),
        ));
        vars.push((
            constants::ENV_WORKER_SERVICE.to_string(),
            self.service.clone(),
        ));
        vars
    }
}

/// Information about a freshly launched worker.
#[derive(Debug, Clone)]
pub struct LaunchInfo {
    /// Process ID of the worker.
    pub pid: u32,
    /// Log file receiving the worker's output, if captured.
    pub log_path: Option<PathBuf>,
}
