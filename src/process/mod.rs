//! Worker process management.
//!
//! ## Module Structure
//!
//! - [`types`]: launch configuration and log rotation settings
//! - [`launcher`]: spawning, liveness checks, termination and reaping
//! - `log_rotation`: size-based rotation of worker log files

mod launcher;
mod log_rotation;
mod types;

pub use launcher::ProcessLauncher;
pub use types::{LaunchConfig, LaunchInfo, LogRotationConfig};
