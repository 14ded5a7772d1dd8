//! Type definitions for the service manifest.
//!
//! The manifest is loaded once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

/// The main manifest structure.
///
/// # Example
///
/// ```json
/// {
///   "services": [
///     {"name": "products", "script": "/srv/products/app.py",
///      "workers": 2, "threads": 4, "start_port": 5001}
///   ],
///   "supervisor": {"interpreter": "/srv/venv/bin/python"},
///   "proxy": {"config_path": "/etc/nginx/nginx.conf"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Services in declaration order.
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
}

impl Manifest {
    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Total number of worker slots across all services.
    pub fn total_workers(&self) -> usize {
        self.services.iter().map(|s| s.worker_count as usize).sum()
    }
}

// =============================================================================
// Service Specification
// =============================================================================

/// One logical service: a group of interchangeable workers sharing a script
/// and a contiguous port range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique name, used as routing key and log prefix.
    pub name: String,
    /// Executable entry point (or script run through `interpreter`).
    pub script: PathBuf,
    /// Number of worker processes.
    #[serde(rename = "workers")]
    pub worker_count: u32,
    /// Thread hint passed to each worker. Not enforced by the supervisor.
    pub threads: u32,
    /// First port of the service's range.
    pub start_port: u16,
    /// Interpreter used to run `script`. Overrides the supervisor-wide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
    /// Extra environment passed to every worker of this service.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// Last port of the range, or `None` if the range runs past 65535.
    pub fn last_port(&self) -> Option<u16> {
        let span = u16::try_from(self.worker_count.checked_sub(1)?).ok()?;
        self.start_port.checked_add(span)
    }

    /// Human-readable service name: first letter upper-cased, rest lower-cased.
    pub fn display_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect(),
            None => String::new(),
        }
    }

    /// Total threads across all workers of this service.
    pub const fn total_threads(&self) -> u64 {
        self.worker_count as u64 * self.threads as u64
    }
}

// =============================================================================
// Supervisor Settings
// =============================================================================

/// Timings and launch settings for the supervisor loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Seconds between monitoring ticks (default: 15).
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Emit a status snapshot every N ticks (default: 4, 0 disables).
    #[serde(default = "default_status_every_ticks")]
    pub status_every_ticks: u64,
    /// Milliseconds between two launches at startup (default: 2000).
    #[serde(default = "default_spawn_stagger_ms")]
    pub spawn_stagger_ms: u64,
    /// Seconds to wait after spawning before the first liveness read (default: 10).
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Milliseconds between terminate and relaunch (default: 2000).
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,
    /// Interpreter used for every service that does not set its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
    /// Directory receiving `<instance>.log` files. Output is inherited if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Rotate a worker log once it reaches this many megabytes (default: 10).
    #[serde(default = "default_log_max_size_mb")]
    pub log_max_size_mb: u64,
    /// Rotated logs kept per worker (default: 5).
    #[serde(default = "default_log_max_files")]
    pub log_max_files: usize,
    /// Stop restarting an instance after this many restarts (unbounded if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    /// Exponential restart backoff (immediate restarts if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffSettings>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            status_every_ticks: default_status_every_ticks(),
            spawn_stagger_ms: default_spawn_stagger_ms(),
            settle_secs: default_settle_secs(),
            restart_grace_ms: default_restart_grace_ms(),
            interpreter: None,
            log_dir: None,
            log_max_size_mb: default_log_max_size_mb(),
            log_max_files: default_log_max_files(),
            max_restarts: None,
            backoff: None,
        }
    }
}

impl SupervisorSettings {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub const fn spawn_stagger(&self) -> Duration {
        Duration::from_millis(self.spawn_stagger_ms)
    }

    pub const fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub const fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }
}

/// Exponential backoff applied to consecutive restarts of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Delay before the second consecutive restart (default: 1000).
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    /// Ceiling for the delay (default: 300000).
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    /// Multiplier applied per consecutive restart (default: 2.0).
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            factor: default_backoff_factor(),
        }
    }
}

// =============================================================================
// Proxy Settings
// =============================================================================

/// Reverse-proxy generation and reload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Generate and reload the proxy config at all (default: true).
    #[serde(default = "default_proxy_enabled")]
    pub enabled: bool,
    /// Issue the reload command after writing (default: true).
    #[serde(default = "default_reload_enabled")]
    pub reload: bool,
    /// Where the generated config is written.
    #[serde(default = "default_proxy_config_path")]
    pub config_path: PathBuf,
    /// Proxy binary invoked for reloads.
    #[serde(default = "default_proxy_binary")]
    pub binary: PathBuf,
    /// Arguments passed to `binary` to reload (default: `-s reload`).
    #[serde(default = "default_reload_args")]
    pub reload_args: Vec<String>,
    /// Upper bound on a reload command in seconds (default: 10).
    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,
    /// `listen` address of the server block.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path prefix in front of every service route (default: `/api`).
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    /// Service that additionally owns `<prefix>/auth` (default: `users`).
    #[serde(default = "default_auth_service")]
    pub auth_service: Option<String>,
    /// Keepalive connections per upstream group (default: 32).
    #[serde(default = "default_keepalive")]
    pub keepalive: u32,
    /// Failures before a backend is taken out of rotation (default: 3).
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
    /// Failure window and cooldown in seconds (default: 30).
    #[serde(default = "default_fail_timeout_secs")]
    pub fail_timeout_secs: u64,
    /// Name reported by the catch-all route.
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Optional static file location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_location: Option<StaticLocation>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: default_proxy_enabled(),
            reload: default_reload_enabled(),
            config_path: default_proxy_config_path(),
            binary: default_proxy_binary(),
            reload_args: default_reload_args(),
            reload_timeout_secs: default_reload_timeout_secs(),
            listen: default_listen(),
            route_prefix: default_route_prefix(),
            auth_service: default_auth_service(),
            keepalive: default_keepalive(),
            max_fails: default_max_fails(),
            fail_timeout_secs: default_fail_timeout_secs(),
            banner: default_banner(),
            static_location: None,
        }
    }
}

impl ProxySettings {
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    /// Path prefixes routed to `service`, in render order.
    ///
    /// The auth service gets `<prefix>/auth` ahead of its own route.
    pub fn routes_for(&self, service: &str) -> Vec<String> {
        let prefix = self.route_prefix.trim_end_matches('/');
        let own = format!("{prefix}/{service}");
        match self.auth_service.as_deref() {
            Some(auth) if auth == service => vec![format!("{prefix}/auth"), own],
            _ => vec![own],
        }
    }
}

/// A static file location served directly by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticLocation {
    /// URL prefix (e.g. `/test`).
    pub prefix: String,
    /// Directory aliased by the prefix.
    pub root: PathBuf,
    /// Index document (default: `index.html`).
    #[serde(default = "default_static_index")]
    pub index: String,
}
