//! Default value functions for manifest fields.
//!
//! These functions are used by serde's `default` attribute to provide
//! sensible defaults when fields are not specified in the manifest.

use std::path::PathBuf;

use crate::constants;

// =============================================================================
// Supervisor Defaults
// =============================================================================

/// Default monitoring tick in seconds (15).
pub(crate) const fn default_tick_interval_secs() -> u64 {
    constants::DEFAULT_TICK_INTERVAL_SECS
}

/// Default status cadence in ticks (4).
pub(crate) const fn default_status_every_ticks() -> u64 {
    constants::DEFAULT_STATUS_EVERY_TICKS
}

/// Default launch stagger in milliseconds (2000).
pub(crate) const fn default_spawn_stagger_ms() -> u64 {
    constants::DEFAULT_SPAWN_STAGGER_MS
}

/// Default settle wait in seconds (10).
pub(crate) const fn default_settle_secs() -> u64 {
    constants::DEFAULT_SETTLE_SECS
}

/// Default restart grace in milliseconds (2000).
pub(crate) const fn default_restart_grace_ms() -> u64 {
    constants::DEFAULT_RESTART_GRACE_MS
}

/// Default log rotation threshold in megabytes (10).
pub(crate) const fn default_log_max_size_mb() -> u64 {
    constants::DEFAULT_LOG_MAX_SIZE_MB
}

/// Default number of rotated logs kept per worker (5).
pub(crate) const fn default_log_max_files() -> usize {
    constants::DEFAULT_LOG_MAX_FILES
}

/// Default initial backoff in milliseconds (1000).
pub(crate) const fn default_backoff_initial_ms() -> u64 {
    constants::DEFAULT_BACKOFF_INITIAL_MS
}

/// Default backoff ceiling in milliseconds (300000).
pub(crate) const fn default_backoff_max_ms() -> u64 {
    constants::DEFAULT_BACKOFF_MAX_MS
}

/// Default backoff multiplier (2.0).
pub(crate) const fn default_backoff_factor() -> f64 {
    constants::DEFAULT_BACKOFF_FACTOR
}

// =============================================================================
// Proxy Defaults
// =============================================================================

/// Default for proxy generation (true).
pub(crate) const fn default_proxy_enabled() -> bool {
    true
}

/// Default for issuing a reload after writing (true).
pub(crate) const fn default_reload_enabled() -> bool {
    true
}

/// Default config path (`/etc/nginx/nginx.conf`).
pub(crate) fn default_proxy_config_path() -> PathBuf {
    PathBuf::from(constants::DEFAULT_PROXY_CONFIG_PATH)
}

/// Default proxy binary (`nginx`).
pub(crate) fn default_proxy_binary() -> PathBuf {
    PathBuf::from(constants::DEFAULT_PROXY_BINARY)
}

/// Default reload arguments (`-s reload`).
pub(crate) fn default_reload_args() -> Vec<String> {
    vec!["-s".to_string(), "reload".to_string()]
}

/// Default reload timeout in seconds (10).
pub(crate) const fn default_reload_timeout_secs() -> u64 {
    constants::DEFAULT_RELOAD_TIMEOUT_SECS
}

/// Default listen address (`0.0.0.0:80`).
pub(crate) fn default_listen() -> String {
    constants::DEFAULT_PROXY_LISTEN.to_string()
}

/// Default route prefix (`/api`).
pub(crate) fn default_route_prefix() -> String {
    constants::DEFAULT_ROUTE_PREFIX.to_string()
}

/// Default auth-owning service (`users`).
pub(crate) fn default_auth_service() -> Option<String> {
    Some(constants::DEFAULT_AUTH_SERVICE.to_string())
}

/// Default keepalive pool size (32).
pub(crate) const fn default_keepalive() -> u32 {
    constants::DEFAULT_KEEPALIVE
}

/// Default passive failure threshold (3).
pub(crate) const fn default_max_fails() -> u32 {
    constants::DEFAULT_MAX_FAILS
}

/// Default passive failure window in seconds (30).
pub(crate) const fn default_fail_timeout_secs() -> u64 {
    constants::DEFAULT_FAIL_TIMEOUT_SECS
}

/// Default catch-all banner.
pub(crate) fn default_banner() -> String {
    constants::DEFAULT_BANNER.to_string()
}

/// Default index document for the static location.
pub(crate) fn default_static_index() -> String {
    "index.html".to_string()
}
