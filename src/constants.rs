//! Centralized constants for supervisor timings and proxy defaults.
//!
//! Every fixed delay in the supervisor loop is defined here and can be
//! overridden from the `supervisor` section of the manifest. Proxy defaults
//! mirror the nginx directives written into each upstream group.

// =============================================================================
// Supervisor Timings
// =============================================================================

/// Interval between two monitoring ticks (15 seconds).
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 15;

/// Emit a full status snapshot every N ticks (4 ticks = once a minute).
pub const DEFAULT_STATUS_EVERY_TICKS: u64 = 4;

/// Delay between two consecutive worker launches at startup (2 seconds).
/// Staggering avoids cold-start contention on shared downstream resources.
pub const DEFAULT_SPAWN_STAGGER_MS: u64 = 2000;

/// Wait after the last launch before the first liveness read (10 seconds).
pub const DEFAULT_SETTLE_SECS: u64 = 10;

/// Grace interval between terminate and relaunch during a restart (2 seconds).
/// Gives the OS time to release the listening port.
pub const DEFAULT_RESTART_GRACE_MS: u64 = 2000;

/// Time a terminated worker gets to exit before it is sent SIGKILL (10 seconds).
pub const DEFAULT_KILL_AFTER_SECS: u64 = 10;

/// Default initial delay when restart backoff is enabled (1 second).
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1000;

/// Default ceiling for restart backoff (5 minutes).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default multiplier for restart backoff.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

// =============================================================================
// Worker Contract
// =============================================================================

/// Environment variable carrying the human-readable instance name.
pub const ENV_INSTANCE_NAME: &str = "INSTANCE_NAME";

/// Environment variable carrying the TCP port the worker must bind.
pub const ENV_INSTANCE_PORT: &str = "INSTANCE_PORT";

/// Environment variable carrying the thread hint.
pub const ENV_WORKER_THREADS: &str = "WORKER_THREADS";

/// Environment variable carrying the owning service name.
pub const ENV_WORKER_SERVICE: &str = "WORKER_SERVICE";

// =============================================================================
// Worker Logs
// =============================================================================

/// Worker log size in megabytes that triggers rotation.
pub const DEFAULT_LOG_MAX_SIZE_MB: u64 = 10;

/// Number of rotated worker log files to keep.
pub const DEFAULT_LOG_MAX_FILES: usize = 5;

// =============================================================================
// Proxy Defaults
// =============================================================================

/// Default location of the generated nginx configuration.
pub const DEFAULT_PROXY_CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// Default nginx binary used for reloads.
pub const DEFAULT_PROXY_BINARY: &str = "nginx";

/// Upper bound on a single reload command (10 seconds).
pub const DEFAULT_RELOAD_TIMEOUT_SECS: u64 = 10;

/// Default listen address of the generated server block.
pub const DEFAULT_PROXY_LISTEN: &str = "0.0.0.0:80";

/// Prefix under which every service is routed (`/api/<service>`).
pub const DEFAULT_ROUTE_PREFIX: &str = "/api";

/// Service that additionally claims the `auth` path group.
pub const DEFAULT_AUTH_SERVICE: &str = "users";

/// Idle keepalive connections cached per upstream group.
pub const DEFAULT_KEEPALIVE: u32 = 32;

/// Consecutive failures before nginx takes a backend out of rotation.
pub const DEFAULT_MAX_FAILS: u32 = 3;

/// Window for `max_fails` and the cooldown before retrying a backend (30 seconds).
pub const DEFAULT_FAIL_TIMEOUT_SECS: u64 = 30;

/// Name reported by the catch-all route.
pub const DEFAULT_BANNER: &str = "E-Commerce API";

/// Loopback address workers bind to.
pub const WORKER_HOST: &str = "127.0.0.1";
