//! Validation logic for manifest fields.
//!
//! Structural problems (missing fields, wrong types, negative numbers) are
//! rejected by serde while parsing. This module checks what serde cannot:
//! positivity, uniqueness, and that port ranges fit and do not collide.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::types::{Manifest, ServiceSpec};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while loading the manifest. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The manifest file does not exist.
    #[error("manifest not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The manifest file exists but could not be read.
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed content, a missing required field, or a field of the wrong type.
    #[error("failed to parse manifest {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The manifest declares no services.
    #[error("manifest declares no services")]
    NoServices,

    /// A service name cannot be used as a routing key.
    #[error(
        "invalid service name '{0}'. Names must start with a letter or underscore, \
         contain only letters, numbers, hyphens and underscores, and be at most 64 characters"
    )]
    InvalidName(String),

    /// Two services share a name.
    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    /// A service has an empty script path.
    #[error("service '{service}' has an empty script path")]
    EmptyScript { service: String },

    /// `workers` is zero.
    #[error("service '{service}' must have at least one worker")]
    ZeroWorkers { service: String },

    /// `threads` is zero.
    #[error("service '{service}' must have at least one thread per worker")]
    ZeroThreads { service: String },

    /// `start_port` is zero.
    #[error("service '{service}' has start_port 0. Use a valid port number (1-65535)")]
    ZeroPort { service: String },

    /// `start_port + workers - 1` exceeds 65535.
    #[error(
        "service '{service}' needs {workers} ports from {start_port}, which runs past 65535"
    )]
    PortOverflow {
        service: String,
        start_port: u16,
        workers: u32,
    },

    /// Two services claim overlapping port ranges.
    #[error("port ranges of services '{first}' and '{second}' overlap")]
    PortOverlap { first: String, second: String },

    /// Two proxy locations share a path, which nginx refuses to load.
    #[error("proxy route '{route}' is claimed by both {first} and {second}")]
    RouteCollision {
        route: String,
        first: String,
        second: String,
    },

    /// One or more semantic problems, reported together.
    #[error("validation failed for {}:\n{}", path.display(), format_problems(.problems))]
    Invalid {
        path: PathBuf,
        problems: Vec<ConfigError>,
    },
}

fn format_problems(problems: &[ConfigError]) -> String {
    let mut out = String::new();
    for (i, problem) in problems.iter().enumerate() {
        let _ = writeln!(out, "  {}. {problem}", i + 1);
    }
    out
}

// =============================================================================
// Manifest Validation Implementation
// =============================================================================

impl Manifest {
    /// Validate the manifest for semantic errors.
    ///
    /// This checks:
    /// - At least one service is declared
    /// - Service names are valid and unique
    /// - Scripts are non-empty
    /// - `workers`, `threads` and `start_port` are positive
    /// - Each port range fits in 1..=65535
    /// - No two port ranges overlap
    /// - With the proxy enabled, no two locations share a path
    ///
    /// All problems are collected and returned as one [`ConfigError::Invalid`].
    pub fn validate(&self, manifest_path: &Path) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                path: manifest_path.to_path_buf(),
                problems,
            })
        }
    }

    fn problems(&self) -> Vec<ConfigError> {
        if self.services.is_empty() {
            return vec![ConfigError::NoServices];
        }

        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for service in &self.services {
            if !Self::is_valid_name(&service.name) {
                errors.push(ConfigError::InvalidName(service.name.clone()));
            } else if !seen.insert(service.name.as_str()) {
                errors.push(ConfigError::DuplicateName(service.name.clone()));
            }

            if service.script.as_os_str().is_empty() {
                errors.push(ConfigError::EmptyScript {
                    service: service.name.clone(),
                });
            }
            if service.worker_count == 0 {
                errors.push(ConfigError::ZeroWorkers {
                    service: service.name.clone(),
                });
            }
            if service.threads == 0 {
                errors.push(ConfigError::ZeroThreads {
                    service: service.name.clone(),
                });
            }
            if service.start_port == 0 {
                errors.push(ConfigError::ZeroPort {
                    service: service.name.clone(),
                });
            } else if service.worker_count > 0 && service.last_port().is_none() {
                errors.push(ConfigError::PortOverflow {
                    service: service.name.clone(),
                    start_port: service.start_port,
                    workers: service.worker_count,
                });
            }
        }

        errors.extend(overlapping_ranges(&self.services));
        if self.proxy.enabled {
            errors.extend(self.route_collisions());
        }
        errors
    }

    /// Every proxy location that would be rendered twice: a service named
    /// after the auth alias, or a static prefix shadowing a service route or
    /// the catch-all.
    fn route_collisions(&self) -> Vec<ConfigError> {
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        owners.insert("/".to_string(), "the catch-all location".to_string());

        let mut claims: Vec<(String, String)> = Vec::new();
        if let Some(location) = &self.proxy.static_location {
            claims.push((location.prefix.clone(), "the static location".to_string()));
        }
        for service in &self.services {
            for route in self.proxy.routes_for(&service.name) {
                claims.push((route, format!("service '{}'", service.name)));
            }
        }

        let mut errors = Vec::new();
        for (route, owner) in claims {
            match owners.get(&route) {
                // Duplicate names are reported on their own.
                Some(first) if *first == owner => {},
                Some(first) => errors.push(ConfigError::RouteCollision {
                    route,
                    first: first.clone(),
                    second: owner,
                }),
                None => {
                    owners.insert(route, owner);
                },
            }
        }
        errors
    }

    /// Check if a service name is usable as upstream name and URL segment.
    ///
    /// Valid names:
    /// - Start with a letter (a-z, A-Z) or underscore (_)
    /// - Contain only letters, numbers, hyphens (-), and underscores (_)
    /// - Between 1 and 64 characters
    pub fn is_valid_name(name: &str) -> bool {
        if name.is_empty() || name.len() > 64 {
            return false;
        }

        let mut chars = name.chars();

        if let Some(first) = chars.next()
            && !first.is_ascii_alphabetic()
            && first != '_'
        {
            return false;
        }

        chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

/// Report every pair of services whose port ranges intersect.
///
/// Services whose range is already invalid (zero workers, overflow) are
/// skipped; they have been reported on their own.
fn overlapping_ranges(services: &[ServiceSpec]) -> Vec<ConfigError> {
    let mut ranges: Vec<(u16, u16, &str)> = services
        .iter()
        .filter(|s| s.start_port > 0)
        .filter_map(|s| s.last_port().map(|last| (s.start_port, last, s.name.as_str())))
        .collect();
    ranges.sort_unstable();

    let mut errors = Vec::new();
    for (i, &(_, last, first_name)) in ranges.iter().enumerate() {
        for &(start, _, second_name) in &ranges[i + 1..] {
            if start > last {
                break;
            }
            errors.push(ConfigError::PortOverlap {
                first: first_name.to_string(),
                second: second_name.to_string(),
            });
        }
    }
    errors
}
