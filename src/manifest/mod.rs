//! Declarative service manifest.
//!
//! The manifest lists the services to run, each expanding into a fixed
//! number of workers on a contiguous port range, plus optional supervisor
//! timings and reverse-proxy settings. JSON and TOML are both accepted;
//! the format is picked from the file extension.

mod defaults;
mod types;
mod validation;


use std::fs;
use std::path::Path;

pub use types::*;
pub use validation::ConfigError;

/// On-disk format of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// Pick the format from a file extension. `None` for unknown extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

// =============================================================================
// Manifest Implementation (Load/Parse)
// =============================================================================

impl Manifest {
    /// Load and validate a manifest from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing or unreadable, if the
    /// content is malformed or a required field is absent or of the wrong
    /// type, or if validation fails. There is no fallback configuration.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let manifest = Self::parse(&content, ManifestFormat::from_path(path), path)?;
        manifest.validate(path)?;

        tracing::info!(
            path = %path.display(),
            services = manifest.services.len(),
            workers = manifest.total_workers(),
            "Loaded manifest"
        );

        Ok(manifest)
    }

    /// Parse manifest content without validating it.
    ///
    /// With no explicit format, JSON is tried first and TOML second; the
    /// JSON error is reported if both fail.
    pub fn parse(
        content: &str,
        format: Option<ManifestFormat>,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match format {
            Some(ManifestFormat::Json) => {
                serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))
            },
            Some(ManifestFormat::Toml) => {
                toml::from_str(content).map_err(|e| parse_error(e.to_string()))
            },
            None => serde_json::from_str(content).or_else(|json_err| {
                toml::from_str(content).map_err(|_| parse_error(json_err.to_string()))
            }),
        }
    }
}
