// =============================================================================
// Lint Configuration
// =============================================================================

#![deny(unsafe_code)]
// Correctness: Must handle all fallible operations
#![deny(unused_must_use)]
// Quality: Pedantic but pragmatic
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
// Allowed with documented reasons
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::module_name_repetitions)] // e.g., proxy::ProxyPlan is clearer
#![allow(clippy::doc_markdown)] // Too many false positives in code docs
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation
#![allow(clippy::cast_possible_truncation)] // Millisecond counts in log fields

//! fleetd - supervisor for a declarative fleet of worker processes.
//!
//! A manifest lists services; each service expands into a fixed number of
//! workers on a contiguous port range. fleetd starts the workers, restarts
//! them when they die, and keeps an nginx configuration with one upstream
//! group per service in sync with the fleet.
//!
//! # Pipeline
//!
//! - [`manifest`]: load and validate the manifest ([`manifest::Manifest`])
//! - [`plan`]: expand services into [`plan::WorkerInstance`] slots
//! - [`registry`]: single owner of the instances
//! - [`process`]: spawn, inspect and terminate worker processes
//! - [`proxy`]: render, write and reload the nginx config
//! - [`monitor`]: liveness polling and the restart protocol
//! - [`supervisor`]: the lifecycle state machine tying it together
//!
//! # Example
//!
//! ```
//! use fleetd::manifest::{Manifest, ManifestFormat};
//! use fleetd::plan::build_plan;
//! use std::path::Path;
//!
//! let manifest = Manifest::parse(
//!     r#"{"services": [{"name": "users", "script": "u.x", "workers": 2,
//!                       "threads": 4, "start_port": 5021}]}"#,
//!     Some(ManifestFormat::Json),
//!     Path::new("fleet.json"),
//! )
//! .unwrap();
//!
//! let plan = build_plan(&manifest.services);
//! assert_eq!(plan[1].id, "users_worker2");
//! assert_eq!(plan[1].port, 5022);
//! ```

pub mod constants;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod monitor;
pub mod plan;
pub mod process;
pub mod proxy;
pub mod registry;
pub mod signals;
pub mod status;
pub mod supervisor;

pub use error::{Error, Result};
pub use supervisor::{Supervisor, SupervisorState};
