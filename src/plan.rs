//! Worker plan: expands service specs into concrete worker instances.
//!
//! For a service with `workers = N` and `start_port = P` the plan holds
//! instances `1..=N` on ports `P..=P+N-1`, in manifest order and then
//! instance order. Identity (`id`, `port`) is fixed for the life of the
//! supervisor; only the process handle, pid and restart bookkeeping change.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Instant;

use crate::manifest::ServiceSpec;
use crate::process::LaunchConfig;

/// One worker slot and, while it runs, the process occupying it.
#[derive(Debug, Serialize)]
pub struct WorkerInstance {
    /// Deterministic id, `"{service}_worker{n}"`.
    pub id: String,
    /// Name of the owning service.
    pub service: String,
    /// Human-readable name, `"{Service}-Worker{n}"`.
    pub instance_name: String,
    /// 1-based index within the service.
    pub index: u32,
    /// Port assigned to this slot.
    pub port: u16,
    pub script: PathBuf,
    pub threads: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Owned handle of the running process, `None` when not running.
    #[serde(skip)]
    pub(crate) process: Option<Child>,
    /// Last known pid, kept after the process dies.
    pub(crate) pid: Option<u32>,
    pub(crate) restart_count: u32,
    #[serde(skip)]
    pub(crate) restart: RestartState,
}

/// Per-instance bookkeeping for the restart policy.
#[derive(Debug, Clone, Default)]
pub(crate) struct RestartState {
    /// Restarts since the worker was last seen alive.
    pub(crate) consecutive: u32,
    /// Earliest time the next restart may run when backoff is enabled.
    pub(crate) not_before: Option<Instant>,
    /// The restart ceiling was reached; the instance stays dead.
    pub(crate) gave_up: bool,
}

impl WorkerInstance {
    /// Create the instance for slot `index` (1-based) of `spec`.
    ///
    /// `index` must lie within `1..=spec.worker_count`; the port is
    /// `start_port + index - 1`, which validation guarantees fits in `u16`.
    pub fn new(spec: &ServiceSpec, index: u32) -> Self {
        let offset = u16::try_from(index.saturating_sub(1)).unwrap_or(u16::MAX);
        Self {
            id: format!("{}_worker{index}", spec.name),
            service: spec.name.clone(),
            instance_name: format!("{}-Worker{index}", spec.display_name()),
            index,
            port: spec.start_port.saturating_add(offset),
            script: spec.script.clone(),
            threads: spec.threads,
            interpreter: spec.interpreter.clone(),
            env: spec.env.clone(),
            process: None,
            pid: None,
            restart_count: 0,
            restart: RestartState::default(),
        }
    }

    /// Last known OS process id.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of restarts performed so far.
    pub const fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Whether a process handle is currently held.
    pub const fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Whether the restart ceiling was reached for this instance.
    pub const fn gave_up(&self) -> bool {
        self.restart.gave_up
    }

    /// Typed launch configuration for this slot.
    ///
    /// `default_interpreter` applies when the service does not set its own.
    pub fn launch_config(&self, default_interpreter: Option<&Path>) -> LaunchConfig {
        LaunchConfig {
            instance_id: self.id.clone(),
            instance_name: self.instance_name.clone(),
            service: self.service.clone(),
            port: self.port,
            threads: self.threads,
            script: self.script.clone(),
            interpreter: self
                .interpreter
                .clone()
                .or_else(|| default_interpreter.map(Path::to_path_buf)),
            env: self.env.clone(),
        }
    }
}

/// Expand service specs into the flat worker list.
///
/// Pure: the same specs always yield the same instances in the same order.
pub fn build_plan(services: &[ServiceSpec]) -> Vec<WorkerInstance> {
    services
        .iter()
        .flat_map(|spec| (1..=spec.worker_count).map(move |i| WorkerInstance::new(spec, i)))
        .collect()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Services on disjoint ranges separated by random gaps.
    fn services() -> impl Strategy<Value = Vec<ServiceSpec>> {
        (1024u16..30000, prop::collection::vec((1u32..=16, 0u16..30), 1..6)).prop_map(
            |(base, shapes)| {
                let mut next = base;
                shapes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (workers, gap))| {
                        let start_port = next + gap;
                        next = start_port + workers as u16;
                        ServiceSpec {
                            name: format!("svc{i}"),
                            script: PathBuf::from("app"),
                            worker_count: workers,
                            threads: 2,
                            start_port,
                            interpreter: None,
                            env: BTreeMap::new(),
                        }
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn each_service_gets_its_contiguous_range(services in services()) {
            let plan = build_plan(&services);

            for spec in &services {
                let ports: Vec<u16> = plan
                    .iter()
                    .filter(|w| w.service == spec.name)
                    .map(|w| w.port)
                    .collect();
                let expected: Vec<u16> =
                    (0..spec.worker_count).map(|i| spec.start_port + i as u16).collect();
                prop_assert_eq!(ports, expected);
            }
        }

        #[test]
        fn ports_and_ids_are_unique(services in services()) {
            let plan = build_plan(&services);
            let total: usize = services.iter().map(|s| s.worker_count as usize).sum();
            prop_assert_eq!(plan.len(), total);

            let ports: HashSet<u16> = plan.iter().map(|w| w.port).collect();
            let ids: HashSet<&str> = plan.iter().map(|w| w.id.as_str()).collect();
            prop_assert_eq!(ports.len(), total);
            prop_assert_eq!(ids.len(), total);
        }

        #[test]
        fn plan_is_deterministic(services in services()) {
            let a: Vec<(String, u16)> =
                build_plan(&services).into_iter().map(|w| (w.id, w.port)).collect();
            let b: Vec<(String, u16)> =
                build_plan(&services).into_iter().map(|w| (w.id, w.port)).collect();
            prop_assert_eq!(a, b);
        }
    }
}
