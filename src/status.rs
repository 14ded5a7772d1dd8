//! Periodic status snapshot: per-service liveness, per-instance pid and
//! restart count, and the URLs the proxy routes to each service.

use serde::Serialize;
use std::fmt;

use crate::manifest::{Manifest, ProxySettings};
use crate::process::ProcessLauncher;
use crate::proxy::ProxyPlan;
use crate::registry::WorkerRegistry;

const RULE: &str = "======================================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Running,
    Dead,
    /// Dead and past the restart ceiling.
    Abandoned,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Dead => "DEAD",
            Self::Abandoned => "ABANDONED",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: String,
    pub instance_name: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub state: WorkerState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub alive: usize,
    pub total: usize,
    /// Threads per worker.
    pub threads: u32,
    pub total_threads: u64,
    /// Access URLs routed to this service, empty when the proxy is disabled.
    pub urls: Vec<String>,
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub services: Vec<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_url: Option<String>,
}

impl StatusReport {
    /// Snapshot the registry. Liveness is read fresh for every instance.
    pub fn collect(
        manifest: &Manifest,
        registry: &mut WorkerRegistry,
        launcher: &ProcessLauncher,
        proxy: Option<&ProxyPlan>,
    ) -> Self {
        let base = access_base(&manifest.proxy);

        let services = manifest
            .services
            .iter()
            .map(|spec| {
                let workers: Vec<WorkerStatus> = registry
                    .by_service_mut(&spec.name)
                    .map(|w| {
                        let state = if launcher.is_alive(w) {
                            WorkerState::Running
                        } else if w.gave_up() {
                            WorkerState::Abandoned
                        } else {
                            WorkerState::Dead
                        };
                        WorkerStatus {
                            id: w.id.clone(),
                            instance_name: w.instance_name.clone(),
                            port: w.port,
                            pid: w.pid(),
                            restarts: w.restart_count(),
                            state,
                        }
                    })
                    .collect();

                let urls = proxy
                    .and_then(|p| p.group(&spec.name))
                    .map(|g| g.routes.iter().map(|r| format!("{base}{r}")).collect())
                    .unwrap_or_default();

                ServiceStatus {
                    name: spec.name.clone(),
                    alive: workers
                        .iter()
                        .filter(|w| w.state == WorkerState::Running)
                        .count(),
                    total: workers.len(),
                    threads: spec.threads,
                    total_threads: spec.total_threads(),
                    urls,
                    workers,
                }
            })
            .collect();

        let static_url = proxy
            .and(manifest.proxy.static_location.as_ref())
            .map(|s| format!("{base}{}", s.prefix));

        Self {
            services,
            static_url,
        }
    }

    pub fn alive(&self) -> usize {
        self.services.iter().map(|s| s.alive).sum()
    }

    pub fn total(&self) -> usize {
        self.services.iter().map(|s| s.total).sum()
    }
}

/// `http://host[:port]` as seen from the proxy host.
fn access_base(settings: &ProxySettings) -> String {
    let (host, port) = match settings.listen.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None if settings.listen.chars().all(|c| c.is_ascii_digit()) => {
            ("", Some(settings.listen.as_str()))
        },
        None => (settings.listen.as_str(), None),
    };
    let host = match host {
        "" | "0.0.0.0" | "*" | "[::]" => "localhost",
        other => other,
    };
    match port {
        Some("80") | None => format!("http://{host}"),
        Some(port) => format!("http://{host}:{port}"),
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "WORKER STATUS")?;
        writeln!(f, "{RULE}")?;

        for service in &self.services {
            writeln!(f)?;
            writeln!(f, "  {} SERVICE", service.name.to_uppercase())?;
            writeln!(f, "  Workers: {}/{} alive", service.alive, service.total)?;
            writeln!(
                f,
                "  Threads: {} total ({} per worker)",
                service.total_threads, service.threads
            )?;
            for w in &service.workers {
                let pid = w.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
                writeln!(
                    f,
                    "    [{}] {} -> Port {} (PID: {pid}, Restarts: {})",
                    w.state, w.instance_name, w.port, w.restarts
                )?;
            }
        }

        let has_urls = self.services.iter().any(|s| !s.urls.is_empty());
        if has_urls || self.static_url.is_some() {
            writeln!(f)?;
            writeln!(f, "{RULE}")?;
            writeln!(f, "ACCESS URLS")?;
            writeln!(f, "{RULE}")?;
            for service in &self.services {
                for url in &service.urls {
                    writeln!(f, "  {:<10} {url}", format!("{}:", service.name))?;
                }
            }
            if let Some(url) = &self.static_url {
                writeln!(f, "  {:<10} {url}", "static:")?;
            }
        }

        write!(f, "{RULE}")
    }
}
