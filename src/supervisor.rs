//! Top-level supervisor state machine.
//!
//! ```text
//! Loading -> Planning -> ProxyInit -> Spawning -> Settling -> Monitoring
//!                                         \           \           |
//!                                          +-----------+----> ShuttingDown -> Stopped
//! ```
//!
//! Everything runs on one task. The registry has a single writer; the only
//! suspensions are the stagger, settle and tick sleeps (interrupted by the
//! shutdown signal) and the restart grace wait (not interrupted).

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use crate::manifest::{ConfigError, Manifest};
use crate::monitor::{HealthMonitor, RestartPolicy, TickReport};
use crate::plan::build_plan;
use crate::process::ProcessLauncher;
use crate::proxy::{ProxyConfigGenerator, ProxyPlan};
use crate::registry::WorkerRegistry;
use crate::status::StatusReport;

/// Lifecycle phase of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Loading,
    Planning,
    ProxyInit,
    Spawning,
    Settling,
    Monitoring,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Planning => "planning",
            Self::ProxyInit => "proxy-init",
            Self::Spawning => "spawning",
            Self::Settling => "settling",
            Self::Monitoring => "monitoring",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owns the worker registry and drives it through its lifecycle.
#[derive(Debug)]
pub struct Supervisor {
    manifest: Manifest,
    registry: WorkerRegistry,
    launcher: ProcessLauncher,
    proxy: ProxyConfigGenerator,
    proxy_plan: ProxyPlan,
    monitor: HealthMonitor,
    state: SupervisorState,
    ticks: u64,
}

impl Supervisor {
    /// Load the manifest and build the plan.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the manifest cannot be loaded. No process
    /// has been started at that point.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(state = %SupervisorState::Loading, path = %path.display(), "Loading manifest");
        let manifest = Manifest::load_from(path)?;
        Ok(Self::from_manifest(manifest))
    }

    /// Build the supervisor from an already validated manifest.
    pub fn from_manifest(manifest: Manifest) -> Self {
        let registry = WorkerRegistry::new(build_plan(&manifest.services));
        let proxy_plan = ProxyPlan::build(registry.iter(), &manifest.proxy);
        let launcher = ProcessLauncher::new(&manifest.supervisor);
        let monitor = HealthMonitor::new(RestartPolicy::from_settings(&manifest.supervisor));
        let proxy = ProxyConfigGenerator::new(manifest.proxy.clone());

        tracing::info!(
            state = %SupervisorState::Planning,
            workers = registry.len(),
            services = manifest.services.len(),
            "Planned workers"
        );

        Self {
            manifest,
            registry,
            launcher,
            proxy,
            proxy_plan,
            monitor,
            state: SupervisorState::Planning,
            ticks: 0,
        }
    }

    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub const fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub const fn proxy_plan(&self) -> &ProxyPlan {
        &self.proxy_plan
    }

    pub const fn proxy(&self) -> &ProxyConfigGenerator {
        &self.proxy
    }

    /// Run the full lifecycle until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.init_proxy().await;

        if !self.spawn_all(shutdown.as_mut()).await {
            self.shutdown();
            return;
        }

        self.state = SupervisorState::Settling;
        let settle = self.manifest.supervisor.settle();
        tracing::info!(secs = settle.as_secs(), "Waiting for workers to initialize");
        if !sleep_or_shutdown(settle, shutdown.as_mut()).await {
            self.shutdown();
            return;
        }
        self.emit_status();

        self.state = SupervisorState::Monitoring;
        let interval = self.manifest.supervisor.tick_interval();
        tracing::info!(interval_secs = interval.as_secs(), "Monitoring workers");

        while sleep_or_shutdown(interval, shutdown.as_mut()).await {
            self.tick().await;
        }

        self.shutdown();
    }

    /// Render, write and reload the proxy config for the full plan.
    ///
    /// Failures are logged; workers are started regardless.
    pub async fn init_proxy(&mut self) {
        self.state = SupervisorState::ProxyInit;
        if let Err(e) = self.proxy.apply(&self.proxy_plan).await {
            tracing::error!(error = %e, "Proxy config not applied, routing may be stale");
        }
    }

    /// Launch every worker in plan order, pausing `spawn_stagger` between
    /// launches.
    ///
    /// A failed launch is logged and the next worker is attempted. Returns
    /// `false` if `shutdown` resolved during a pause.
    pub async fn spawn_all<F>(&mut self, mut shutdown: Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        self.state = SupervisorState::Spawning;
        let stagger = self.manifest.supervisor.spawn_stagger();
        let mut failed = 0usize;

        for (i, id) in self.registry.ids().into_iter().enumerate() {
            if i > 0 && !stagger.is_zero() && !sleep_or_shutdown(stagger, shutdown.as_mut()).await {
                tracing::info!("Shutdown requested during startup");
                return false;
            }
            let Some(worker) = self.registry.get_mut(&id) else {
                continue;
            };
            if let Err(e) = self.launcher.launch(worker) {
                failed += 1;
                tracing::error!(instance = %id, error = %e, "Worker failed to start, will retry");
            }
        }

        tracing::info!(
            launched = self.registry.len() - failed,
            failed,
            "Initial spawn complete"
        );
        true
    }

    /// One monitoring pass, plus a status snapshot every
    /// `status_every_ticks` ticks.
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let report = self.monitor.tick(&mut self.registry, &mut self.launcher).await;

        if report.dead > 0 {
            tracing::warn!(
                tick = self.ticks,
                dead = report.dead,
                restarted = report.restarted.len(),
                failed = report.failed,
                deferred = report.deferred,
                abandoned = report.abandoned,
                "Dead workers detected"
            );
        } else {
            tracing::debug!(tick = self.ticks, alive = report.alive, "All workers alive");
        }

        let every = self.manifest.supervisor.status_every_ticks;
        if every > 0 && self.ticks % every == 0 {
            self.emit_status();
        }
        report
    }

    /// Current status snapshot.
    pub fn status(&mut self) -> StatusReport {
        let plan = self.manifest.proxy.enabled.then_some(&self.proxy_plan);
        StatusReport::collect(&self.manifest, &mut self.registry, &self.launcher, plan)
    }

    fn emit_status(&mut self) {
        let report = self.status();
        tracing::info!(alive = report.alive(), total = report.total(), "Worker status");
        println!("{report}");
    }

    /// Terminate every worker, best-effort, without waiting for exits.
    pub fn shutdown(&mut self) {
        self.state = SupervisorState::ShuttingDown;
        tracing::info!("Shutting down all workers");

        for worker in self.registry.iter_mut() {
            let had_process = worker.has_process();
            match self.launcher.terminate(worker) {
                Ok(()) if had_process => tracing::info!(instance = %worker.id, "Stopped worker"),
                Ok(()) => {},
                Err(e) => tracing::warn!(instance = %worker.id, error = %e, "Failed to stop worker"),
            }
        }
        self.launcher.reap();

        self.state = SupervisorState::Stopped;
        tracing::info!("Shutdown complete");
    }
}

/// Sleep for `duration`; `false` if `shutdown` resolved first.
async fn sleep_or_shutdown<F>(duration: Duration, shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = shutdown => false,
    }
}
