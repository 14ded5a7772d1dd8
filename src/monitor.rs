//! Liveness monitoring and the restart protocol.
//!
//! Every tick walks the registry in plan order. A worker found not alive is
//! restarted: restart count bumped, stale handle terminated, a short grace
//! wait for the port to be released, then a fresh launch. A failed launch
//! leaves the worker dead; it is picked up again on the next tick.
//!
//! ## Restart policy
//!
//! By default restarts are immediate and unbounded. Two optional limits can be
//! configured in the manifest:
//!
//! - **Ceiling** (`max_restarts`): after that many consecutive restarts without
//!   the worker being seen alive in between, the instance is abandoned and
//!   stays dead until the supervisor restarts.
//! - **Backoff**: the n-th consecutive restart waits `initial × factor^(n-1)`
//!   (capped at `max`) after the previous one. Seeing the worker alive resets
//!   the sequence.

use std::time::{Duration, Instant};

use crate::manifest::{BackoffSettings, SupervisorSettings};
use crate::plan::WorkerInstance;
use crate::process::ProcessLauncher;
use crate::registry::WorkerRegistry;

/// Exponential delay between consecutive restarts of one instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl BackoffPolicy {
    /// Delay required after `consecutive` restarts before the next one.
    ///
    /// Zero restarts means no delay. Non-finite or oversized results clamp
    /// to `max`.
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(consecutive - 1).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl From<&BackoffSettings> for BackoffPolicy {
    fn from(settings: &BackoffSettings) -> Self {
        Self {
            initial: Duration::from_millis(settings.initial_ms),
            max: Duration::from_millis(settings.max_ms),
            factor: settings.factor,
        }
    }
}

/// How dead workers are brought back.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Give up after this many consecutive restarts. `None` retries forever.
    pub max_restarts: Option<u32>,
    /// Spacing between consecutive restarts. `None` restarts immediately.
    pub backoff: Option<BackoffPolicy>,
    /// Wait between terminating the stale handle and launching again.
    pub grace: Duration,
}

impl RestartPolicy {
    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            max_restarts: settings.max_restarts,
            backoff: settings.backoff.as_ref().map(BackoffPolicy::from),
            grace: settings.restart_grace(),
        }
    }
}

/// Outcome of one monitoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub alive: usize,
    pub dead: usize,
    /// Ids of instances a restart was attempted for, in plan order.
    pub restarted: Vec<String>,
    /// Restarts whose launch failed.
    pub failed: usize,
    /// Dead instances waiting for their backoff to elapse.
    pub deferred: usize,
    /// Dead instances past the restart ceiling.
    pub abandoned: usize,
}

/// Polls every worker and applies the restart protocol.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    policy: RestartPolicy,
}

impl HealthMonitor {
    pub const fn new(policy: RestartPolicy) -> Self {
        Self { policy }
    }

    /// Run one monitoring pass over the whole registry.
    ///
    /// Restarts run inline, one after another; the grace wait of one restart
    /// delays the checks of the workers after it.
    pub async fn tick(
        &self,
        registry: &mut WorkerRegistry,
        launcher: &mut ProcessLauncher,
    ) -> TickReport {
        launcher.reap();

        let mut report = TickReport::default();
        for worker in registry.iter_mut() {
            if launcher.is_alive(worker) {
                worker.restart.consecutive = 0;
                worker.restart.not_before = None;
                report.alive += 1;
                continue;
            }
            report.dead += 1;

            if worker.restart.gave_up {
                report.abandoned += 1;
                continue;
            }

            if let Some(max) = self.policy.max_restarts
                && worker.restart.consecutive >= max
            {
                worker.restart.gave_up = true;
                report.abandoned += 1;
                tracing::error!(
                    instance = %worker.id,
                    restarts = worker.restart_count,
                    max_restarts = max,
                    "Worker keeps dying, giving up"
                );
                continue;
            }

            if let Some(not_before) = worker.restart.not_before
                && Instant::now() < not_before
            {
                report.deferred += 1;
                tracing::debug!(
                    instance = %worker.id,
                    wait_ms = not_before.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Restart deferred by backoff"
                );
                continue;
            }

            report.restarted.push(worker.id.clone());
            if !self.restart(worker, launcher).await {
                report.failed += 1;
            }
        }

        report
    }

    /// Terminate, wait, relaunch. Returns whether the launch succeeded.
    async fn restart(&self, worker: &mut WorkerInstance, launcher: &mut ProcessLauncher) -> bool {
        worker.restart_count += 1;
        worker.restart.consecutive += 1;

        tracing::warn!(
            instance = %worker.id,
            port = worker.port,
            last_pid = ?worker.pid,
            restart = worker.restart_count,
            "Worker is dead, restarting"
        );

        if let Err(e) = launcher.terminate(worker) {
            tracing::warn!(instance = %worker.id, error = %e, "Terminate before restart failed");
        }

        if !self.policy.grace.is_zero() {
            tokio::time::sleep(self.policy.grace).await;
        }

        if let Some(backoff) = &self.policy.backoff {
            let delay = backoff.delay_for(worker.restart.consecutive);
            worker.restart.not_before = Some(Instant::now() + delay);
        }

        match launcher.launch(worker) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(instance = %worker.id, error = %e, "Restart failed, retrying next tick");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
        }
    }

    #[test]
    fn test_backoff_sequence() {
        let b = backoff();
        assert_eq!(b.delay_for(0), Duration::ZERO);
        assert_eq!(b.delay_for(1), Duration::from_secs(1));
        assert_eq!(b.delay_for(2), Duration::from_secs(2));
        assert_eq!(b.delay_for(3), Duration::from_secs(4));
        assert_eq!(b.delay_for(7), Duration::from_secs(60));
        assert_eq!(b.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_non_finite_clamps() {
        let b = BackoffPolicy {
            factor: f64::INFINITY,
            ..backoff()
        };
        assert_eq!(b.delay_for(3), Duration::from_secs(60));
    }

    #[test]
    fn test_policy_from_default_settings_is_unbounded() {
        let policy = RestartPolicy::from_settings(&SupervisorSettings::default());
        assert_eq!(policy.max_restarts, None);
        assert_eq!(policy.backoff, None);
        assert_eq!(policy.grace, Duration::from_secs(2));
    }

    #[test]
    fn test_policy_from_backoff_settings() {
        let settings = SupervisorSettings {
            max_restarts: Some(5),
            backoff: Some(BackoffSettings::default()),
            ..Default::default()
        };
        let policy = RestartPolicy::from_settings(&settings);
        assert_eq!(policy.max_restarts, Some(5));
        let b = policy.backoff.unwrap();
        assert_eq!(b.initial, Duration::from_secs(1));
        assert_eq!(b.max, Duration::from_secs(300));
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::manifest::ServiceSpec;
    use crate::plan::build_plan;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn service(dir: &TempDir, name: &str, body: &str, workers: u32, port: u16) -> ServiceSpec {
        let script = dir.path().join(format!("{name}.sh"));
        std::fs::write(&script, body).unwrap();
        ServiceSpec {
            name: name.into(),
            script,
            worker_count: workers,
            threads: 1,
            start_port: port,
            interpreter: Some(PathBuf::from("/bin/sh")),
            env: Default::default(),
        }
    }

    fn policy() -> RestartPolicy {
        RestartPolicy {
            max_restarts: None,
            backoff: None,
            grace: Duration::ZERO,
        }
    }

    async fn wait_dead(launcher: &ProcessLauncher, registry: &mut WorkerRegistry, id: &str) {
        for _ in 0..100 {
            if !launcher.is_alive(registry.get_mut(id).unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{id} never exited");
    }

    fn shutdown(registry: &mut WorkerRegistry, launcher: &mut ProcessLauncher) {
        for w in registry.iter_mut() {
            let _ = launcher.terminate(w);
        }
    }

    #[tokio::test]
    async fn test_only_dead_worker_is_restarted() {
        let dir = TempDir::new().unwrap();
        let mut registry = WorkerRegistry::new(build_plan(&[
            service(&dir, "crashy", "exit 1\n", 1, 5001),
            service(&dir, "steady", "exec sleep 30\n", 1, 5002),
        ]));
        let mut launcher = ProcessLauncher::new(&SupervisorSettings::default());
        for w in registry.iter_mut() {
            launcher.launch(w).unwrap();
        }
        wait_dead(&launcher, &mut registry, "crashy_worker1").await;
        let steady_pid = registry.get("steady_worker1").unwrap().pid();

        let monitor = HealthMonitor::new(policy());
        let report = monitor.tick(&mut registry, &mut launcher).await;

        assert_eq!(report.restarted, vec!["crashy_worker1"]);
        assert_eq!(report.alive, 1);
        assert_eq!(registry.get("crashy_worker1").unwrap().restart_count(), 1);
        assert!(registry.get("crashy_worker1").unwrap().has_process());
        let steady = registry.get("steady_worker1").unwrap();
        assert_eq!(steady.restart_count(), 0);
        assert_eq!(steady.pid(), steady_pid);

        shutdown(&mut registry, &mut launcher);
    }

    #[tokio::test]
    async fn test_restart_count_grows_by_one_per_death() {
        let dir = TempDir::new().unwrap();
        let mut registry =
            WorkerRegistry::new(build_plan(&[service(&dir, "crashy", "exit 1\n", 1, 5001)]));
        let mut launcher = ProcessLauncher::new(&SupervisorSettings::default());
        let monitor = HealthMonitor::new(policy());

        launcher.launch(registry.get_mut("crashy_worker1").unwrap()).unwrap();
        for expected in 1..=3 {
            wait_dead(&launcher, &mut registry, "crashy_worker1").await;
            monitor.tick(&mut registry, &mut launcher).await;
            assert_eq!(
                registry.get("crashy_worker1").unwrap().restart_count(),
                expected
            );
        }
    }

    #[tokio::test]
    async fn test_failed_launch_is_retried_next_tick() {
        let dir = TempDir::new().unwrap();
        let mut spec = service(&dir, "broken", "", 1, 5001);
        spec.interpreter = Some(dir.path().join("missing-interpreter"));
        let mut registry = WorkerRegistry::new(build_plan(&[spec]));
        let mut launcher = ProcessLauncher::new(&SupervisorSettings::default());
        let monitor = HealthMonitor::new(policy());

        let first = monitor.tick(&mut registry, &mut launcher).await;
        let second = monitor.tick(&mut registry, &mut launcher).await;

        assert_eq!(first.failed, 1);
        assert_eq!(second.failed, 1);
        assert_eq!(registry.get("broken_worker1").unwrap().restart_count(), 2);
    }

    #[tokio::test]
    async fn test_ceiling_abandons_instance() {
        let dir = TempDir::new().unwrap();
        let mut spec = service(&dir, "broken", "", 1, 5001);
        spec.interpreter = Some(dir.path().join("missing-interpreter"));
        let mut registry = WorkerRegistry::new(build_plan(&[spec]));
        let mut launcher = ProcessLauncher::new(&SupervisorSettings::default());
        let monitor = HealthMonitor::new(RestartPolicy {
            max_restarts: Some(2),
            ..policy()
        });

        for _ in 0..4 {
            monitor.tick(&mut registry, &mut launcher).await;
        }

        let worker = registry.get("broken_worker1").unwrap();
        assert_eq!(worker.restart_count(), 2);
        assert!(worker.gave_up());
    }

    #[tokio::test]
    async fn test_backoff_defers_second_restart() {
        let dir = TempDir::new().unwrap();
        let mut spec = service(&dir, "broken", "", 1, 5001);
        spec.interpreter = Some(dir.path().join("missing-interpreter"));
        let mut registry = WorkerRegistry::new(build_plan(&[spec]));
        let mut launcher = ProcessLauncher::new(&SupervisorSettings::default());
        let monitor = HealthMonitor::new(RestartPolicy {
            backoff: Some(BackoffPolicy {
                initial: Duration::from_secs(60),
                max: Duration::from_secs(60),
                factor: 2.0,
            }),
            ..policy()
        });

        let first = monitor.tick(&mut registry, &mut launcher).await;
        let second = monitor.tick(&mut registry, &mut launcher).await;

        assert_eq!(first.restarted.len(), 1);
        assert!(second.restarted.is_empty());
        assert_eq!(second.deferred, 1);
        assert_eq!(registry.get("broken_worker1").unwrap().restart_count(), 1);
    }
}
