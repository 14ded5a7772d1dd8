//! End-to-end supervisor tests against real `/bin/sh` workers.
//!
//! ```bash
//! cargo test --test supervisor_tests
//! ```

#![cfg(unix)]

#[path = "common.rs"]
mod common;

use common::{Fleet, service, wait_until};
use fleetd::manifest::ConfigError;
use fleetd::status::WorkerState;
use fleetd::{Supervisor, SupervisorState};
use serde_json::json;
use std::time::{Duration, Instant};

const CRASH_ONCE: &str = r#"
if [ "$INSTANCE_NAME" = "Products-Worker1" ] && [ ! -f crashed ]; then
    touch crashed
    exit 1
fi
exec sleep 30
"#;

const STOP_MARKER: &str = r#"
trap 'echo stopped > "stopped_$INSTANCE_PORT"; exit 0' TERM
while true; do sleep 1; done
"#;

fn never() -> std::pin::Pin<Box<std::future::Pending<()>>> {
    Box::pin(std::future::pending())
}

fn state_of(supervisor: &mut Supervisor, id: &str) -> WorkerState {
    supervisor
        .status()
        .services
        .iter()
        .flat_map(|s| s.workers.iter())
        .find(|w| w.id == id)
        .map(|w| w.state)
        .expect("worker in status")
}

#[tokio::test]
async fn test_dead_worker_restarted_others_untouched() {
    let fleet = Fleet::new();
    let script = fleet.script("products.sh", CRASH_ONCE);
    let manifest = fleet.manifest(
        json!([service("products", &script, 2, 5001)]),
        json!({}),
        json!({}),
    );

    let mut supervisor = Supervisor::load(&manifest).unwrap();
    let mut stop = never();
    assert!(supervisor.spawn_all(stop.as_mut()).await);

    let crashed = wait_until(Duration::from_secs(5), || {
        let dead = state_of(&mut supervisor, "products_worker1") == WorkerState::Dead;
        async move { dead }
    })
    .await;
    assert!(crashed, "products_worker1 should exit on its first run");

    let worker2_pid = supervisor.registry().get("products_worker2").unwrap().pid();
    let report = supervisor.tick().await;

    assert_eq!(report.restarted, vec!["products_worker1"]);
    let registry = supervisor.registry();
    assert_eq!(registry.get("products_worker1").unwrap().restart_count(), 1);
    assert_eq!(registry.get("products_worker2").unwrap().restart_count(), 0);
    assert_eq!(registry.get("products_worker2").unwrap().pid(), worker2_pid);

    // Second run of worker1 stays up.
    assert_eq!(state_of(&mut supervisor, "products_worker1"), WorkerState::Running);
    let report = supervisor.tick().await;
    assert!(report.restarted.is_empty());

    supervisor.shutdown();
}

#[tokio::test]
async fn test_missing_start_port_launches_nothing() {
    let fleet = Fleet::new();
    let script = fleet.script("products.sh", "touch launched\nexec sleep 30\n");
    let manifest = fleet.manifest(
        json!([{"name": "products", "script": script, "workers": 2, "threads": 4}]),
        json!({}),
        json!({}),
    );

    let err = Supervisor::load(&manifest).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { ref message, .. } if message.contains("start_port")));
    assert!(!fleet.path("launched").exists());
}

#[tokio::test]
async fn test_shutdown_terminates_every_worker() {
    let fleet = Fleet::new();
    let script = fleet.script("worker.sh", STOP_MARKER);
    let manifest = fleet.manifest(
        json!([
            service("products", &script, 2, 5001),
            service("users", &script, 1, 5021),
        ]),
        json!({}),
        json!({}),
    );

    let mut supervisor = Supervisor::load(&manifest).unwrap();
    let mut stop = never();
    assert!(supervisor.spawn_all(stop.as_mut()).await);
    // Let the shells install their traps.
    tokio::time::sleep(Duration::from_millis(300)).await;

    supervisor.shutdown();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(supervisor.registry().iter().all(|w| !w.has_process()));

    for port in [5001, 5002, 5021] {
        let marker = fleet.path(&format!("stopped_{port}"));
        let stopped = wait_until(Duration::from_secs(5), || {
            let exists = marker.exists();
            async move { exists }
        })
        .await;
        assert!(stopped, "worker on port {port} did not receive SIGTERM");
    }

    // A second sweep finds nothing left to do.
    supervisor.shutdown();
}

#[tokio::test]
async fn test_run_writes_proxy_config_and_stops_on_signal() {
    let fleet = Fleet::new();
    let script = fleet.script("worker.sh", "exec sleep 30\n");
    let manifest = fleet.manifest(
        json!([
            service("products", &script, 2, 5001),
            service("users", &script, 1, 5021),
        ]),
        json!({}),
        json!({"enabled": true}),
    );

    let mut supervisor = Supervisor::load(&manifest).unwrap();
    supervisor
        .run(tokio::time::sleep(Duration::from_millis(1500)))
        .await;

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    let config = std::fs::read_to_string(fleet.path("nginx/nginx.conf")).unwrap();
    assert!(config.contains("upstream products_backend"));
    assert!(config.contains("server 127.0.0.1:5002"));
    assert!(config.contains("location /api/auth"));
    assert!(supervisor.registry().iter().all(|w| w.pid().is_some()));
}

#[tokio::test]
async fn test_shutdown_interrupts_spawn_stagger() {
    let fleet = Fleet::new();
    let script = fleet.script("worker.sh", "exec sleep 30\n");
    let manifest = fleet.manifest(
        json!([service("products", &script, 3, 5001)]),
        json!({"spawn_stagger_ms": 60_000}),
        json!({}),
    );

    let mut supervisor = Supervisor::load(&manifest).unwrap();
    let started = Instant::now();
    supervisor
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    let registry = supervisor.registry();
    assert!(registry.get("products_worker1").unwrap().pid().is_some());
    assert!(registry.get("products_worker2").unwrap().pid().is_none());
    assert!(registry.get("products_worker3").unwrap().pid().is_none());
}

#[tokio::test]
async fn test_launch_failure_does_not_stop_batch() {
    let fleet = Fleet::new();
    let good = fleet.script("good.sh", "exec sleep 30\n");
    let manifest = fleet.manifest(
        json!([
            {
                "name": "broken",
                "script": fleet.path("broken.sh"),
                "workers": 1,
                "threads": 1,
                "start_port": 5001,
                "interpreter": fleet.path("no-such-interpreter"),
            },
            service("users", &good, 1, 5021),
        ]),
        json!({}),
        json!({}),
    );

    let mut supervisor = Supervisor::load(&manifest).unwrap();
    let mut stop = never();
    assert!(supervisor.spawn_all(stop.as_mut()).await);

    let registry = supervisor.registry();
    assert!(!registry.get("broken_worker1").unwrap().has_process());
    assert!(registry.get("users_worker1").unwrap().has_process());

    let report = supervisor.tick().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.alive, 1);

    supervisor.shutdown();
}
