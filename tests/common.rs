//! Common helpers for integration tests.
//!
//! A [`Fleet`] is a temp directory holding worker scripts and a manifest.
//! Scripts run through `/bin/sh` (set as the supervisor interpreter), so the
//! tests never exec a file that was just written.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct Fleet {
    pub dir: TempDir,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a shell script into the fleet directory.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, body).expect("write script");
        path
    }

    /// Write `fleet.json` with the given services and fast test timings.
    ///
    /// `supervisor` and `proxy` are merged over the test defaults.
    pub fn manifest(&self, services: Value, supervisor: Value, proxy: Value) -> PathBuf {
        let mut sup = json!({
            "interpreter": "/bin/sh",
            "spawn_stagger_ms": 0,
            "settle_secs": 0,
            "restart_grace_ms": 0,
            "status_every_ticks": 0,
            "tick_interval_secs": 1
        });
        merge(&mut sup, supervisor);

        let mut prx = json!({
            "enabled": false,
            "reload": false,
            "config_path": self.path("nginx/nginx.conf"),
        });
        merge(&mut prx, proxy);

        let manifest = json!({ "services": services, "supervisor": sup, "proxy": prx });
        let path = self.path("fleet.json");
        std::fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap())
            .expect("write manifest");
        path
    }
}

fn merge(base: &mut Value, overlay: Value) {
    if let (Some(base), Value::Object(overlay)) = (base.as_object_mut(), overlay) {
        base.extend(overlay);
    }
}

/// Service entry for [`Fleet::manifest`].
pub fn service(name: &str, script: &Path, workers: u32, start_port: u16) -> Value {
    json!({
        "name": name,
        "script": script,
        "workers": workers,
        "threads": 2,
        "start_port": start_port,
    })
}

/// Poll `check` every 50ms until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
