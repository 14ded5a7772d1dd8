//! Read-only commands: `plan`, `render` and `check`.

use anyhow::{Context, Result};
use std::path::Path;

use fleetd::manifest::Manifest;
use fleetd::plan::{WorkerInstance, build_plan};
use fleetd::proxy::{ProxyConfigGenerator, ProxyPlan};

fn load(path: &Path) -> Result<Manifest> {
    Manifest::load_from(path).with_context(|| format!("Invalid manifest {}", path.display()))
}

/// Print every worker slot with its port.
pub fn plan(path: &Path, json: bool) -> Result<()> {
    let manifest = load(path)?;
    let workers = build_plan(&manifest.services);

    if json {
        let out = serde_json::to_string_pretty(&workers).context("Failed to serialize plan")?;
        println!("{out}");
        return Ok(());
    }

    for service in &manifest.services {
        println!(
            "{} ({} workers x {} threads, {} script)",
            service.name,
            service.worker_count,
            service.threads,
            service.script.display()
        );
        for w in workers.iter().filter(|w| w.service == service.name) {
            print_worker(w);
        }
    }
    println!("\n{} workers total", workers.len());
    Ok(())
}

fn print_worker(w: &WorkerInstance) {
    println!("  {:<24} {:<24} port {}", w.id, w.instance_name, w.port);
}

/// Print the nginx config the fleet would get, without writing it.
pub fn render(path: &Path) -> Result<()> {
    let manifest = load(path)?;
    let workers = build_plan(&manifest.services);
    let plan = ProxyPlan::build(&workers, &manifest.proxy);
    let generator = ProxyConfigGenerator::new(manifest.proxy);
    print!("{}", generator.render(&plan));
    Ok(())
}

/// Validate only.
pub fn check(path: &Path) -> Result<()> {
    let manifest = load(path)?;
    println!(
        "{}: OK ({} services, {} workers)",
        path.display(),
        manifest.services.len(),
        manifest.total_workers()
    );
    Ok(())
}
