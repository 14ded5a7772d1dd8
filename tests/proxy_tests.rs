//! Proxy config generation: rendering, atomic writes and bounded reloads.

#[path = "common.rs"]
mod common;

use fleetd::Error;
use fleetd::manifest::{Manifest, ManifestFormat, ProxySettings};
use fleetd::plan::build_plan;
use fleetd::proxy::{ProxyConfigGenerator, ProxyPlan};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const EXAMPLE: &str = r#"{
    "services": [
        {"name": "products", "script": "p.x", "workers": 2, "threads": 4, "start_port": 5001},
        {"name": "users", "script": "u.x", "workers": 1, "threads": 4, "start_port": 5021}
    ]
}"#;

fn example_plan(settings: &ProxySettings) -> ProxyPlan {
    let manifest =
        Manifest::parse(EXAMPLE, Some(ManifestFormat::Json), Path::new("fleet.json")).unwrap();
    ProxyPlan::build(&build_plan(&manifest.services), settings)
}

fn generator(
    config_path: PathBuf,
    binary: &str,
    args: &[&str],
    timeout_secs: u64,
) -> ProxyConfigGenerator {
    ProxyConfigGenerator::new(ProxySettings {
        config_path,
        binary: PathBuf::from(binary),
        reload_args: args.iter().map(ToString::to_string).collect(),
        reload_timeout_secs: timeout_secs,
        ..Default::default()
    })
}

#[test]
fn test_example_manifest_renders_expected_groups() {
    let settings = ProxySettings::default();
    let text = ProxyConfigGenerator::new(settings.clone()).render(&example_plan(&settings));

    let products = text.find("upstream products_backend {").unwrap();
    let users = text.find("upstream users_backend {").unwrap();
    assert!(products < users);

    let products_block = &text[products..users];
    assert!(products_block.contains("least_conn;"));
    assert!(products_block.contains("server 127.0.0.1:5001 max_fails=3 fail_timeout=30s;"));
    assert!(products_block.contains("server 127.0.0.1:5002 max_fails=3 fail_timeout=30s;"));
    assert!(products_block.contains("keepalive 32;"));
    assert!(!products_block.contains("5021"));

    for (route, upstream) in [
        ("/api/products", "products_backend"),
        ("/api/auth", "users_backend"),
        ("/api/users", "users_backend"),
    ] {
        let block = format!("location {route} {{\n            proxy_pass http://{upstream};");
        assert!(text.contains(&block), "missing {route}");
    }
    assert!(text.contains("location / {"));
}

#[test]
fn test_render_is_byte_identical_across_runs() {
    let settings = ProxySettings::default();
    let generator = ProxyConfigGenerator::new(settings.clone());
    let first = generator.render(&example_plan(&settings));
    let second = generator.render(&example_plan(&settings));
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn test_write_is_atomic_and_leaves_no_temp_file() {
    let fleet = common::Fleet::new();
    let path = fleet.path("conf.d/nginx.conf");
    let generator = generator(path.clone(), "nginx", &[], 1);

    let text = generator.render(&example_plan(generator.settings()));
    assert_eq!(generator.write(&text).unwrap(), path);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);

    let leftovers: Vec<_> = std::fs::read_dir(fleet.path("conf.d"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_missing_reload_binary_is_non_fatal() {
    let fleet = common::Fleet::new();
    let generator = generator(
        fleet.path("nginx.conf"),
        "/nonexistent/bin/nginx",
        &["-s", "reload"],
        5,
    );

    let err = generator.reload().await.unwrap_err();
    assert!(matches!(err, Error::ProxyReload(ref msg) if msg.contains("not found")));

    // apply still writes the config before the reload fails.
    let plan = example_plan(generator.settings());
    assert!(generator.apply(&plan).await.is_err());
    assert!(fleet.path("nginx.conf").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_successful_reload() {
    let fleet = common::Fleet::new();
    let generator = generator(fleet.path("nginx.conf"), "true", &["-s", "reload"], 5);

    generator.reload().await.unwrap();
    generator
        .apply(&example_plan(generator.settings()))
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_zero_reload_is_error() {
    let fleet = common::Fleet::new();
    let generator = generator(fleet.path("nginx.conf"), "false", &[], 5);

    let err = generator.reload().await.unwrap_err();
    assert!(matches!(err, Error::ProxyReload(ref msg) if msg.contains("exited with")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_reload_times_out() {
    let fleet = common::Fleet::new();
    let generator = generator(fleet.path("nginx.conf"), "sleep", &["30"], 1);

    let started = Instant::now();
    let err = generator.reload().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(err, Error::ProxyReload(ref msg) if msg.contains("did not finish")));
}
