//! nginx configuration rendering.
//!
//! Output depends only on the plan and the proxy settings: no timestamps, no
//! hash-map iteration, so identical input renders byte-identical text.

use std::fmt::Write as _;

use super::plan::{ProxyPlan, UpstreamGroup};
use crate::constants::WORKER_HOST;
use crate::manifest::{ProxySettings, StaticLocation};

/// Render the complete nginx configuration.
pub fn render(plan: &ProxyPlan, settings: &ProxySettings) -> String {
    let mut out = String::new();

    out.push_str("# Generated by fleetd. Manual edits are overwritten.\n");
    out.push_str("worker_processes  auto;\n\n");
    out.push_str("events {\n    worker_connections  1024;\n}\n\n");
    out.push_str("http {\n");
    out.push_str("    include       mime.types;\n");
    out.push_str("    default_type  application/json;\n");
    out.push_str("    sendfile        on;\n");
    out.push_str("    keepalive_timeout  65;\n\n");

    for group in &plan.groups {
        render_upstream(&mut out, group, settings);
    }

    out.push_str("    server {\n");
    let _ = writeln!(out, "        listen {};", settings.listen);
    out.push_str("        server_name _;\n\n");

    if let Some(location) = &settings.static_location {
        render_static(&mut out, location);
    }

    for group in &plan.groups {
        for route in &group.routes {
            render_location(&mut out, route, &group.upstream);
        }
    }

    render_catch_all(&mut out, &settings.banner);

    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

fn render_upstream(out: &mut String, group: &UpstreamGroup, settings: &ProxySettings) {
    let _ = writeln!(out, "    upstream {} {{", group.upstream);
    out.push_str("        least_conn;\n");
    for port in &group.ports {
        let _ = writeln!(
            out,
            "        server {WORKER_HOST}:{port} max_fails={} fail_timeout={}s;",
            settings.max_fails, settings.fail_timeout_secs
        );
    }
    let _ = writeln!(out, "        keepalive {};", settings.keepalive);
    out.push_str("    }\n\n");
}

fn render_static(out: &mut String, location: &StaticLocation) {
    let mut root = location.root.display().to_string();
    if !root.ends_with('/') {
        root.push('/');
    }
    let _ = writeln!(out, "        location {} {{", location.prefix);
    let _ = writeln!(out, "            alias {root};");
    let _ = writeln!(out, "            index {};", location.index);
    out.push_str("        }\n\n");
}

fn render_location(out: &mut String, route: &str, upstream: &str) {
    let _ = writeln!(out, "        location {route} {{");
    let _ = writeln!(out, "            proxy_pass http://{upstream};");
    out.push_str("            proxy_set_header Host $host;\n");
    out.push_str("            proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("            proxy_http_version 1.1;\n");
    out.push_str("            proxy_set_header Connection \"\";\n");
    out.push_str("        }\n\n");
}

fn render_catch_all(out: &mut String, banner: &str) {
    let body = serde_json::json!({ "api": banner, "status": "running" }).to_string();
    out.push_str("        location / {\n");
    let _ = writeln!(out, "            return 200 '{}';", body.replace('\'', "\\'"));
    out.push_str("            add_header Content-Type application/json;\n");
    out.push_str("        }\n");
}
