//! Proxy plan: which ports back which service, and under which routes.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::manifest::ProxySettings;
use crate::plan::WorkerInstance;

/// One upstream group per service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamGroup {
    pub service: String,
    /// Upstream block name, `"{service}_backend"`.
    pub upstream: String,
    /// Member ports, ascending.
    pub ports: BTreeSet<u16>,
    /// Path prefixes routed to this group, in render order.
    pub routes: Vec<String>,
}

/// Routing table derived from the worker set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyPlan {
    pub groups: Vec<UpstreamGroup>,
}

impl ProxyPlan {
    /// Group workers by service, in order of first appearance. Routes come
    /// from [`ProxySettings::routes_for`].
    pub fn build<'a>(
        workers: impl IntoIterator<Item = &'a WorkerInstance>,
        settings: &ProxySettings,
    ) -> Self {
        let mut groups: Vec<UpstreamGroup> = Vec::new();

        for worker in workers {
            if let Some(group) = groups.iter_mut().find(|g| g.service == worker.service) {
                group.ports.insert(worker.port);
                continue;
            }
            groups.push(UpstreamGroup {
                service: worker.service.clone(),
                upstream: upstream_name(&worker.service),
                ports: BTreeSet::from([worker.port]),
                routes: settings.routes_for(&worker.service),
            });
        }

        Self { groups }
    }

    pub fn group(&self, service: &str) -> Option<&UpstreamGroup> {
        self.groups.iter().find(|g| g.service == service)
    }
}

pub fn upstream_name(service: &str) -> String {
    format!("{service}_backend")
}
