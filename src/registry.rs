//! Owned registry of worker instances.
//!
//! The supervisor is the single owner. Instances are never added or
//! removed after construction; callers mutate them through `&mut` access,
//! so there is exactly one writer at any time.

use std::collections::HashMap;

use crate::plan::WorkerInstance;

/// Worker instances in plan order, indexed by id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Vec<WorkerInstance>,
    index: HashMap<String, usize>,
}

impl WorkerRegistry {
    /// Build the registry from a plan. Order is preserved.
    ///
    /// Plans built from a validated manifest have unique ids; should a
    /// duplicate slip through, lookups resolve to the first occurrence.
    pub fn new(workers: Vec<WorkerInstance>) -> Self {
        let mut index = HashMap::with_capacity(workers.len());
        for (i, worker) in workers.iter().enumerate() {
            index.entry(worker.id.clone()).or_insert(i);
        }
        Self { workers, index }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Look up an instance by id.
    pub fn get(&self, id: &str) -> Option<&WorkerInstance> {
        self.index.get(id).map(|&i| &self.workers[i])
    }

    /// Look up an instance by id for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut WorkerInstance> {
        self.index.get(id).map(|&i| &mut self.workers[i])
    }

    /// All instances in plan order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerInstance> {
        self.workers.iter()
    }

    /// All instances in plan order, mutable.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkerInstance> {
        self.workers.iter_mut()
    }

    /// Instances belonging to one service, in instance order.
    pub fn by_service<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a WorkerInstance> {
        self.workers.iter().filter(move |w| w.service == service)
    }

    /// Instances belonging to one service, mutable.
    pub fn by_service_mut<'a>(
        &'a mut self,
        service: &'a str,
    ) -> impl Iterator<Item = &'a mut WorkerInstance> {
        self.workers.iter_mut().filter(move |w| w.service == service)
    }

    /// Instance ids in plan order.
    pub fn ids(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ServiceSpec;
    use crate::plan::build_plan;
    use std::path::PathBuf;

    fn registry() -> WorkerRegistry {
        let services = [
            ServiceSpec {
                name: "products".into(),
                script: PathBuf::from("p.x"),
                worker_count: 2,
                threads: 4,
                start_port: 5001,
                interpreter: None,
                env: Default::default(),
            },
            ServiceSpec {
                name: "users".into(),
                script: PathBuf::from("u.x"),
                worker_count: 1,
                threads: 4,
                start_port: 5021,
                interpreter: None,
                env: Default::default(),
            },
        ];
        WorkerRegistry::new(build_plan(&services))
    }

    #[test]
    fn test_lookup_by_id() {
        let reg = registry();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get("products_worker2").map(|w| w.port), Some(5002));
        assert!(reg.get("orders_worker1").is_none());
    }

    #[test]
    fn test_plan_order_preserved() {
        let reg = registry();
        assert_eq!(
            reg.ids(),
            vec!["products_worker1", "products_worker2", "users_worker1"]
        );
    }

    #[test]
    fn test_by_service() {
        let reg = registry();
        let ports: Vec<u16> = reg.by_service("products").map(|w| w.port).collect();
        assert_eq!(ports, vec![5001, 5002]);
        assert_eq!(reg.by_service("users").count(), 1);
        assert_eq!(reg.by_service("orders").count(), 0);
    }

    #[test]
    fn test_mutation_through_accessor() {
        let mut reg = registry();
        reg.get_mut("users_worker1").unwrap().restart_count = 3;
        assert_eq!(reg.get("users_worker1").unwrap().restart_count(), 3);
        assert_eq!(reg.get("products_worker1").unwrap().restart_count(), 0);
    }
}
