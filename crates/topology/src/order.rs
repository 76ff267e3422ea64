//! Startup ordering over `depends_on` edges.

use crate::model::{Service, Topology};
use crate::{TopologyError, TopologyResult};
use std::collections::{BTreeMap, BTreeSet};

impl Topology {
    /// Enabled services with every dependency ahead of its dependents.
    ///
    /// Among services whose dependencies are all placed, the alphabetically
    /// first goes next, so the order is stable across runs.
    pub fn startup_order(&self) -> TopologyResult<Vec<&Service>> {
        let enabled: BTreeMap<&str, &Service> = self
            .enabled_services()
            .map(|s| (s.name.as_str(), s))
            .collect();

        let mut remaining_deps: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for service in enabled.values() {
            let mut unique = BTreeSet::new();
            for dep in &service.depends_on {
                let dependency = dep.service.as_str();
                match self.get(dependency) {
                    None => {
                        return Err(TopologyError::UnknownDependency {
                            service: service.name.clone(),
                            dependency: dependency.to_string(),
                        })
                    }
                    Some(target) if !self.is_enabled(target) => {
                        return Err(TopologyError::DisabledDependency {
                            service: service.name.clone(),
                            dependency: dependency.to_string(),
                        })
                    }
                    Some(_) => {}
                }
                if unique.insert(dependency) {
                    dependents.entry(dependency).or_default().push(service.name.as_str());
                }
            }
            remaining_deps.insert(service.name.as_str(), unique.len());
        }

        let mut ready: BTreeSet<&str> = remaining_deps
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(enabled.len());

        while let Some(name) = ready.pop_first() {
            order.push(enabled[name]);
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = remaining_deps.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < enabled.len() {
            let placed: BTreeSet<&str> = order.iter().map(|s| s.name.as_str()).collect();
            let stuck = enabled
                .keys()
                .filter(|name| !placed.contains(*name))
                .map(|name| name.to_string())
                .collect();
            return Err(TopologyError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Transitive dependencies of `name`, in startup order, excluding `name`.
    pub fn dependencies_of(&self, name: &str) -> TopologyResult<Vec<&Service>> {
        let root = self
            .get(name)
            .ok_or_else(|| TopologyError::UnknownService(name.to_string()))?;

        let mut needed = BTreeSet::new();
        let mut stack: Vec<&Service> = vec![root];
        while let Some(service) = stack.pop() {
            for dep in &service.depends_on {
                if needed.insert(dep.service.as_str()) {
                    let target = self.get(&dep.service).ok_or_else(|| TopologyError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dep.service.clone(),
                    })?;
                    stack.push(target);
                }
            }
        }

        Ok(self
            .startup_order()?
            .into_iter()
            .filter(|s| s.name != name && needed.contains(s.name.as_str()))
            .collect())
    }
}
