//! Dependency scheduling using topological sort with DFS
//!
//! Edges come exclusively from the dependency sets recorded during
//! variable resolution; references to units outside the current template
//! are ignored since they cannot constrain ordering within the pass.

use crate::error::{Error, Result};
use crate::types::Unit;
use std::collections::{BTreeMap, BTreeSet};

/// Orders a resolved unit set by dependency
pub struct Scheduler {
    edges: BTreeMap<String, Vec<String>>,
}

impl Scheduler {
    /// Build the dependency graph from resolved units
    pub fn new(units: &[Unit]) -> Self {
        let names: BTreeSet<&str> = units.iter().map(|u| u.identity.name.as_str()).collect();

        let mut edges = BTreeMap::new();
        for unit in units {
            let deps: Vec<String> = unit
                .deps
                .iter()
                .filter(|dep| names.contains(dep.as_str()))
                .cloned()
                .collect();
            edges.insert(unit.identity.name.clone(), deps);
        }
        Self { edges }
    }

    /// Dependencies-first order, used by deploy/info-class actions so a
    /// unit's outputs exist before any dependent consumes them.
    pub fn deploy_order(&self) -> Result<Vec<String>> {
        let mut resolved = Vec::new();
        let mut seen = BTreeSet::new();
        let mut visiting = Vec::new();

        for name in self.edges.keys() {
            self.visit(name, &mut resolved, &mut seen, &mut visiting)?;
        }
        Ok(resolved)
    }

    /// Exact reverse of the deploy order: dependents are torn down before
    /// the units they reference, or the remote side rejects the removal.
    pub fn remove_order(&self) -> Result<Vec<String>> {
        let mut order = self.deploy_order()?;
        order.reverse();
        Ok(order)
    }

    /// Visit a unit node using DFS
    fn visit(
        &self,
        name: &str,
        resolved: &mut Vec<String>,
        seen: &mut BTreeSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<()> {
        if visiting.iter().any(|n| n == name) {
            return Err(Error::circular_dependency(render_cycle(visiting, name)));
        }

        if seen.contains(name) {
            return Ok(());
        }

        visiting.push(name.to_string());

        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                self.visit(dep, resolved, seen, visiting)?;
            }
        }

        visiting.pop();
        seen.insert(name.to_string());
        resolved.push(name.to_string());

        Ok(())
    }
}

fn render_cycle(visiting: &[String], repeated: &str) -> String {
    let mut cycle: Vec<&str> = visiting
        .iter()
        .skip_while(|n| n.as_str() != repeated)
        .map(String::as_str)
        .collect();
    cycle.push(repeated);
    cycle.join(" -> ")
}
