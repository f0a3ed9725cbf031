//! Dependency graph between rights of one rule set
//!
//! Nodes are rule names, edges point from a right to the rules its condition
//! references. Cycle detection uses a three-state DFS; evaluation order uses
//! Kahn's algorithm so that every right is classified after its references.

use crate::error::ConfigurationError;
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Graph-related errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Rights referencing each other in a loop
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
}

impl From<GraphError> for ConfigurationError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CircularDependency(path) => ConfigurationError::CircularReference { path },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Visiting,
    Done,
}

/// Dependency graph in declaration order
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
    nodes: IndexMap<String, Vec<String>>,
}

impl RuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; edges to names that never become nodes are leaves
    pub fn add_node(&mut self, name: impl Into<String>, dependencies: impl IntoIterator<Item = String>) {
        let entry = self.nodes.entry(name.into()).or_default();
        for dependency in dependencies {
            if !entry.contains(&dependency) {
                entry.push(dependency);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fail on the first cycle, reporting it as `a -> b -> a`
    pub fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut state: HashMap<&str, Visit> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for start in self.nodes.keys() {
            if !state.contains_key(start.as_str()) {
                self.visit(start, &mut state, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        state: &mut HashMap<&'a str, Visit>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        match state.get(node) {
            Some(Visit::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(node);
                return Err(GraphError::CircularDependency(cycle.join(" -> ")));
            }
            Some(Visit::Done) => return Ok(()),
            None => {}
        }

        state.insert(node, Visit::Visiting);
        path.push(node);

        if let Some(dependencies) = self.nodes.get(node) {
            for dependency in dependencies {
                if self.nodes.contains_key(dependency.as_str()) {
                    self.visit(dependency, state, path)?;
                }
            }
        }

        state.insert(node, Visit::Done);
        path.pop();
        Ok(())
    }

    /// Nodes ordered so that dependencies come first
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: IndexMap<&str, usize> = self.nodes.keys().map(|name| (name.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, dependencies) in &self.nodes {
            for dependency in dependencies.iter().filter(|d| self.nodes.contains_key(d.as_str())) {
                dependents.entry(dependency.as_str()).or_default().push(name.as_str());
                if let Some(degree) = in_degree.get_mut(name.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            sorted.push(current.to_string());
            for dependent in dependents.get(current).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            self.detect_cycles()?;
            return Err(GraphError::CircularDependency("unresolved rule ordering".to_string()));
        }

        Ok(sorted)
    }
}
