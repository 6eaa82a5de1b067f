//! Dependency graph over declared resources, built with `petgraph`.
//!
//! Edges point from a dependency to its dependent, so a topological sort
//! yields dependencies first.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{DescriptorError, Result};

use super::resource::Resource;
use super::value::Address;

/// A dependency graph of resource addresses.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Address, ()>,
    nodes: HashMap<Address, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from explicit and inferred dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource depends on an undeclared address.
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Result<Self> {
        let resources: Vec<&Resource> = resources.into_iter().collect();
        let mut graph = Self::new();

        for resource in &resources {
            graph.add_node(resource.address());
        }

        for resource in &resources {
            for dependency in resource.dependencies() {
                if !graph.contains(&dependency) {
                    return Err(DescriptorError::DanglingReference {
                        from: resource.address().to_string(),
                        to: dependency.to_string(),
                    }
                    .into());
                }
                graph.add_dependency(resource.address(), &dependency);
            }
        }

        Ok(graph)
    }

    /// Adds a node, returning the existing index if already present.
    pub fn add_node(&mut self, address: &Address) -> NodeIndex {
        if let Some(index) = self.nodes.get(address) {
            return *index;
        }
        let index = self.graph.add_node(address.clone());
        self.nodes.insert(address.clone(), index);
        index
    }

    /// Adds an edge: `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: &Address, dependency: &Address) {
        let from = self.add_node(dependency);
        let to = self.add_node(dependent);
        self.graph.update_edge(from, to, ());
    }

    /// Returns true if `address` is a node.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains_key(address)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns every address, dependencies before dependents.
    ///
    /// Among nodes whose dependencies are satisfied, addresses are taken in
    /// sorted order so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn resolve_order(&self) -> Result<Vec<Address>> {
        if let Err(cycle) = petgraph::algo::toposort(&self.graph, None) {
            return Err(DescriptorError::Cycle {
                address: self.graph[cycle.node_id()].to_string(),
            }
            .into());
        }

        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let incoming = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count();
                (idx, incoming)
            })
            .collect();

        let mut ready: BTreeMap<Address, NodeIndex> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| (self.graph[*idx].clone(), *idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((address, idx)) = ready.pop_first() {
            order.push(address);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(self.graph[next].clone(), next);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Direct dependencies of `address`.
    #[must_use]
    pub fn dependencies_of(&self, address: &Address) -> BTreeSet<Address> {
        self.neighbors(address, Direction::Incoming)
    }

    /// Direct dependents of `address`.
    #[must_use]
    pub fn dependents_of(&self, address: &Address) -> BTreeSet<Address> {
        self.neighbors(address, Direction::Outgoing)
    }

    fn neighbors(&self, address: &Address, direction: Direction) -> BTreeSet<Address> {
        self.nodes
            .get(address)
            .map(|idx| {
                self.graph
                    .neighbors_directed(*idx, direction)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
