// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! DAG (Directed Acyclic Graph) builder for step dependencies
//!
//! Edges run from producer to consumer. Ordering is deterministic: when
//! several steps are ready at once, the lexically smallest name goes first.

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use crate::errors::{TrainflowError, TrainflowResult};
use crate::pipeline::StepNode;

/// Builder for step dependency DAGs
pub struct DagBuilder {
    graph: DiGraph<String, ()>,
    name_to_index: BTreeMap<String, NodeIndex>,
}

impl DagBuilder {
    /// Build a DAG from a set of steps keyed by name
    pub fn build(steps: &BTreeMap<String, StepNode>) -> TrainflowResult<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = BTreeMap::new();

        for name in steps.keys() {
            let node = graph.add_node(name.clone());
            name_to_index.insert(name.clone(), node);
        }

        for step in steps.values() {
            let consumer = name_to_index[&step.name];

            for producer in step.depends_on() {
                let producer_node =
                    name_to_index
                        .get(producer)
                        .ok_or_else(|| TrainflowError::UnknownStep {
                            step: step.name.clone(),
                            dependency: producer.clone(),
                        })?;

                graph.add_edge(*producer_node, consumer, ());
            }
        }

        let dag = Self {
            graph,
            name_to_index,
        };
        dag.validate_acyclic()?;

        Ok(dag)
    }

    fn validate_acyclic(&self) -> TrainflowResult<()> {
        match self.find_cycle() {
            Some(steps) => Err(TrainflowError::CircularDependency { steps }),
            None => Ok(()),
        }
    }

    /// One cycle, as a closed walk such as `[a, b, a]`
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let component = tarjan_scc(&self.graph).into_iter().find(|scc| {
            scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
        })?;

        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let start = component
            .iter()
            .copied()
            .min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]))?;

        let mut path = vec![start];
        loop {
            let current = *path.last()?;
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|n| members.contains(n))
                .min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]))?;

            if let Some(pos) = path.iter().position(|n| *n == next) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|n| self.graph[*n].clone()).collect();
                cycle.push(self.graph[next].clone());
                return Some(cycle);
            }
            path.push(next);
        }
    }

    /// Step names in execution order (Kahn's algorithm, lexical tie-break)
    pub fn topological_order(&self) -> TrainflowResult<Vec<String>> {
        let mut in_degree: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| {
                (
                    n,
                    self.graph.neighbors_directed(n, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(String, usize)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(n, _)| Reverse((self.graph[*n].clone(), n.index())))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((name, index))) = ready.pop() {
            let node = NodeIndex::new(index);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.graph[next].clone(), next.index())));
                    }
                }
            }
            order.push(name);
        }

        if order.len() < self.graph.node_count() {
            let steps = self.find_cycle().unwrap_or_default();
            return Err(TrainflowError::CircularDependency { steps });
        }

        Ok(order)
    }

    /// Direct producers of a step, sorted
    pub fn dependencies(&self, step: &str) -> Option<Vec<String>> {
        self.neighbors(step, Direction::Incoming)
    }

    /// Direct consumers of a step, sorted
    pub fn dependents(&self, step: &str) -> Option<Vec<String>> {
        self.neighbors(step, Direction::Outgoing)
    }

    fn neighbors(&self, step: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(step)?;
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort();
        names.dedup();
        Some(names)
    }

    /// Check if step A depends (directly or transitively) on step B
    pub fn depends_on(&self, step_a: &str, step_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(step_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(step_b) else {
            return false;
        };

        step_a != step_b && has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .raw_edges()
            .iter()
            .map(|e| {
                (
                    self.graph[e.source()].as_str(),
                    self.graph[e.target()].as_str(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for name in self.name_to_index.keys() {
            out.push_str(&format!("    {}[{}]\n", name, name));
        }

        for (from, to) in self.edges() {
            out.push_str(&format!("    {} --> {}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        for (name, node) in &self.name_to_index {
            if self.graph.neighbors_undirected(*node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, steps: &BTreeMap<String, StepNode>) -> TrainflowResult<String> {
        let mut out = String::new();

        for (i, name) in self.topological_order()?.iter().enumerate() {
            let kind = steps
                .get(name)
                .map(|s| s.kind.to_string())
                .unwrap_or_default();
            let deps = self.dependencies(name).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, name, kind));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}
