//! Execution graph construction.
//!
//! Validates one request's tool invocations and their declared dependencies,
//! producing an immutable DAG or rejecting the plan. Pure: no I/O, no clock.

use ragloom_core::error::GraphError;
use ragloom_core::tool::ToolInvocation;
use std::collections::HashMap;
use tracing::debug;

/// An acyclic dependency graph over one request's invocations.
///
/// Nodes are addressed by their position in the original plan, which keeps
/// every traversal deterministic. Never mutated after [`ExecutionGraph::build`].
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    nodes: Vec<ToolInvocation>,
    index: HashMap<String, usize>,
    /// `dependencies[n]`: nodes that must succeed before `n` runs (deduplicated).
    dependencies: Vec<Vec<usize>>,
    /// `dependents[n]`: nodes waiting on `n`.
    dependents: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl ExecutionGraph {
    /// Validate a plan and build its graph.
    ///
    /// Rejects duplicate ids, references to unknown ids, and cycles
    /// (a self-dependency is a cycle of length one).
    pub fn build(invocations: Vec<ToolInvocation>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(invocations.len());
        for (i, inv) in invocations.iter().enumerate() {
            if index.insert(inv.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateInvocation(inv.id.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); invocations.len()];
        let mut dependents = vec![Vec::new(); invocations.len()];
        for (i, inv) in invocations.iter().enumerate() {
            for dep_id in &inv.dependencies {
                let Some(&dep) = index.get(dep_id) else {
                    return Err(GraphError::InvalidDependency {
                        invocation: inv.id.clone(),
                        missing: dep_id.clone(),
                    });
                };
                if !dependencies[i].contains(&dep) {
                    dependencies[i].push(dep);
                    dependents[dep].push(i);
                }
            }
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            let cycle: Vec<String> = cycle
                .into_iter()
                .map(|n| invocations[n].id.clone())
                .collect();
            return Err(GraphError::CircularDependency { cycle });
        }

        let graph = Self {
            nodes: invocations,
            index,
            dependencies,
            dependents,
        };
        debug!(
            nodes = graph.len(),
            levels = graph.levels().len(),
            "Graph: built execution graph"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The invocation at plan position `node`.
    pub fn node(&self, node: usize) -> &ToolInvocation {
        &self.nodes[node]
    }

    /// All invocations in plan order.
    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.nodes
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// Number of unmet dependencies per node, before anything has run.
    pub fn in_degrees(&self) -> Vec<usize> {
        self.dependencies.iter().map(Vec::len).collect()
    }

    /// Topological levels: level 0 has no dependencies, level `k` depends
    /// only on levels `< k`. Ids within a level keep plan order.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut in_degree = self.in_degrees();
        let mut current: Vec<usize> = (0..self.len()).filter(|&n| in_degree[n] == 0).collect();
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &n in &current {
                for &d in &self.dependents[n] {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            next.sort_unstable();
            levels.push(current.iter().map(|&n| self.nodes[n].id.as_str()).collect());
            current = next;
        }

        levels
    }
}

/// Depth-first search tracking nodes on the current path. Reaching a node
/// that is still in progress means the path from it back to itself is a cycle.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];

    for root in 0..dependencies.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (node, index of the next dependency to visit)
        let mut path: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;

        while let Some(frame) = path.last_mut() {
            let node = frame.0;
            let Some(&dep) = dependencies[node].get(frame.1) else {
                marks[node] = Mark::Done;
                path.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    path.push((dep, 0));
                }
                Mark::InProgress => {
                    let start = path.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    return Some(path[start..].iter().map(|&(n, _)| n).collect());
                }
                Mark::Done => {}
            }
        }
    }

    None
}
