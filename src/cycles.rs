//! Cycle detection over the transaction graph.
//!
//! Finds every simple directed cycle of length 3 to 5. Circular fund routing
//! is a primary layering signal: money leaves an account and returns to it
//! through a small number of intermediaries.

use std::collections::HashSet;

use tracing::debug;

use crate::graph::TransactionGraph;
use crate::rings::Finding;
use crate::{CancelToken, EngineError};

const MIN_CYCLE_LEN: usize = 3;
const MAX_CYCLE_LEN: usize = 5;

/// Bounded-depth cycle detector.
pub struct CycleDetector<'g> {
    graph: &'g TransactionGraph,
    neighbors: Vec<Vec<usize>>,
}

impl<'g> CycleDetector<'g> {
    pub fn new(graph: &'g TransactionGraph) -> Self {
        let neighbors = (0..graph.account_count())
            .map(|node| graph.distinct_out_neighbors(node))
            .collect();
        Self { graph, neighbors }
    }

    /// Find all simple directed cycles of length 3-5.
    ///
    /// Each cycle is emitted once, in canonical form: the rotation starting
    /// at the lexicographically smallest member, direction preserved. The
    /// same cycle reached from different starting nodes deduplicates against
    /// the canonical set.
    pub fn detect(&self, cancel: &CancelToken) -> Result<Vec<Finding>, EngineError> {
        let node_count = self.graph.account_count();
        let mut findings = Vec::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut path = Vec::with_capacity(MAX_CYCLE_LEN);
        let mut on_path = vec![false; node_count];

        for start in 0..node_count {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            path.push(start);
            on_path[start] = true;
            self.dfs(start, start, &mut path, &mut on_path, &mut seen, &mut findings);
            on_path[start] = false;
            path.pop();
        }

        debug!(cycles = findings.len(), "cycle detection finished");
        Ok(findings)
    }

    fn dfs(
        &self,
        start: usize,
        current: usize,
        path: &mut Vec<usize>,
        on_path: &mut Vec<bool>,
        seen: &mut HashSet<Vec<usize>>,
        findings: &mut Vec<Finding>,
    ) {
        for &next in &self.neighbors[current] {
            if next == start {
                if path.len() >= MIN_CYCLE_LEN {
                    let canonical = self.canonicalize(path);
                    if seen.insert(canonical.clone()) {
                        findings.push(self.make_finding(&canonical));
                    }
                }
            } else if !on_path[next] && path.len() < MAX_CYCLE_LEN {
                path.push(next);
                on_path[next] = true;
                self.dfs(start, next, path, on_path, seen, findings);
                on_path[next] = false;
                path.pop();
            }
        }
    }

    /// Rotate the cycle so the lexicographically smallest account id leads.
    fn canonicalize(&self, path: &[usize]) -> Vec<usize> {
        let pivot = path
            .iter()
            .enumerate()
            .min_by_key(|&(_, &node)| &self.graph.account(node).id)
            .map(|(position, _)| position)
            .unwrap_or(0);
        let mut canonical = Vec::with_capacity(path.len());
        canonical.extend_from_slice(&path[pivot..]);
        canonical.extend_from_slice(&path[..pivot]);
        canonical
    }

    fn make_finding(&self, cycle: &[usize]) -> Finding {
        let mut total_amount = 0.0;
        for (position, &node) in cycle.iter().enumerate() {
            let next = cycle[(position + 1) % cycle.len()];
            total_amount += self.graph.edge_volume(node, next);
        }
        Finding::Cycle {
            path: cycle
                .iter()
                .map(|&node| self.graph.account(node).id.clone())
                .collect(),
            edges: cycle.len(),
            total_amount,
        }
    }
}
