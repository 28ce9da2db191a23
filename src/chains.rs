//! Shell-chain detection (layering through low-activity intermediaries).
//!
//! A shell chain is a linear flow whose intermediate accounts have almost no
//! other activity, passing roughly the same amount hop after hop with
//! non-decreasing timestamps. The endpoints may be busy accounts.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::graph::TransactionGraph;
use crate::rings::Finding;
use crate::{CancelToken, EngineConfig, EngineError};

/// Extra hops explored beyond the minimum chain length before pruning.
const EXTRA_DEPTH: usize = 3;

/// DFS-based shell-chain detector.
pub struct ChainDetector<'g> {
    graph: &'g TransactionGraph,
    min_edges: usize,
    max_edges: usize,
    shell_tx_cap: usize,
    tolerance: f64,
}

impl<'g> ChainDetector<'g> {
    pub fn new(graph: &'g TransactionGraph, config: &EngineConfig) -> Self {
        Self {
            graph,
            min_edges: config.chain_min_length,
            max_edges: config.chain_min_length + EXTRA_DEPTH,
            shell_tx_cap: config.chain_max_intermediate_tx,
            tolerance: config.chain_amount_tolerance,
        }
    }

    /// Detect maximal shell chains.
    ///
    /// Chains are recorded at every qualifying length during the DFS; a
    /// second pass discards any chain whose node sequence is a strict
    /// contiguous sub-path of another recorded chain, leaving only maximal
    /// chains.
    pub fn detect(&self, cancel: &CancelToken) -> Result<Vec<Finding>, EngineError> {
        let node_count = self.graph.account_count();
        let mut recorded: Vec<(Vec<usize>, f64)> = Vec::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut path = Vec::with_capacity(self.max_edges + 1);
        let mut on_path = vec![false; node_count];

        for start in 0..node_count {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.graph.out_edges(start).is_empty() {
                continue;
            }
            path.push(start);
            on_path[start] = true;
            self.dfs(start, None, 0.0, &mut path, &mut on_path, &mut seen, &mut recorded);
            on_path[start] = false;
            path.pop();
        }

        let findings = self.keep_maximal(recorded);
        debug!(chains = findings.len(), "shell-chain detection finished");
        Ok(findings)
    }

    fn dfs(
        &self,
        current: usize,
        last_hop: Option<(f64, DateTime<Utc>)>,
        running_total: f64,
        path: &mut Vec<usize>,
        on_path: &mut Vec<bool>,
        seen: &mut HashSet<Vec<usize>>,
        recorded: &mut Vec<(Vec<usize>, f64)>,
    ) {
        let edge_count = path.len() - 1;
        if edge_count >= self.min_edges && seen.insert(path.clone()) {
            recorded.push((path.clone(), running_total));
        }
        if edge_count >= self.max_edges {
            return;
        }
        // Extending past `current` turns it into an intermediary, which must
        // be a shell; only the chain source is exempt.
        if path.len() >= 2 && self.graph.account(current).tx_count > self.shell_tx_cap {
            return;
        }

        for &(next, txn_index) in self.graph.out_edges(current) {
            if on_path[next] {
                continue;
            }
            let tx = self.graph.transaction(txn_index);
            if let Some((prev_amount, prev_ts)) = last_hop {
                if tx.timestamp < prev_ts || !self.amounts_compatible(prev_amount, tx.amount) {
                    continue;
                }
            }
            path.push(next);
            on_path[next] = true;
            self.dfs(
                next,
                Some((tx.amount, tx.timestamp)),
                running_total + tx.amount,
                path,
                on_path,
                seen,
                recorded,
            );
            on_path[next] = false;
            path.pop();
        }
    }

    /// Adjacent hops must carry roughly the same amount.
    fn amounts_compatible(&self, previous: f64, next: f64) -> bool {
        if previous == 0.0 {
            return next == 0.0;
        }
        (next - previous).abs() / previous <= self.tolerance
    }

    fn keep_maximal(&self, recorded: Vec<(Vec<usize>, f64)>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (index, (path, total)) in recorded.iter().enumerate() {
            let subsumed = recorded.iter().enumerate().any(|(other_index, (other, _))| {
                other_index != index
                    && other.len() > path.len()
                    && is_contiguous_subpath(path, other)
            });
            if !subsumed {
                findings.push(self.make_finding(path, *total));
            }
        }
        findings
    }

    fn make_finding(&self, path: &[usize], total_amount: f64) -> Finding {
        let busiest_intermediate_tx = path[1..path.len() - 1]
            .iter()
            .map(|&node| self.graph.account(node).tx_count)
            .max()
            .unwrap_or(0);
        Finding::ShellChain {
            path: path
                .iter()
                .map(|&node| self.graph.account(node).id.clone())
                .collect(),
            hops: path.len() - 1,
            total_amount,
            busiest_intermediate_tx,
        }
    }
}

fn is_contiguous_subpath(needle: &[usize], haystack: &[usize]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
