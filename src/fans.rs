//! Fan-in and fan-out detection (smurfing topologies).
//!
//! A fan-in is many distinct senders funneling into one receiver inside a
//! sliding time window; a fan-out is the mirror image. Windows slide over
//! each account's time-sorted incident transactions with a two-pointer scan.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::graph::TransactionGraph;
use crate::rings::Finding;
use crate::{CancelToken, EngineConfig, EngineError};

/// Sliding-window fan detector.
pub struct FanDetector<'g> {
    graph: &'g TransactionGraph,
    min_spokes: usize,
    window: Duration,
    min_volume: f64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

impl<'g> FanDetector<'g> {
    pub fn new(graph: &'g TransactionGraph, config: &EngineConfig) -> Self {
        Self {
            graph,
            min_spokes: config.fan_min_spokes,
            window: Duration::hours(config.fan_window_hours),
            min_volume: config.fan_min_volume,
        }
    }

    /// Detect fan-in and fan-out patterns for every account.
    ///
    /// One finding is emitted per maximal window; a window whose spoke set
    /// is a subset of an earlier emitted window's spokes (same hub, same
    /// direction) is subsumed and skipped. Windows are scanned in ascending
    /// start-time order, so ties resolve to the earliest start.
    pub fn detect(&self, cancel: &CancelToken) -> Result<Vec<Finding>, EngineError> {
        let mut findings = Vec::new();
        for hub in 0..self.graph.account_count() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            self.scan(hub, Direction::In, &mut findings);
            self.scan(hub, Direction::Out, &mut findings);
        }
        debug!(fans = findings.len(), "fan detection finished");
        Ok(findings)
    }

    fn scan(&self, hub: usize, direction: Direction, findings: &mut Vec<Finding>) {
        let edges = match direction {
            Direction::In => self.graph.in_edges(hub),
            Direction::Out => self.graph.out_edges(hub),
        };
        if edges.len() < self.min_spokes {
            return;
        }

        // (timestamp, counterparty, amount), time-sorted with the batch
        // index as tie-break so the scan order is reproducible.
        let mut entries: Vec<(DateTime<Utc>, usize, f64, usize)> = edges
            .iter()
            .map(|&(counterparty, txn_index)| {
                let tx = self.graph.transaction(txn_index);
                (tx.timestamp, counterparty, tx.amount, txn_index)
            })
            .collect();
        entries.sort_by_key(|&(timestamp, _, _, txn_index)| (timestamp, txn_index));

        let mut counts: HashMap<usize, usize> = HashMap::new();
        let mut volume = 0.0;
        let mut right = 0;
        let mut emitted: Vec<HashSet<usize>> = Vec::new();

        for left in 0..entries.len() {
            while right < entries.len() && entries[right].0 - entries[left].0 <= self.window {
                *counts.entry(entries[right].1).or_insert(0) += 1;
                volume += entries[right].2;
                right += 1;
            }

            if counts.len() >= self.min_spokes && volume >= self.min_volume {
                let spokes: HashSet<usize> = counts.keys().copied().collect();
                if !emitted.iter().any(|prior| spokes.is_subset(prior)) {
                    findings.push(self.make_finding(
                        hub,
                        direction,
                        &spokes,
                        entries[left].0,
                        entries[right - 1].0,
                        volume,
                    ));
                    emitted.push(spokes);
                }
            }

            // Retire the left entry before the window advances.
            if let Some(count) = counts.get_mut(&entries[left].1) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(&entries[left].1);
                }
            }
            volume -= entries[left].2;
        }
    }

    fn make_finding(
        &self,
        hub: usize,
        direction: Direction,
        spokes: &HashSet<usize>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_amount: f64,
    ) -> Finding {
        let mut spoke_ids: Vec<String> = spokes
            .iter()
            .map(|&node| self.graph.account(node).id.clone())
            .collect();
        spoke_ids.sort();
        let hub_id = self.graph.account(hub).id.clone();
        match direction {
            Direction::In => Finding::FanIn {
                hub: hub_id,
                spokes: spoke_ids,
                window_start,
                window_end,
                total_amount,
            },
            Direction::Out => Finding::FanOut {
                hub: hub_id,
                spokes: spoke_ids,
                window_start,
                window_end,
                total_amount,
            },
        }
    }
}
