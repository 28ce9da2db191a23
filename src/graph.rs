//! Transaction graph construction and per-account aggregates.
//!
//! Builds a directed, time-stamped multigraph from a validated transaction
//! batch. Nodes and edges live in contiguous arrays; adjacency stores integer
//! indices so the detectors can share the graph immutably across threads.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{EngineError, Transaction};

/// Aggregate statistics for a single account, computed in one pass over the
/// batch.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStats {
    /// Account identifier (opaque string).
    pub id: String,
    /// Total incident transactions (incoming + outgoing).
    pub tx_count: usize,
    /// Incoming transaction count.
    pub in_count: usize,
    /// Outgoing transaction count.
    pub out_count: usize,
    /// Total amount received.
    pub in_volume: f64,
    /// Total amount sent.
    pub out_volume: f64,
    /// Incident transactions whose amount is a whole multiple of 100.
    pub round_amount_count: usize,
    /// Incident transactions timestamped between 22:00 and 06:00.
    pub night_count: usize,
    /// Timestamp of the earliest incident transaction.
    pub first_ts: DateTime<Utc>,
    /// Timestamp of the latest incident transaction.
    pub last_ts: DateTime<Utc>,
    /// Number of distinct accounts this account transacted with.
    pub distinct_counterparties: usize,
}

impl AccountStats {
    fn new(id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            tx_count: 0,
            in_count: 0,
            out_count: 0,
            in_volume: 0.0,
            out_volume: 0.0,
            round_amount_count: 0,
            night_count: 0,
            first_ts: timestamp,
            last_ts: timestamp,
            distinct_counterparties: 0,
        }
    }

    /// Hours between the first and last incident transaction.
    pub fn hours_active(&self) -> f64 {
        (self.last_ts - self.first_ts).num_seconds() as f64 / 3600.0
    }
}

/// Whole-graph statistics and build diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct GraphMetrics {
    pub account_count: usize,
    pub transaction_count: usize,
    pub self_loops_dropped: usize,
    pub total_volume: f64,
}

/// Directed transaction multigraph.
///
/// Accounts are stored in insertion order of first appearance; adjacency
/// lists hold `(neighbor_index, txn_index)` pairs in batch order. The graph
/// is immutable once built, so detectors can run over it in parallel.
#[derive(Debug)]
pub struct TransactionGraph {
    accounts: Vec<AccountStats>,
    index: HashMap<String, usize>,
    transactions: Vec<Transaction>,
    out_edges: Vec<Vec<(usize, usize)>>,
    in_edges: Vec<Vec<(usize, usize)>>,
    self_loops_dropped: usize,
}

impl TransactionGraph {
    /// Build the graph from a transaction batch.
    ///
    /// Self-loops are dropped silently (counted in [`GraphMetrics`]).
    /// Returns [`EngineError::MalformedBatch`] when a record carries a
    /// negative or non-finite amount, an empty endpoint, or a duplicate
    /// transaction id.
    pub fn build(batch: &[Transaction]) -> Result<Self, EngineError> {
        let mut graph = Self {
            accounts: Vec::new(),
            index: HashMap::new(),
            transactions: Vec::new(),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            self_loops_dropped: 0,
        };
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(batch.len());
        let mut counterparties: Vec<HashSet<usize>> = Vec::new();

        for tx in batch {
            validate_record(tx)?;
            if !seen_ids.insert(tx.txn_id.as_str()) {
                return Err(EngineError::MalformedBatch(format!(
                    "duplicate transaction id: {}",
                    tx.txn_id
                )));
            }
            if tx.sender == tx.receiver {
                graph.self_loops_dropped += 1;
                continue;
            }

            let sender = graph.intern(&tx.sender, tx.timestamp, &mut counterparties);
            let receiver = graph.intern(&tx.receiver, tx.timestamp, &mut counterparties);
            let txn_index = graph.transactions.len();
            graph.transactions.push(tx.clone());
            graph.out_edges[sender].push((receiver, txn_index));
            graph.in_edges[receiver].push((sender, txn_index));

            let round = tx.amount % 100.0 == 0.0;
            let night = is_night(tx.timestamp);

            let s = &mut graph.accounts[sender];
            s.tx_count += 1;
            s.out_count += 1;
            s.out_volume += tx.amount;
            s.round_amount_count += round as usize;
            s.night_count += night as usize;
            s.first_ts = s.first_ts.min(tx.timestamp);
            s.last_ts = s.last_ts.max(tx.timestamp);
            counterparties[sender].insert(receiver);

            let r = &mut graph.accounts[receiver];
            r.tx_count += 1;
            r.in_count += 1;
            r.in_volume += tx.amount;
            r.round_amount_count += round as usize;
            r.night_count += night as usize;
            r.first_ts = r.first_ts.min(tx.timestamp);
            r.last_ts = r.last_ts.max(tx.timestamp);
            counterparties[receiver].insert(sender);
        }

        for (node, set) in counterparties.iter().enumerate() {
            graph.accounts[node].distinct_counterparties = set.len();
        }

        debug!(
            accounts = graph.accounts.len(),
            transactions = graph.transactions.len(),
            self_loops_dropped = graph.self_loops_dropped,
            "transaction graph built"
        );

        Ok(graph)
    }

    fn intern(
        &mut self,
        id: &str,
        timestamp: DateTime<Utc>,
        counterparties: &mut Vec<HashSet<usize>>,
    ) -> usize {
        if let Some(&node) = self.index.get(id) {
            return node;
        }
        let node = self.accounts.len();
        self.accounts.push(AccountStats::new(id, timestamp));
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        counterparties.push(HashSet::new());
        self.index.insert(id.to_string(), node);
        node
    }

    /// Number of accounts in the graph.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Account stats by node index.
    pub fn account(&self, node: usize) -> &AccountStats {
        &self.accounts[node]
    }

    /// All accounts in insertion order of first appearance.
    pub fn accounts(&self) -> &[AccountStats] {
        &self.accounts
    }

    /// Node index for an account id, if present.
    pub fn account_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Account stats by id, if present.
    pub fn account_stats(&self, id: &str) -> Option<&AccountStats> {
        self.account_index(id).map(|node| &self.accounts[node])
    }

    /// Transaction by edge index.
    pub fn transaction(&self, txn_index: usize) -> &Transaction {
        &self.transactions[txn_index]
    }

    /// All kept transactions in batch order (self-loops excluded).
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Outgoing `(neighbor, txn_index)` pairs for a node, in batch order.
    pub fn out_edges(&self, node: usize) -> &[(usize, usize)] {
        &self.out_edges[node]
    }

    /// Incoming `(neighbor, txn_index)` pairs for a node, in batch order.
    pub fn in_edges(&self, node: usize) -> &[(usize, usize)] {
        &self.in_edges[node]
    }

    /// Distinct out-neighbors of a node, sorted by node index.
    ///
    /// Parallel edges collapse to a single entry; index order equals first
    /// appearance order, keeping traversals deterministic.
    pub fn distinct_out_neighbors(&self, node: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self.out_edges[node].iter().map(|&(n, _)| n).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Sum of amounts over every parallel edge from `from` to `to`.
    pub fn edge_volume(&self, from: usize, to: usize) -> f64 {
        self.out_edges[from]
            .iter()
            .filter(|&&(n, _)| n == to)
            .map(|&(_, t)| self.transactions[t].amount)
            .sum()
    }

    /// Whole-graph metrics and build diagnostics.
    pub fn metrics(&self) -> GraphMetrics {
        GraphMetrics {
            account_count: self.accounts.len(),
            transaction_count: self.transactions.len(),
            self_loops_dropped: self.self_loops_dropped,
            total_volume: self.transactions.iter().map(|tx| tx.amount).sum(),
        }
    }
}

fn validate_record(tx: &Transaction) -> Result<(), EngineError> {
    if tx.sender.is_empty() || tx.receiver.is_empty() {
        return Err(EngineError::MalformedBatch(format!(
            "transaction {} is missing an endpoint",
            tx.txn_id
        )));
    }
    if !tx.amount.is_finite() || tx.amount < 0.0 {
        return Err(EngineError::MalformedBatch(format!(
            "transaction {} has invalid amount {}",
            tx.txn_id, tx.amount
        )));
    }
    Ok(())
}

/// Nighttime is 22:00-24:00 or 00:00-06:00.
fn is_night(timestamp: DateTime<Utc>) -> bool {
    let hour = timestamp.hour();
    hour >= 22 || hour < 6
}
