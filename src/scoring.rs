//! Suspicion scoring.
//!
//! Per-ring risk comes from the pattern type and its size; per-account
//! suspicion adds behavioral features (velocity, round amounts, balanced
//! flow, nighttime activity) on top of the account's riskiest ring, with
//! dampening for merchant-like accounts.

use std::collections::BTreeSet;

use tracing::debug;

use crate::graph::{AccountStats, TransactionGraph};
use crate::rings::{Finding, Ring};
use crate::EngineConfig;

/// Base risk contributed by a finding: pattern base plus a capped size bonus.
pub(crate) fn finding_base_score(finding: &Finding, config: &EngineConfig) -> u32 {
    match finding {
        Finding::Cycle { edges, .. } => {
            let extra = edges.saturating_sub(3) as u32;
            30 + (5 * extra).min(15)
        }
        Finding::FanIn { spokes, .. } | Finding::FanOut { spokes, .. } => {
            let extra = spokes.len().saturating_sub(config.fan_min_spokes) as u32;
            25 + (5 * extra).min(15)
        }
        Finding::ShellChain { hops, .. } => {
            let extra = hops.saturating_sub(config.chain_min_length) as u32;
            35 + (5 * extra).min(20)
        }
    }
}

/// Scoring outcome for one account.
#[derive(Debug, Clone)]
pub struct AccountAssessment {
    pub account_id: String,
    /// Final suspicion score, 0-100.
    pub score: u8,
    /// Labels of the ring patterns this account appears in, sorted.
    pub patterns: Vec<String>,
    /// Highest-risk ring containing the account; empty when none.
    pub ring_id: String,
}

/// Computes per-account suspicion scores from ring memberships and
/// behavioral features.
pub struct SuspicionScorer<'g> {
    graph: &'g TransactionGraph,
    config: &'g EngineConfig,
}

impl<'g> SuspicionScorer<'g> {
    pub fn new(graph: &'g TransactionGraph, config: &'g EngineConfig) -> Self {
        Self { graph, config }
    }

    /// Score every account in the graph, in node insertion order.
    pub fn score_accounts(&self, rings: &[Ring]) -> Vec<AccountAssessment> {
        let assessments: Vec<AccountAssessment> = self
            .graph
            .accounts()
            .iter()
            .map(|stats| self.assess(stats, rings))
            .collect();
        debug!(accounts = assessments.len(), "suspicion scoring finished");
        assessments
    }

    fn assess(&self, stats: &AccountStats, rings: &[Ring]) -> AccountAssessment {
        let memberships: Vec<&Ring> = rings
            .iter()
            .filter(|ring| ring.members.binary_search(&stats.id).is_ok())
            .collect();

        let ring_base = memberships
            .iter()
            .map(|ring| ring.risk_score as f64)
            .fold(0.0, f64::max);
        let behavioral = self.behavioral_score(stats) as f64;

        let mut score = ring_base + behavioral;
        if stats.distinct_counterparties > self.config.merchant_counterparty_threshold {
            score *= 0.5;
        }
        if one_directional(stats) {
            score *= 0.8;
        }
        let score = score.round_ties_even().clamp(0.0, 100.0) as u8;

        let patterns: BTreeSet<&'static str> = memberships
            .iter()
            .map(|ring| ring.pattern_type.label())
            .collect();

        // Representative ring: highest risk, smallest id on ties.
        let ring_id = memberships
            .iter()
            .min_by(|a, b| {
                b.risk_score
                    .cmp(&a.risk_score)
                    .then_with(|| a.ring_id.cmp(&b.ring_id))
            })
            .map(|ring| ring.ring_id.clone())
            .unwrap_or_default();

        AccountAssessment {
            account_id: stats.id.clone(),
            score,
            patterns: patterns.into_iter().map(str::to_string).collect(),
            ring_id,
        }
    }

    /// Behavioral component, up to 40 points.
    fn behavioral_score(&self, stats: &AccountStats) -> u32 {
        let mut score = 0u32;

        // Transaction velocity.
        let rate = stats.tx_count as f64 / stats.hours_active().max(1.0);
        score += ((rate * 3.0).round_ties_even() as u32).min(15);

        // Round-amount ratio.
        let round_ratio = stats.round_amount_count as f64 / stats.tx_count as f64;
        if round_ratio > 0.5 {
            score += 10;
        } else {
            score += ((round_ratio * 10.0).round_ties_even() as u32).min(5);
        }

        // Balanced in/out flow, the classic pass-through signature.
        let low = stats.in_volume.min(stats.out_volume);
        let high = stats.in_volume.max(stats.out_volume);
        let balance = low / high.max(1.0);
        if balance >= 0.8 {
            score += 8;
        } else if balance >= 0.6 {
            score += 4;
        }

        // Nighttime activity.
        let night_ratio = stats.night_count as f64 / stats.tx_count as f64;
        if night_ratio > 0.3 {
            score += 7;
        }

        score
    }
}

/// In/out volumes differing by more than 10x mark a strongly one-directional
/// account (pure collector or pure distributor).
fn one_directional(stats: &AccountStats) -> bool {
    let low = stats.in_volume.min(stats.out_volume);
    let high = stats.in_volume.max(stats.out_volume);
    high > 10.0 * low && high > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::rings::PatternKind;
    use crate::Transaction;

    fn tx_at(id: &str, sender: &str, receiver: &str, amount: f64, hour_offset: i64) -> Transaction {
        let base = Utc.with_ymd_and_hms(2026, 2, 18, 8, 0, 0).unwrap();
        Transaction {
            txn_id: id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            timestamp: base + Duration::hours(hour_offset),
        }
    }

    fn ring(id: &str, kind: PatternKind, members: &[&str], risk: u8) -> Ring {
        Ring {
            ring_id: id.to_string(),
            pattern_type: kind,
            members: members.iter().map(|m| m.to_string()).collect(),
            risk_score: risk,
            evidence: String::new(),
        }
    }

    #[test]
    fn test_cycle_base_score_with_size_bonus() {
        let config = EngineConfig::default();
        let finding = Finding::Cycle {
            path: vec!["A".into(), "B".into(), "C".into()],
            edges: 3,
            total_amount: 0.0,
        };
        assert_eq!(finding_base_score(&finding, &config), 30);

        let finding = Finding::Cycle {
            path: vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()],
            edges: 5,
            total_amount: 0.0,
        };
        assert_eq!(finding_base_score(&finding, &config), 40);
    }

    #[test]
    fn test_fan_base_score_caps_at_15_bonus() {
        let config = EngineConfig::default();
        let spokes: Vec<String> = (0..30).map(|i| format!("S{}", i)).collect();
        let finding = Finding::FanIn {
            hub: "X".into(),
            spokes,
            window_start: Utc.with_ymd_and_hms(2026, 2, 18, 0, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap(),
            total_amount: 0.0,
        };
        assert_eq!(finding_base_score(&finding, &config), 40);
    }

    #[test]
    fn test_chain_base_score_caps_at_20_bonus() {
        let config = EngineConfig::default();
        let finding = Finding::ShellChain {
            path: (0..12).map(|i| format!("N{}", i)).collect(),
            hops: 11,
            total_amount: 0.0,
            busiest_intermediate_tx: 1,
        };
        assert_eq!(finding_base_score(&finding, &config), 55);
    }

    #[test]
    fn test_behavioral_round_amounts_and_balance() {
        // A relays round amounts in and out within one hour.
        let batch = vec![
            tx_at("T1", "B", "A", 1000.0, 0),
            tx_at("T2", "A", "C", 1000.0, 1),
        ];
        let graph = TransactionGraph::build(&batch).unwrap();
        let config = EngineConfig::default();
        let scorer = SuspicionScorer::new(&graph, &config);
        let assessments = scorer.score_accounts(&[]);
        let a = assessments.iter().find(|x| x.account_id == "A").unwrap();
        // velocity: 2 tx / 1h -> min(15, 6) = 6; round ratio 1.0 -> 10;
        // balance 1.0 -> 8; night 0. Total 24.
        assert_eq!(a.score, 24);
        assert!(a.patterns.is_empty());
        assert_eq!(a.ring_id, "");
    }

    #[test]
    fn test_ring_membership_adds_ring_base() {
        let batch = vec![
            tx_at("T1", "B", "A", 1000.0, 0),
            tx_at("T2", "A", "C", 1000.0, 1),
        ];
        let graph = TransactionGraph::build(&batch).unwrap();
        let config = EngineConfig::default();
        let scorer = SuspicionScorer::new(&graph, &config);
        let rings = vec![ring("RING_001", PatternKind::Cycle, &["A", "B", "C"], 30)];
        let assessments = scorer.score_accounts(&rings);
        let a = assessments.iter().find(|x| x.account_id == "A").unwrap();
        assert_eq!(a.score, 54); // 30 ring base + 24 behavioral
        assert_eq!(a.patterns, vec!["cycle"]);
        assert_eq!(a.ring_id, "RING_001");
    }

    #[test]
    fn test_highest_risk_ring_is_representative() {
        let batch = vec![
            tx_at("T1", "B", "A", 1000.0, 0),
            tx_at("T2", "A", "C", 1000.0, 1),
        ];
        let graph = TransactionGraph::build(&batch).unwrap();
        let config = EngineConfig::default();
        let scorer = SuspicionScorer::new(&graph, &config);
        let rings = vec![
            ring("RING_001", PatternKind::Cycle, &["A", "B", "C"], 30),
            ring("RING_002", PatternKind::ShellChain, &["A", "D", "E"], 45),
        ];
        let assessments = scorer.score_accounts(&rings);
        let a = assessments.iter().find(|x| x.account_id == "A").unwrap();
        assert_eq!(a.ring_id, "RING_002");
        assert_eq!(a.patterns, vec!["cycle", "shell_chain"]);
        // max ring base 45 + behavioral 24 = 69
        assert_eq!(a.score, 69);
    }

    #[test]
    fn test_one_directional_dampening() {
        // A only receives: in/out ratio is infinite-like, 0.8 multiplier.
        let batch = vec![
            tx_at("T1", "B", "A", 1000.0, 0),
            tx_at("T2", "C", "A", 1000.0, 1),
        ];
        let graph = TransactionGraph::build(&batch).unwrap();
        let config = EngineConfig::default();
        let scorer = SuspicionScorer::new(&graph, &config);
        let rings = vec![ring("RING_001", PatternKind::Cycle, &["A", "B", "C"], 30)];
        let assessments = scorer.score_accounts(&rings);
        let a = assessments.iter().find(|x| x.account_id == "A").unwrap();
        // base 30 + (velocity 6 + round 10) = 46, x0.8 = 36.8 -> 37
        assert_eq!(a.score, 37);
    }

    #[test]
    fn test_merchant_dampening_halves_score() {
        let config = EngineConfig {
            merchant_counterparty_threshold: 3,
            ..EngineConfig::default()
        };
        let batch: Vec<Transaction> = (0..5)
            .map(|i| tx_at(&format!("T{}", i), &format!("S{}", i), "M", 100.0, i))
            .collect();
        let graph = TransactionGraph::build(&batch).unwrap();
        let scorer = SuspicionScorer::new(&graph, &config);
        let assessments = scorer.score_accounts(&[]);
        let m = assessments.iter().find(|x| x.account_id == "M").unwrap();
        // behavioral: velocity min(15, round(5/4*3)) = 4, round 10 -> 14;
        // merchant x0.5 = 7, one-directional x0.8 = 5.6 -> 6 (ties-even).
        assert_eq!(m.score, 6);
    }

    #[test]
    fn test_scores_clamped_to_100() {
        let batch = vec![
            tx_at("T1", "B", "A", 1000.0, 0),
            tx_at("T2", "A", "C", 1000.0, 0),
        ];
        let graph = TransactionGraph::build(&batch).unwrap();
        let config = EngineConfig::default();
        let scorer = SuspicionScorer::new(&graph, &config);
        let rings = vec![ring("RING_001", PatternKind::ShellChain, &["A"], 100)];
        let assessments = scorer.score_accounts(&rings);
        let a = assessments.iter().find(|x| x.account_id == "A").unwrap();
        assert_eq!(a.score, 100);
    }
}
