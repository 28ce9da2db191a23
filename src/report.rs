//! Report assembly.
//!
//! Emits the stable JSON contract: summary statistics, the suspicious
//! account list and the fraud ring list, with fixed field and sort orders.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::TransactionGraph;
use crate::rings::Ring;
use crate::scoring::AccountAssessment;

/// Aggregate statistics for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_transactions: usize,
    pub total_accounts_analyzed: usize,
    pub suspicious_accounts_flagged: usize,
    pub fraud_rings_detected: usize,
    /// Wall time of the analysis, rounded to 3 decimal places.
    pub processing_time_seconds: f64,
}

/// An account whose suspicion score reached the reporting threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousAccount {
    pub account_id: String,
    pub suspicion_score: u8,
    pub detected_patterns: Vec<String>,
    /// Highest-risk ring containing the account; empty when none.
    pub ring_id: String,
}

/// A detected fraud ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRing {
    pub ring_id: String,
    pub pattern_type: String,
    pub member_accounts: Vec<String>,
    pub risk_score: u8,
    pub evidence: String,
}

/// The analysis result in contract order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: ReportSummary,
    pub suspicious_accounts: Vec<SuspiciousAccount>,
    pub fraud_rings: Vec<FraudRing>,
}

impl AnalysisReport {
    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Assemble the final report from the scored accounts and rings.
pub(crate) fn build_report(
    graph: &TransactionGraph,
    total_transactions: usize,
    rings: &[Ring],
    assessments: Vec<AccountAssessment>,
    suspicious_threshold: u8,
    elapsed: Duration,
) -> AnalysisReport {
    let mut suspicious_accounts: Vec<SuspiciousAccount> = assessments
        .into_iter()
        .filter(|assessment| assessment.score >= suspicious_threshold)
        .map(|assessment| SuspiciousAccount {
            account_id: assessment.account_id,
            suspicion_score: assessment.score,
            detected_patterns: assessment.patterns,
            ring_id: assessment.ring_id,
        })
        .collect();
    suspicious_accounts.sort_by(|a, b| {
        b.suspicion_score
            .cmp(&a.suspicion_score)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });

    let mut fraud_rings: Vec<FraudRing> = rings
        .iter()
        .map(|ring| FraudRing {
            ring_id: ring.ring_id.clone(),
            pattern_type: ring.pattern_type.label().to_string(),
            member_accounts: ring.members.clone(),
            risk_score: ring.risk_score,
            evidence: ring.evidence.clone(),
        })
        .collect();
    fraud_rings.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.ring_id.cmp(&b.ring_id))
    });

    AnalysisReport {
        summary: ReportSummary {
            total_transactions,
            total_accounts_analyzed: graph.account_count(),
            suspicious_accounts_flagged: suspicious_accounts.len(),
            fraud_rings_detected: fraud_rings.len(),
            processing_time_seconds: (elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
        },
        suspicious_accounts,
        fraud_rings,
    }
}
