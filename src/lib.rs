//! # Muling Detector
//!
//! A graph-analytics engine that surfaces candidate money-muling networks in
//! batches of financial transactions.
//!
//! ## Features
//!
//! - **Directed multigraph**: transactions become a time-stamped, weighted
//!   multigraph with per-account aggregates computed in a single pass
//! - **Cycle detection**: simple directed cycles of length 3-5 (circular
//!   fund routing)
//! - **Fan detection**: fan-in/fan-out smurfing topologies inside a sliding
//!   time window
//! - **Shell-chain detection**: layering through low-activity intermediaries
//! - **Ring assembly**: overlapping findings merge into rings with stable
//!   identifiers and risk scores
//! - **Suspicion scoring**: deterministic multi-factor account scores with
//!   merchant false-positive dampening
//!
//! The engine is a pure batch transform: the same transactions and
//! configuration always produce the same report. Detectors run over an
//! immutable graph and may execute in parallel.

pub mod chains;
pub mod cycles;
pub mod fans;
pub mod graph;
pub mod report;
pub mod rings;
pub mod scoring;

pub use chains::ChainDetector;
pub use cycles::CycleDetector;
pub use fans::FanDetector;
pub use graph::{AccountStats, GraphMetrics, TransactionGraph};
pub use report::{AnalysisReport, FraudRing, ReportSummary, SuspiciousAccount};
pub use rings::{Finding, PatternKind, Ring, RingAssembler};
pub use scoring::{AccountAssessment, SuspicionScorer};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Analysis errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    ConfigurationError(String),
}

/// A validated transaction record.
///
/// Parsing and field validation happen upstream; the engine only rejects
/// records that violate its own input constraints (negative amounts, missing
/// endpoints, duplicate ids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txn_id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        txn_id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            txn_id: txn_id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum distinct counterparties for a fan finding.
    pub fan_min_spokes: usize,
    /// Sliding window for fan detection, in hours.
    pub fan_window_hours: i64,
    /// Minimum aggregate window amount for a fan finding (0 disables).
    pub fan_min_volume: f64,
    /// Minimum shell-chain length, in edges.
    pub chain_min_length: usize,
    /// Maximum transaction count for a chain intermediary.
    pub chain_max_intermediate_tx: usize,
    /// Relative amount tolerance between adjacent chain hops.
    pub chain_amount_tolerance: f64,
    /// Minimum final score for an account to be reported.
    pub suspicious_threshold: u8,
    /// Counterparty count above which the merchant dampening applies.
    pub merchant_counterparty_threshold: usize,
    /// Run the three detectors in parallel.
    pub parallel_detectors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fan_min_spokes: 10,
            fan_window_hours: 72,
            fan_min_volume: 0.0,
            chain_min_length: 4,
            chain_max_intermediate_tx: 3,
            chain_amount_tolerance: 0.10,
            suspicious_threshold: 50,
            merchant_counterparty_threshold: 1000,
            parallel_detectors: true,
        }
    }
}

impl EngineConfig {
    /// Reject out-of-range options before any work starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fan_min_spokes < 2 {
            return Err(EngineError::ConfigurationError(
                "fan_min_spokes must be at least 2".to_string(),
            ));
        }
        if self.fan_window_hours <= 0 {
            return Err(EngineError::ConfigurationError(
                "fan_window_hours must be positive".to_string(),
            ));
        }
        if !self.fan_min_volume.is_finite() || self.fan_min_volume < 0.0 {
            return Err(EngineError::ConfigurationError(
                "fan_min_volume must be non-negative".to_string(),
            ));
        }
        if self.chain_min_length < 2 {
            return Err(EngineError::ConfigurationError(
                "chain_min_length must be at least 2 edges".to_string(),
            ));
        }
        if self.chain_max_intermediate_tx == 0 {
            return Err(EngineError::ConfigurationError(
                "chain_max_intermediate_tx must be at least 1".to_string(),
            ));
        }
        if !self.chain_amount_tolerance.is_finite() || self.chain_amount_tolerance < 0.0 {
            return Err(EngineError::ConfigurationError(
                "chain_amount_tolerance must be non-negative".to_string(),
            ));
        }
        if self.suspicious_threshold > 100 {
            return Err(EngineError::ConfigurationError(
                "suspicious_threshold must be at most 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation signal, checked between outer-loop iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation; in-flight analyses abort at their next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Stage markers passed to the optional progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    GraphBuilt,
    DetectorsFinished,
    RingsAssembled,
    Scored,
}

type ProgressCallback = Box<dyn Fn(AnalysisPhase) + Send + Sync>;

/// The money-muling analysis engine.
///
/// A pure function of its inputs and configuration: no state survives an
/// [`AnalysisEngine::analyze`] call.
pub struct AnalysisEngine {
    config: EngineConfig,
    progress: Option<ProgressCallback>,
}

impl AnalysisEngine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with a custom configuration.
    ///
    /// Validation is deferred to [`AnalysisEngine::analyze`], which rejects
    /// out-of-range options before any work.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a callback invoked between analysis stages.
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(AnalysisPhase) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    /// Analyze a transaction batch and produce the fraud report.
    pub fn analyze(&self, batch: &[Transaction]) -> Result<AnalysisReport, EngineError> {
        self.analyze_with_cancel(batch, &CancelToken::new())
    }

    /// Analyze with a cooperative cancellation signal.
    ///
    /// Detectors check the token between outer-loop iterations; a cancelled
    /// run returns [`EngineError::Cancelled`] and no partial report.
    pub fn analyze_with_cancel(
        &self,
        batch: &[Transaction],
        cancel: &CancelToken,
    ) -> Result<AnalysisReport, EngineError> {
        self.config.validate()?;
        let started = Instant::now();

        let graph = TransactionGraph::build(batch)?;
        self.emit(AnalysisPhase::GraphBuilt);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let graph_ref = &graph;
        let config = &self.config;
        let (cycles, (fans, chains)) = if self.config.parallel_detectors {
            rayon::join(
                || CycleDetector::new(graph_ref).detect(cancel),
                || {
                    rayon::join(
                        || FanDetector::new(graph_ref, config).detect(cancel),
                        || ChainDetector::new(graph_ref, config).detect(cancel),
                    )
                },
            )
        } else {
            (
                CycleDetector::new(graph_ref).detect(cancel),
                (
                    FanDetector::new(graph_ref, config).detect(cancel),
                    ChainDetector::new(graph_ref, config).detect(cancel),
                ),
            )
        };
        let mut findings = cycles?;
        findings.extend(fans?);
        findings.extend(chains?);
        self.emit(AnalysisPhase::DetectorsFinished);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let rings = RingAssembler::new(&self.config).assemble(findings);
        self.emit(AnalysisPhase::RingsAssembled);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let assessments = SuspicionScorer::new(&graph, &self.config).score_accounts(&rings);
        self.emit(AnalysisPhase::Scored);

        let report = report::build_report(
            &graph,
            batch.len(),
            &rings,
            assessments,
            self.config.suspicious_threshold,
            started.elapsed(),
        );
        info!(
            accounts = report.summary.total_accounts_analyzed,
            suspicious = report.summary.suspicious_accounts_flagged,
            rings = report.summary.fraud_rings_detected,
            "analysis finished"
        );
        Ok(report)
    }

    fn emit(&self, phase: AnalysisPhase) {
        if let Some(callback) = &self.progress {
            callback(phase);
        }
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}
