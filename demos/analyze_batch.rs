//! Batch analysis example
//!
//! This example builds a small transaction batch containing a cycle, a
//! fan-in and a shell chain, runs the analysis engine and prints the report.

use chrono::{Duration, TimeZone, Utc};
use muling_detector::{AnalysisEngine, AnalysisPhase, Transaction};

fn main() {
    println!("=== Money-Muling Network Detector ===\n");

    let base = Utc.with_ymd_and_hms(2026, 2, 18, 9, 0, 0).unwrap();
    let at = |hours: i64| base + Duration::hours(hours);
    let mut batch = Vec::new();

    // Example 1: circular fund routing A -> B -> C -> A
    batch.push(Transaction::new("TXN001", "ACC-A", "ACC-B", 5000.0, at(0)));
    batch.push(Transaction::new("TXN002", "ACC-B", "ACC-C", 4800.0, at(1)));
    batch.push(Transaction::new("TXN003", "ACC-C", "ACC-A", 4700.0, at(2)));

    // Example 2: smurfing, twelve senders funneling into one hub
    for i in 1..=12 {
        batch.push(Transaction::new(
            format!("TXN1{:02}", i),
            format!("SMURF-{:02}", i),
            "HUB",
            900.0,
            at(3 + i),
        ));
    }

    // Example 3: layering through shell accounts
    batch.push(Transaction::new("TXN201", "SRC", "SHELL-1", 10_000.0, at(20)));
    batch.push(Transaction::new("TXN202", "SHELL-1", "SHELL-2", 9_800.0, at(21)));
    batch.push(Transaction::new("TXN203", "SHELL-2", "SHELL-3", 9_600.0, at(22)));
    batch.push(Transaction::new("TXN204", "SHELL-3", "SINK", 9_400.0, at(23)));

    // Some unremarkable background traffic
    batch.push(Transaction::new("TXN301", "ACC-D", "ACC-E", 123.45, at(5)));
    batch.push(Transaction::new("TXN302", "ACC-E", "ACC-F", 67.89, at(6)));

    let mut engine = AnalysisEngine::new();
    engine.on_progress(|phase| {
        let label = match phase {
            AnalysisPhase::GraphBuilt => "graph built",
            AnalysisPhase::DetectorsFinished => "detectors finished",
            AnalysisPhase::RingsAssembled => "rings assembled",
            AnalysisPhase::Scored => "accounts scored",
        };
        println!("   [{}]", label);
    });

    println!("Analyzing {} transactions...", batch.len());
    let report = match engine.analyze(&batch) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("analysis failed: {e}");
            std::process::exit(1);
        }
    };

    println!("\nSummary");
    println!("   Accounts analyzed: {}", report.summary.total_accounts_analyzed);
    println!("   Fraud rings:       {}", report.summary.fraud_rings_detected);
    println!("   Suspicious:        {}", report.summary.suspicious_accounts_flagged);
    println!("   Elapsed:           {}s", report.summary.processing_time_seconds);

    println!("\nFraud rings");
    for ring in &report.fraud_rings {
        println!(
            "   {} [{}] risk {} -> {}",
            ring.ring_id,
            ring.pattern_type,
            ring.risk_score,
            ring.evidence
        );
    }

    println!("\nSuspicious accounts");
    for account in &report.suspicious_accounts {
        println!(
            "   {} score {} patterns {:?} ring {}",
            account.account_id,
            account.suspicion_score,
            account.detected_patterns,
            account.ring_id
        );
    }

    println!("\nFull report JSON:");
    println!("{}", report.to_json_pretty().unwrap());
}
