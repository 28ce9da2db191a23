//! Fraud ring assembly.
//!
//! Converts raw detector findings into ring records: overlapping findings
//! merge, each ring gets a stable identifier, a pattern type and a compact
//! evidence description.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scoring::finding_base_score;
use crate::EngineConfig;

/// Laundering topology labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Cycle,
    FanIn,
    FanOut,
    ShellChain,
}

impl PatternKind {
    /// Report label for this pattern.
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::Cycle => "cycle",
            PatternKind::FanIn => "fan_in",
            PatternKind::FanOut => "fan_out",
            PatternKind::ShellChain => "shell_chain",
        }
    }

    /// Ring id blocks are assigned in this order.
    fn block(&self) -> u8 {
        match self {
            PatternKind::Cycle => 0,
            PatternKind::ShellChain => 1,
            PatternKind::FanIn => 2,
            PatternKind::FanOut => 3,
        }
    }

    /// Tie-break priority when merged contributors have equal base scores.
    fn merge_priority(&self) -> u8 {
        match self {
            PatternKind::Cycle => 3,
            PatternKind::ShellChain => 2,
            PatternKind::FanIn => 1,
            PatternKind::FanOut => 0,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One raw detection event, prior to ring assembly.
#[derive(Debug, Clone)]
pub enum Finding {
    /// Simple directed cycle; `path` is the canonical rotation.
    Cycle {
        path: Vec<String>,
        edges: usize,
        total_amount: f64,
    },
    /// Many distinct senders into one hub within a window.
    FanIn {
        hub: String,
        spokes: Vec<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_amount: f64,
    },
    /// One hub paying many distinct receivers within a window.
    FanOut {
        hub: String,
        spokes: Vec<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_amount: f64,
    },
    /// Linear flow through low-activity intermediaries.
    ShellChain {
        path: Vec<String>,
        hops: usize,
        total_amount: f64,
        busiest_intermediate_tx: usize,
    },
}

impl Finding {
    pub fn kind(&self) -> PatternKind {
        match self {
            Finding::Cycle { .. } => PatternKind::Cycle,
            Finding::FanIn { .. } => PatternKind::FanIn,
            Finding::FanOut { .. } => PatternKind::FanOut,
            Finding::ShellChain { .. } => PatternKind::ShellChain,
        }
    }

    /// Accounts implicated by this finding.
    pub fn members(&self) -> Vec<&str> {
        match self {
            Finding::Cycle { path, .. } | Finding::ShellChain { path, .. } => {
                path.iter().map(String::as_str).collect()
            }
            Finding::FanIn { hub, spokes, .. } | Finding::FanOut { hub, spokes, .. } => {
                let mut members: Vec<&str> = Vec::with_capacity(spokes.len() + 1);
                members.push(hub.as_str());
                members.extend(spokes.iter().map(String::as_str));
                members
            }
        }
    }

    /// Compact human-readable evidence line.
    pub fn evidence(&self) -> String {
        match self {
            Finding::Cycle {
                path,
                edges,
                total_amount,
            } => format!(
                "circular flow {} ({} hops, {:.2} total)",
                path.join(" -> "),
                edges,
                total_amount
            ),
            Finding::FanIn {
                hub,
                spokes,
                window_start,
                window_end,
                total_amount,
            } => format!(
                "{} distinct senders into {} between {} and {} ({:.2} total)",
                spokes.len(),
                hub,
                window_start.format("%Y-%m-%d %H:%M:%S"),
                window_end.format("%Y-%m-%d %H:%M:%S"),
                total_amount
            ),
            Finding::FanOut {
                hub,
                spokes,
                window_start,
                window_end,
                total_amount,
            } => format!(
                "{} distinct recipients from {} between {} and {} ({:.2} total)",
                spokes.len(),
                hub,
                window_start.format("%Y-%m-%d %H:%M:%S"),
                window_end.format("%Y-%m-%d %H:%M:%S"),
                total_amount
            ),
            Finding::ShellChain {
                path,
                hops,
                total_amount,
                busiest_intermediate_tx,
            } => format!(
                "layered chain {} ({} hops, intermediaries with at most {} transactions, {:.2} total)",
                path.join(" -> "),
                hops,
                busiest_intermediate_tx,
                total_amount
            ),
        }
    }
}

/// A group of accounts jointly implicated by one or more findings.
#[derive(Debug, Clone)]
pub struct Ring {
    pub ring_id: String,
    pub pattern_type: PatternKind,
    /// Deduplicated members, sorted lexicographically.
    pub members: Vec<String>,
    pub risk_score: u8,
    pub evidence: String,
}

struct ProtoRing {
    members: BTreeSet<String>,
    contributors: Vec<Finding>,
}

/// Merges findings into rings and assigns stable identifiers.
pub struct RingAssembler<'c> {
    config: &'c EngineConfig,
}

impl<'c> RingAssembler<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Assemble rings from detector findings.
    ///
    /// Two groups merge when they share at least half the members of the
    /// smaller group (rounded up); merging repeats until no pair qualifies.
    /// Ids are assigned afterwards in block order (cycle, shell_chain,
    /// fan_in, fan_out), then by sorted member list.
    pub fn assemble(&self, findings: Vec<Finding>) -> Vec<Ring> {
        let mut protos: Vec<ProtoRing> = findings
            .into_iter()
            .map(|finding| ProtoRing {
                members: finding.members().iter().map(|id| id.to_string()).collect(),
                contributors: vec![finding],
            })
            .collect();
        // Merge order must not depend on detector emission order, or the
        // result would vary with the input permutation.
        protos.sort_by(|a, b| {
            (a.contributors[0].kind().block(), &a.members)
                .cmp(&(b.contributors[0].kind().block(), &b.members))
        });

        let mut index = 0;
        while index < protos.len() {
            let mut merged_any = false;
            let mut other = index + 1;
            while other < protos.len() {
                if should_merge(&protos[index], &protos[other]) {
                    let absorbed = protos.remove(other);
                    protos[index].members.extend(absorbed.members);
                    protos[index].contributors.extend(absorbed.contributors);
                    merged_any = true;
                    // Re-scan: the grown member set may now overlap groups
                    // that were previously disjoint.
                    other = index + 1;
                } else {
                    other += 1;
                }
            }
            if !merged_any {
                index += 1;
            } else {
                index = 0;
            }
        }

        let mut rings: Vec<Ring> = protos
            .into_iter()
            .map(|proto| self.seal(proto))
            .collect();
        rings.sort_by(|a, b| {
            (a.pattern_type.block(), &a.members).cmp(&(b.pattern_type.block(), &b.members))
        });
        for (position, ring) in rings.iter_mut().enumerate() {
            ring.ring_id = format!("RING_{:03}", position + 1);
        }

        debug!(rings = rings.len(), "ring assembly finished");
        rings
    }

    /// Elect the pattern type and risk score for a merged group.
    fn seal(&self, proto: ProtoRing) -> Ring {
        let winner = proto
            .contributors
            .iter()
            .max_by_key(|finding| {
                (
                    finding_base_score(finding, self.config),
                    finding.kind().merge_priority(),
                    // Full tie: settle on the smallest evidence line so the
                    // winner never depends on contributor order.
                    std::cmp::Reverse(finding.evidence()),
                )
            })
            .expect("ring has at least one contributing finding");

        let mut evidence = winner.evidence();
        if proto.contributors.len() > 1 {
            evidence.push_str(&format!(
                " (merged with {} overlapping findings)",
                proto.contributors.len() - 1
            ));
        }

        Ring {
            ring_id: String::new(),
            pattern_type: winner.kind(),
            members: proto.members.into_iter().collect(),
            risk_score: finding_base_score(winner, self.config).min(100) as u8,
            evidence,
        }
    }
}

fn should_merge(a: &ProtoRing, b: &ProtoRing) -> bool {
    let smaller = a.members.len().min(b.members.len());
    let shared = a.members.intersection(&b.members).count();
    shared >= smaller.div_ceil(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 2, 18, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap(),
        )
    }

    fn cycle(path: &[&str]) -> Finding {
        Finding::Cycle {
            path: path.iter().map(|id| id.to_string()).collect(),
            edges: path.len(),
            total_amount: 1000.0,
        }
    }

    fn fan_in(hub: &str, spokes: &[&str]) -> Finding {
        let (window_start, window_end) = window();
        Finding::FanIn {
            hub: hub.to_string(),
            spokes: spokes.iter().map(|id| id.to_string()).collect(),
            window_start,
            window_end,
            total_amount: 9000.0,
        }
    }

    fn chain(path: &[&str]) -> Finding {
        Finding::ShellChain {
            path: path.iter().map(|id| id.to_string()).collect(),
            hops: path.len() - 1,
            total_amount: 5000.0,
            busiest_intermediate_tx: 2,
        }
    }

    fn assemble(findings: Vec<Finding>) -> Vec<Ring> {
        let config = EngineConfig::default();
        RingAssembler::new(&config).assemble(findings)
    }

    #[test]
    fn test_disjoint_findings_become_separate_rings() {
        let rings = assemble(vec![
            cycle(&["A", "B", "C"]),
            chain(&["P", "Q", "R", "S", "T"]),
        ]);
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].pattern_type, PatternKind::Cycle);
        assert_eq!(rings[1].pattern_type, PatternKind::ShellChain);
    }

    #[test]
    fn test_ring_ids_follow_block_then_member_order() {
        let rings = assemble(vec![
            fan_in("X", &["S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S10"]),
            chain(&["P", "Q", "R", "S", "T"]),
            cycle(&["M", "N", "O"]),
            cycle(&["A", "B", "C"]),
        ]);
        let ids: Vec<(&str, PatternKind)> = rings
            .iter()
            .map(|ring| (ring.ring_id.as_str(), ring.pattern_type))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("RING_001", PatternKind::Cycle),      // A,B,C
                ("RING_002", PatternKind::Cycle),      // M,N,O
                ("RING_003", PatternKind::ShellChain), // P..T
                ("RING_004", PatternKind::FanIn),      // X + spokes
            ]
        );
    }

    #[test]
    fn test_members_are_deduplicated_and_sorted() {
        let rings = assemble(vec![cycle(&["C", "A", "B"])]);
        assert_eq!(rings[0].members, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_small_overlap_does_not_merge() {
        // One shared member out of three is below the half threshold.
        let rings = assemble(vec![cycle(&["A", "B", "C"]), cycle(&["A", "D", "E"])]);
        assert_eq!(rings.len(), 2);
    }

    #[test]
    fn test_half_of_smaller_group_merges() {
        // The cycle shares A and D with the fan: half of the 4-member cycle.
        let rings = assemble(vec![
            cycle(&["A", "B", "C", "D"]),
            fan_in(
                "A",
                &["D", "S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S10"],
            ),
        ]);
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        // Cycle base (30 + 5) beats fan base (25 + 5).
        assert_eq!(ring.pattern_type, PatternKind::Cycle);
        assert_eq!(ring.members.len(), 14);
        assert!(ring.evidence.contains("merged with 1 overlapping findings"));
    }

    #[test]
    fn test_merge_cascades_transitively() {
        // B,C,D bridges A,B,C and C,D,E into one ring.
        let rings = assemble(vec![
            cycle(&["A", "B", "C"]),
            cycle(&["C", "D", "E"]),
            cycle(&["B", "C", "D"]),
        ]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].members, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_equal_base_tie_prefers_cycle() {
        // A 3-edge cycle (base 30) against a 3-hop chain is not possible
        // (chains start at 4 hops), so pit a 4-edge cycle (35) against a
        // 4-hop chain (35): the cycle label wins the tie.
        let rings = assemble(vec![
            chain(&["A", "B", "C", "D", "E"]),
            cycle(&["A", "B", "C", "D"]),
        ]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].pattern_type, PatternKind::Cycle);
    }

    #[test]
    fn test_pattern_labels() {
        assert_eq!(PatternKind::Cycle.label(), "cycle");
        assert_eq!(PatternKind::FanIn.label(), "fan_in");
        assert_eq!(PatternKind::FanOut.label(), "fan_out");
        assert_eq!(PatternKind::ShellChain.label(), "shell_chain");
    }
}
