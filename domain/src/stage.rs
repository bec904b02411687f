//! Execution stages and their summaries
//!
//! A request runs through a fixed three-stage DAG: a parallel analysis
//! pass, a validation pass over its output, then external research.
//! Each stage closes into an immutable [`StageSummary`] that later
//! stages and the consensus step consume.

use serde::{Deserialize, Serialize};

use crate::finding::Finding;
use crate::role::AgentRole;

/// The fixed stages of the execution DAG, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Stage 1: independent specialists analyze the descriptors in parallel
    Analysis,
    /// Stage 2: validation cross-references the stage-1 findings
    Validation,
    /// Stage 3: research verifies features against external sources
    Research,
}

impl Stage {
    /// All stages in execution order.
    pub fn all() -> [Stage; 3] {
        [Stage::Analysis, Stage::Validation, Stage::Research]
    }

    /// 1-based stage number.
    pub fn number(&self) -> u8 {
        match self {
            Stage::Analysis => 1,
            Stage::Validation => 2,
            Stage::Research => 3,
        }
    }

    /// Roles whose tasks run in this stage.
    pub fn roles(&self) -> Vec<AgentRole> {
        AgentRole::all()
            .into_iter()
            .filter(|r| r.stage() == *self)
            .collect()
    }

    /// The following stage, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Analysis => Some(Stage::Validation),
            Stage::Validation => Some(Stage::Research),
            Stage::Research => None,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Validation => "validation",
            Stage::Research => "research",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(Stage::Analysis),
            "validation" => Ok(Stage::Validation),
            "research" => Ok(Stage::Research),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Minimum fraction of a stage's tasks that must finish DONE for
/// execution to proceed.
///
/// # Example
///
/// ```
/// use terra_domain::stage::QuorumRule;
///
/// let rule = QuorumRule::Majority;
/// assert!(rule.is_satisfied(3, 4));
/// assert!(!rule.is_satisfied(2, 4));
///
/// let strict = QuorumRule::All;
/// assert!(!strict.is_satisfied(3, 4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuorumRule {
    /// More than half of the stage's tasks must succeed
    #[default]
    Majority,
    /// Every task must succeed
    All,
    /// At least n tasks must succeed
    AtLeast(usize),
    /// At least this fraction (0.0 to 1.0) must succeed
    Fraction(f64),
}

impl QuorumRule {
    /// Check whether `done` successes out of `total` tasks meet quorum.
    pub fn is_satisfied(&self, done: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        match self {
            QuorumRule::Majority => done > total / 2,
            QuorumRule::All => done == total,
            QuorumRule::AtLeast(n) => done >= *n,
            QuorumRule::Fraction(f) => {
                let required = (total as f64 * f).ceil() as usize;
                done >= required.max(1)
            }
        }
    }

    /// Minimum DONE count needed for this rule given a stage size.
    pub fn min_done_needed(&self, total: usize) -> usize {
        match self {
            QuorumRule::Majority => total / 2 + 1,
            QuorumRule::All => total,
            QuorumRule::AtLeast(n) => *n,
            QuorumRule::Fraction(f) => ((total as f64 * f).ceil() as usize).max(1),
        }
    }
}

impl std::fmt::Display for QuorumRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumRule::Majority => write!(f, "majority"),
            QuorumRule::All => write!(f, "all"),
            QuorumRule::AtLeast(n) => write!(f, "at least {}", n),
            QuorumRule::Fraction(p) => write!(f, "{:.0}%", p * 100.0),
        }
    }
}

impl std::str::FromStr for QuorumRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "majority" => Ok(QuorumRule::Majority),
            "all" => Ok(QuorumRule::All),
            s if s.starts_with("atleast:") || s.starts_with("at_least:") => {
                let n: usize = s
                    .split(':')
                    .nth(1)
                    .ok_or("missing count after atleast:")?
                    .parse()
                    .map_err(|_| "invalid count for atleast")?;
                Ok(QuorumRule::AtLeast(n))
            }
            s if s.ends_with('%') => {
                let p: f64 = s
                    .trim_end_matches('%')
                    .parse()
                    .map_err(|_| "invalid percentage")?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(format!("percentage out of range: {}", p));
                }
                Ok(QuorumRule::Fraction(p / 100.0))
            }
            _ => Err(format!(
                "unknown quorum rule: {}. Valid: majority, all, atleast:N, N%",
                s
            )),
        }
    }
}

/// A pair of findings whose hypotheses diverge beyond the configured
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Role of the first finding
    pub first: AgentRole,
    /// Role of the second finding
    pub second: AgentRole,
    /// Measured divergence in meters; `None` for disjoint named regions
    pub divergence_m: Option<f64>,
}

impl Contradiction {
    /// Whether a given role is one of the contradicting pair.
    pub fn involves(&self, role: AgentRole) -> bool {
        self.first == role || self.second == role
    }
}

/// Immutable aggregate of one closed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Which stage this summarizes
    pub stage: Stage,
    /// Findings from tasks that finished DONE
    pub findings: Vec<Finding>,
    /// Diverging pairs detected among the findings
    pub contradictions: Vec<Contradiction>,
    /// Whether enough tasks succeeded to proceed
    pub quorum_met: bool,
    /// Quorum met, but with task failures: evidence is reduced
    pub degraded: bool,
    /// Tasks that finished DONE
    pub done: usize,
    /// Tasks that exhausted retries or timed out
    pub failed: usize,
    /// Tasks never started because the stage closed first
    pub skipped: usize,
}

impl StageSummary {
    /// Total tasks the stage was created with.
    pub fn total_tasks(&self) -> usize {
        self.done + self.failed + self.skipped
    }

    /// Whether any recorded contradiction involves the given role.
    pub fn contradicts(&self, role: AgentRole) -> bool {
        self.contradictions.iter().any(|c| c.involves(role))
    }

    /// One-line narrative for the reasoning chain.
    pub fn narrative(&self) -> String {
        let mut line = format!(
            "stage {} ({}): {}/{} succeeded",
            self.stage.number(),
            self.stage,
            self.done,
            self.total_tasks(),
        );
        if !self.contradictions.is_empty() {
            line.push_str(&format!(", {} contradiction(s)", self.contradictions.len()));
        }
        if self.degraded {
            line.push_str(", degraded");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_roles() {
        assert_eq!(Stage::Analysis.number(), 1);
        assert_eq!(Stage::Analysis.next(), Some(Stage::Validation));
        assert_eq!(Stage::Research.next(), None);
        assert_eq!(Stage::Analysis.roles().len(), 4);
        assert_eq!(Stage::Validation.roles(), vec![AgentRole::Validation]);
        assert_eq!(Stage::Research.roles(), vec![AgentRole::Research]);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("analysis".parse::<Stage>().unwrap(), Stage::Analysis);
        assert_eq!("Research".parse::<Stage>().unwrap(), Stage::Research);
        assert!("synthesis".parse::<Stage>().is_err());
    }

    #[test]
    fn test_majority_rule() {
        let rule = QuorumRule::Majority;
        assert!(rule.is_satisfied(3, 4));
        assert!(!rule.is_satisfied(2, 4));
        assert!(rule.is_satisfied(1, 1));
        assert!(!rule.is_satisfied(0, 0));
    }

    #[test]
    fn test_fraction_rule() {
        let rule = QuorumRule::Fraction(0.75);
        // 4 total: need ceil(3.0) = 3
        assert!(rule.is_satisfied(3, 4));
        assert!(!rule.is_satisfied(2, 4));
        // A tiny fraction still needs at least one success
        assert!(!QuorumRule::Fraction(0.01).is_satisfied(0, 4));
    }

    #[test]
    fn test_min_done_needed() {
        assert_eq!(QuorumRule::Majority.min_done_needed(4), 3);
        assert_eq!(QuorumRule::All.min_done_needed(3), 3);
        assert_eq!(QuorumRule::AtLeast(2).min_done_needed(5), 2);
        assert_eq!(QuorumRule::Fraction(0.5).min_done_needed(3), 2);
    }

    #[test]
    fn test_rule_parse() {
        assert_eq!("majority".parse::<QuorumRule>().unwrap(), QuorumRule::Majority);
        assert_eq!("all".parse::<QuorumRule>().unwrap(), QuorumRule::All);
        assert_eq!(
            "atleast:2".parse::<QuorumRule>().unwrap(),
            QuorumRule::AtLeast(2)
        );
        assert_eq!(
            "75%".parse::<QuorumRule>().unwrap(),
            QuorumRule::Fraction(0.75)
        );
        assert!("most".parse::<QuorumRule>().is_err());
        assert!("140%".parse::<QuorumRule>().is_err());
    }

    #[test]
    fn test_contradiction_involves() {
        let c = Contradiction {
            first: AgentRole::Visual,
            second: AgentRole::Cultural,
            divergence_m: Some(800_000.0),
        };
        assert!(c.involves(AgentRole::Visual));
        assert!(c.involves(AgentRole::Cultural));
        assert!(!c.involves(AgentRole::Research));
    }

    #[test]
    fn test_summary_narrative() {
        let summary = StageSummary {
            stage: Stage::Analysis,
            findings: vec![],
            contradictions: vec![Contradiction {
                first: AgentRole::Visual,
                second: AgentRole::Geographic,
                divergence_m: None,
            }],
            quorum_met: true,
            degraded: true,
            done: 3,
            failed: 1,
            skipped: 0,
        };
        let line = summary.narrative();
        assert!(line.contains("3/4"));
        assert!(line.contains("1 contradiction"));
        assert!(line.contains("degraded"));
    }
}
