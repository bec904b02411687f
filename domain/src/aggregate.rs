//! Stage aggregation
//!
//! Turns a closed stage's tasks into a [`StageSummary`]: collects the
//! findings, measures every pair for contradictions and computes the
//! quorum flag from completion counts alone. Contradictions inform the
//! consensus step; they never fail a stage by themselves.

use crate::config::ConsensusTuning;
use crate::stage::{Contradiction, QuorumRule, Stage, StageSummary};
use crate::task::{AgentTask, TaskState};

/// Aggregates completed stages. Pure; owns no state beyond its tuning.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    tuning: ConsensusTuning,
}

impl ResultAggregator {
    pub fn new(tuning: ConsensusTuning) -> Self {
        Self { tuning }
    }

    /// Summarize a stage whose tasks have all reached a terminal state.
    ///
    /// Tasks still PENDING or RUNNING (a stage closed by timeout hands
    /// those in as FAILED/SKIPPED already) are counted as failed rather
    /// than silently dropped.
    pub fn summarize(&self, stage: Stage, tasks: &[AgentTask], quorum: QuorumRule) -> StageSummary {
        let mut done = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut findings = Vec::new();

        for task in tasks {
            match task.state {
                TaskState::Done => {
                    done += 1;
                    if let Some(finding) = &task.output {
                        findings.push(finding.clone());
                    }
                }
                TaskState::Skipped => skipped += 1,
                TaskState::Failed | TaskState::Pending | TaskState::Running => failed += 1,
            }
        }

        let mut contradictions = Vec::new();
        for (i, a) in findings.iter().enumerate() {
            for b in findings.iter().skip(i + 1) {
                let divergence = a.hypothesis.divergence_meters(&b.hypothesis);
                if divergence.exceeds(self.tuning.divergence_threshold_m) {
                    contradictions.push(Contradiction {
                        first: a.role,
                        second: b.role,
                        divergence_m: divergence.meters(),
                    });
                }
            }
        }

        let quorum_met = quorum.is_satisfied(done, tasks.len());

        StageSummary {
            stage,
            findings,
            contradictions,
            quorum_met,
            degraded: quorum_met && (failed + skipped) > 0,
            done,
            failed,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Finding;
    use crate::geo::{Coordinate, LocationHypothesis};
    use crate::request::{DescriptorSet, RequestId};
    use crate::role::AgentRole;
    use crate::task::TaskInput;
    use std::collections::HashMap;

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(ConsensusTuning::default())
    }

    fn done_task(role: AgentRole, lat: f64, lon: f64, confidence: f64) -> AgentTask {
        let mut task = AgentTask::new(
            RequestId::new("req-1"),
            role,
            TaskInput::new(DescriptorSet::new("img"), HashMap::new()),
        );
        task.start_attempt().unwrap();
        task.complete(Finding::new(
            role,
            LocationHypothesis::Point(Coordinate::new(lat, lon).unwrap()),
            confidence,
            "test",
        ))
        .unwrap();
        task
    }

    fn failed_task(role: AgentRole) -> AgentTask {
        let mut task = AgentTask::new(
            RequestId::new("req-1"),
            role,
            TaskInput::new(DescriptorSet::new("img"), HashMap::new()),
        );
        task.start_attempt().unwrap();
        task.fail().unwrap();
        task
    }

    #[test]
    fn test_all_done_meets_quorum_not_degraded() {
        let tasks = vec![
            done_task(AgentRole::Visual, 48.85, 2.35, 0.8),
            done_task(AgentRole::Geographic, 48.86, 2.34, 0.7),
        ];
        let summary = aggregator().summarize(Stage::Analysis, &tasks, QuorumRule::Majority);

        assert!(summary.quorum_met);
        assert!(!summary.degraded);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.findings.len(), 2);
        assert!(summary.contradictions.is_empty());
    }

    #[test]
    fn test_partial_success_is_degraded() {
        let tasks = vec![
            done_task(AgentRole::Visual, 48.85, 2.35, 0.8),
            done_task(AgentRole::Geographic, 48.86, 2.34, 0.7),
            failed_task(AgentRole::Cultural),
        ];
        let summary = aggregator().summarize(Stage::Analysis, &tasks, QuorumRule::Majority);

        assert!(summary.quorum_met);
        assert!(summary.degraded);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_quorum_not_met() {
        let tasks = vec![
            done_task(AgentRole::Visual, 48.85, 2.35, 0.8),
            failed_task(AgentRole::Geographic),
            failed_task(AgentRole::Cultural),
        ];
        let summary = aggregator().summarize(Stage::Analysis, &tasks, QuorumRule::Majority);

        assert!(!summary.quorum_met);
        assert!(!summary.degraded);
    }

    #[test]
    fn test_distant_pair_recorded_as_contradiction() {
        // Paris vs Tokyo, far beyond the 500 km default threshold
        let tasks = vec![
            done_task(AgentRole::Visual, 48.85, 2.35, 0.8),
            done_task(AgentRole::Cultural, 35.68, 139.69, 0.9),
        ];
        let summary = aggregator().summarize(Stage::Analysis, &tasks, QuorumRule::Majority);

        assert_eq!(summary.contradictions.len(), 1);
        let c = &summary.contradictions[0];
        assert!(c.involves(AgentRole::Visual));
        assert!(c.involves(AgentRole::Cultural));
        assert!(c.divergence_m.unwrap() > 5_000_000.0);
        // Contradictions alone never fail the stage
        assert!(summary.quorum_met);
    }

    #[test]
    fn test_contradictions_are_pairwise() {
        // Three mutually distant findings: three pairs
        let tasks = vec![
            done_task(AgentRole::Visual, 48.85, 2.35, 0.8),
            done_task(AgentRole::Cultural, 35.68, 139.69, 0.9),
            done_task(AgentRole::Geographic, -33.87, 151.21, 0.7),
        ];
        let summary = aggregator().summarize(Stage::Analysis, &tasks, QuorumRule::Majority);
        assert_eq!(summary.contradictions.len(), 3);
    }

    #[test]
    fn test_empty_stage_never_meets_quorum() {
        let summary = aggregator().summarize(Stage::Validation, &[], QuorumRule::Majority);
        assert!(!summary.quorum_met);
        assert_eq!(summary.total_tasks(), 0);
    }
}
