//! Consensus resolution
//!
//! Reconciles every finding from every stage into one calibrated
//! prediction with ranked alternatives. The computation is fully
//! deterministic for a fixed set of findings: clusters form in finding
//! order (stage order, then task order within a stage), and ties are
//! broken by formation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{ConsensusTuning, EngineConfig};
use crate::error::EngineError;
use crate::finding::Finding;
use crate::geo::{Coordinate, LocationHypothesis, Region};
use crate::role::AgentRole;
use crate::stage::StageSummary;

/// One ranked location prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Representative location: weighted centroid for point clusters,
    /// most specific common region for area clusters
    pub hypothesis: LocationHypothesis,
    /// Calibrated confidence in [0, 1]
    pub confidence: f64,
    /// Number of findings supporting this prediction
    pub supporting: usize,
}

/// Final output of a completed request. Created exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// The highest-weight prediction
    pub primary: Prediction,
    /// Remaining clusters, ranked by weight, truncated to the configured
    /// maximum
    pub alternatives: Vec<Prediction>,
    /// Every finding that contributed
    pub findings: Vec<Finding>,
    /// Ordered human-readable stage narratives
    pub reasoning: Vec<String>,
    /// How many stages ran in degraded mode
    pub degraded_stages: usize,
    /// When consensus was computed
    pub completed_at: DateTime<Utc>,
}

/// A group of findings whose hypotheses agree within tolerance.
#[derive(Debug, Clone)]
struct Cluster {
    members: Vec<usize>,
    roles: Vec<AgentRole>,
    weight: f64,
    /// Weight the cluster would carry had all evidence been verified
    full_weight: f64,
    shape: ClusterShape,
}

#[derive(Debug, Clone)]
enum ClusterShape {
    /// Weighted running centroid of the member points
    Point {
        lat_sum: f64,
        lon_sum: f64,
        weight_sum: f64,
    },
    /// Most specific region common to all members
    Area(Region),
}

impl Cluster {
    fn centroid(&self) -> Option<Coordinate> {
        match &self.shape {
            ClusterShape::Point {
                lat_sum,
                lon_sum,
                weight_sum,
            } => Coordinate::new(lat_sum / weight_sum, lon_sum / weight_sum).ok(),
            ClusterShape::Area(_) => None,
        }
    }

    fn representative(&self) -> Option<LocationHypothesis> {
        match &self.shape {
            ClusterShape::Point { .. } => self.centroid().map(LocationHypothesis::Point),
            ClusterShape::Area(region) => Some(LocationHypothesis::Area(region.clone())),
        }
    }
}

/// Computes the final [`ConsensusResult`] from closed stage summaries.
pub struct ConsensusEngine {
    tuning: ConsensusTuning,
    reliability: HashMap<AgentRole, f64>,
}

impl ConsensusEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let reliability = AgentRole::all()
            .into_iter()
            .map(|role| (role, config.reliability(role)))
            .collect();
        Self {
            tuning: config.consensus,
            reliability,
        }
    }

    /// Build the engine from raw parts (used by tests and diagnostics).
    pub fn with_parts(tuning: ConsensusTuning, reliability: HashMap<AgentRole, f64>) -> Self {
        Self { tuning, reliability }
    }

    /// Resolve every finding from the given summaries into a consensus.
    ///
    /// Fails with [`EngineError::AggregationConflict`] when no cluster
    /// reaches the minimum viable weight, i.e. the findings contradict
    /// each other with no usable majority.
    pub fn resolve(&self, summaries: &[StageSummary]) -> Result<ConsensusResult, EngineError> {
        let findings: Vec<Finding> = summaries
            .iter()
            .flat_map(|s| s.findings.iter().cloned())
            .collect();

        if findings.is_empty() {
            return Err(EngineError::AggregationConflict(
                "no findings to aggregate".to_string(),
            ));
        }

        let clusters = self.cluster(&findings);
        let total_weight: f64 = clusters.iter().map(|c| c.weight).sum();

        // Heaviest cluster wins; ties keep the earliest-formed cluster.
        let primary_index = clusters
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.weight
                    .partial_cmp(&b.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // On equal weight, prefer the earlier cluster
                    .then(ib.cmp(ia))
            })
            .map(|(i, _)| i)
            .ok_or_else(|| EngineError::AggregationConflict("no clusters formed".to_string()))?;

        let primary = &clusters[primary_index];
        if primary.weight < self.tuning.min_cluster_weight || total_weight <= 0.0 {
            return Err(EngineError::AggregationConflict(format!(
                "strongest cluster weight {:.3} below viable minimum {:.3}",
                primary.weight, self.tuning.min_cluster_weight
            )));
        }

        let degraded_stages = summaries.iter().filter(|s| s.degraded).count();
        let confidence = self.calibrate(primary, total_weight, summaries, degraded_stages);

        let primary_prediction = Prediction {
            hypothesis: primary.representative().ok_or_else(|| {
                EngineError::AggregationConflict("primary cluster has no representative".into())
            })?,
            confidence,
            supporting: primary.members.len(),
        };

        // Remaining clusters become ranked alternatives. A stable sort
        // keeps formation order between equal weights.
        let mut rest: Vec<&Cluster> = clusters
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_index)
            .map(|(_, c)| c)
            .collect();
        rest.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let alternatives: Vec<Prediction> = rest
            .into_iter()
            .filter_map(|c| {
                c.representative().map(|hypothesis| Prediction {
                    hypothesis,
                    confidence: (confidence * c.weight / primary.weight).clamp(0.0, 1.0),
                    supporting: c.members.len(),
                })
            })
            .take(self.tuning.max_alternatives)
            .collect();

        let mut reasoning: Vec<String> = summaries.iter().map(|s| s.narrative()).collect();
        reasoning.push(format!(
            "consensus: {} cluster(s) from {} finding(s); primary {} supported by {} with weight {:.3} of {:.3}",
            clusters.len(),
            findings.len(),
            primary_prediction.hypothesis,
            primary_prediction.supporting,
            primary.weight,
            total_weight,
        ));

        Ok(ConsensusResult {
            primary: primary_prediction,
            alternatives,
            findings,
            reasoning,
            degraded_stages,
            completed_at: Utc::now(),
        })
    }

    /// Fixed-radius agglomerative merge in finding order.
    fn cluster(&self, findings: &[Finding]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();

        for (index, finding) in findings.iter().enumerate() {
            let (weight, full_weight) = self.finding_weight(finding);

            let joined = clusters.iter_mut().find(|cluster| {
                match (&cluster.shape, &finding.hypothesis) {
                    (ClusterShape::Point { .. }, LocationHypothesis::Point(point)) => cluster
                        .centroid()
                        .is_some_and(|c| c.distance_meters(point) <= self.tuning.cluster_radius_m),
                    (ClusterShape::Area(region), LocationHypothesis::Area(area)) => {
                        region.overlaps(area)
                    }
                    _ => false,
                }
            });

            match joined {
                Some(cluster) => {
                    cluster.members.push(index);
                    cluster.roles.push(finding.role);
                    cluster.weight += weight;
                    cluster.full_weight += full_weight;
                    match (&mut cluster.shape, &finding.hypothesis) {
                        (
                            ClusterShape::Point {
                                lat_sum,
                                lon_sum,
                                weight_sum,
                            },
                            LocationHypothesis::Point(point),
                        ) => {
                            *lat_sum += point.latitude * weight;
                            *lon_sum += point.longitude * weight;
                            *weight_sum += weight;
                        }
                        (ClusterShape::Area(region), LocationHypothesis::Area(area)) => {
                            // Narrow the representative to the most
                            // specific region common to all members.
                            if let Some(common) = region.common_prefix(area) {
                                *region = common;
                            }
                        }
                        _ => {}
                    }
                }
                None => {
                    let shape = match &finding.hypothesis {
                        LocationHypothesis::Point(point) => ClusterShape::Point {
                            lat_sum: point.latitude * weight,
                            lon_sum: point.longitude * weight,
                            weight_sum: weight,
                        },
                        LocationHypothesis::Area(region) => ClusterShape::Area(region.clone()),
                    };
                    clusters.push(Cluster {
                        members: vec![index],
                        roles: vec![finding.role],
                        weight,
                        full_weight,
                        shape,
                    });
                }
            }
        }

        clusters
    }

    /// Weight one finding contributes to its cluster, paired with the
    /// weight it would have carried with fully verified evidence.
    fn finding_weight(&self, finding: &Finding) -> (f64, f64) {
        let reliability = self
            .reliability
            .get(&finding.role)
            .copied()
            .unwrap_or(1.0);
        let full = reliability * finding.confidence;
        if finding.has_unverified_evidence() {
            (full * self.tuning.unverified_discount, full)
        } else {
            (full, full)
        }
    }

    /// Blend the primary cluster's weight share with the fraction of
    /// stages free of contradictions involving its members, scale by
    /// how much of the cluster's evidence held up verified, then apply
    /// the degraded-stage penalty. Monotonic in every input.
    fn calibrate(
        &self,
        primary: &Cluster,
        total_weight: f64,
        summaries: &[StageSummary],
        degraded_stages: usize,
    ) -> f64 {
        let weight_share = primary.weight / total_weight;

        let clean_stages = summaries
            .iter()
            .filter(|s| !primary.roles.iter().any(|role| s.contradicts(*role)))
            .count();
        let clean_fraction = if summaries.is_empty() {
            0.0
        } else {
            clean_stages as f64 / summaries.len() as f64
        };

        // 1.0 when every supporting finding was verified; shrinks with
        // each discounted one.
        let verified_quality = if primary.full_weight > 0.0 {
            primary.weight / primary.full_weight
        } else {
            0.0
        };

        let raw = (0.75 * weight_share + 0.25 * clean_fraction) * verified_quality
            - self.tuning.degraded_penalty * degraded_stages as f64;
        raw.clamp(0.0, 1.0)
    }
}
