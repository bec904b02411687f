//! Engine configuration value objects
//!
//! Every tunable the engine consumes is supplied from outside (see the
//! infrastructure config loader); nothing here is read from the
//! environment directly. The defaults are deliberate choices, documented
//! in DESIGN.md, not inherited constants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::role::AgentRole;
use crate::stage::{QuorumRule, Stage};

/// Per-role execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePolicy {
    /// Hard per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum attempts before the task stays FAILED
    pub max_attempts: u32,
    /// Static reliability coefficient applied to this role's findings
    pub reliability: f64,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            reliability: 1.0,
        }
    }
}

impl RolePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-stage advancement policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePolicy {
    /// Quorum rule deciding whether execution proceeds
    pub quorum: QuorumRule,
    /// Stage deadline in milliseconds; unfinished tasks fail when it fires
    pub timeout_ms: u64,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            quorum: QuorumRule::Majority,
            timeout_ms: 120_000,
        }
    }
}

impl StagePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Tuning knobs for the consensus computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusTuning {
    /// Point hypotheses within this distance of a cluster centroid join it
    pub cluster_radius_m: f64,
    /// Pairwise divergence beyond this records a contradiction
    pub divergence_threshold_m: f64,
    /// Weight multiplier for findings carrying unverified evidence
    pub unverified_discount: f64,
    /// Confidence penalty per stage that ran degraded
    pub degraded_penalty: f64,
    /// Clusters below this weight cannot become the primary prediction
    pub min_cluster_weight: f64,
    /// Ranked alternatives are truncated to this many entries
    pub max_alternatives: usize,
}

impl Default for ConsensusTuning {
    fn default() -> Self {
        Self {
            cluster_radius_m: 50_000.0,
            divergence_threshold_m: 500_000.0,
            unverified_discount: 0.5,
            degraded_penalty: 0.1,
            min_cluster_weight: 0.1,
            max_alternatives: 5,
        }
    }
}

/// Complete engine configuration.
///
/// # Example
///
/// ```
/// use terra_domain::config::EngineConfig;
/// use terra_domain::role::AgentRole;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.role(AgentRole::Visual).max_attempts, 3);
/// assert!(config.role(AgentRole::Validation).reliability > 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global cap on concurrently in-flight specialist calls
    pub max_workers: usize,
    /// Base delay for task retry backoff (doubled per attempt)
    pub retry_base_delay_ms: u64,
    /// Backoff cap
    pub retry_max_delay_ms: u64,
    /// Per-role policies; roles not listed use [`RolePolicy::default`]
    pub roles: HashMap<AgentRole, RolePolicy>,
    /// Per-stage policies; stages not listed use [`StagePolicy::default`]
    pub stages: HashMap<Stage, StagePolicy>,
    /// Consensus tuning
    pub consensus: ConsensusTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Validation synthesizes and is trusted most; environmental cues
        // are the coarsest signal.
        let roles = [
            (AgentRole::Visual, 0.9),
            (AgentRole::Geographic, 1.0),
            (AgentRole::Environmental, 0.8),
            (AgentRole::Cultural, 0.85),
            (AgentRole::Validation, 1.2),
            (AgentRole::Research, 1.0),
        ]
        .into_iter()
        .map(|(role, reliability)| {
            (
                role,
                RolePolicy {
                    reliability,
                    ..RolePolicy::default()
                },
            )
        })
        .collect();

        Self {
            max_workers: 8,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 5_000,
            roles,
            stages: HashMap::new(),
            consensus: ConsensusTuning::default(),
        }
    }
}

impl EngineConfig {
    /// Policy for a role, falling back to the default policy.
    pub fn role(&self, role: AgentRole) -> RolePolicy {
        self.roles.get(&role).copied().unwrap_or_default()
    }

    /// Policy for a stage, falling back to the default policy.
    pub fn stage(&self, stage: Stage) -> StagePolicy {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Reliability coefficient for a role.
    pub fn reliability(&self, role: AgentRole) -> f64 {
        self.role(role).reliability
    }

    /// Retry delay before the given attempt number (1-based), with
    /// exponential growth capped at the configured maximum.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.retry_base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        for (role, policy) in &self.roles {
            if policy.max_attempts == 0 {
                return Err(format!("role {}: max_attempts must be at least 1", role));
            }
            if policy.reliability <= 0.0 {
                return Err(format!("role {}: reliability must be positive", role));
            }
        }
        let tuning = &self.consensus;
        for (name, value) in [
            ("unverified_discount", tuning.unverified_discount),
            ("degraded_penalty", tuning.degraded_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("consensus.{} must be in [0, 1]", name));
            }
        }
        if tuning.cluster_radius_m <= 0.0 {
            return Err("consensus.cluster_radius_m must be positive".to_string());
        }
        Ok(())
    }
}
