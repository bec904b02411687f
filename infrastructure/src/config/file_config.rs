//! Configuration file schema
//!
//! TOML sections mirroring the engine's configuration surface. Every
//! field has a serde default, so a partial file only overrides what it
//! names.
//!
//! Example configuration:
//!
//! ```toml
//! [engine]
//! max_workers = 8
//! retry_base_delay_ms = 250
//!
//! [consensus]
//! cluster_radius_m = 50000.0
//! unverified_discount = 0.5
//!
//! [gateway]
//! rate_per_sec = 5.0
//! breaker_threshold = 3
//!
//! [stages.validation]
//! quorum = "majority"
//! timeout_ms = 60000
//!
//! [roles.research]
//! timeout_ms = 45000
//! max_attempts = 2
//! reliability = 1.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::gateway::GatewayPolicy;
use terra_domain::{
    AgentRole, ConsensusTuning, EngineConfig, QuorumRule, RolePolicy, Stage, StagePolicy,
};

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineSection {
    pub max_workers: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for FileEngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_workers: defaults.max_workers,
            retry_base_delay_ms: defaults.retry_base_delay_ms,
            retry_max_delay_ms: defaults.retry_max_delay_ms,
        }
    }
}

/// `[stages.<name>]` section. The quorum rule is written as a string
/// ("majority", "all", "atleast:N", "N%").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStageSection {
    pub quorum: String,
    pub timeout_ms: u64,
}

impl Default for FileStageSection {
    fn default() -> Self {
        let defaults = StagePolicy::default();
        Self {
            quorum: defaults.quorum.to_string(),
            timeout_ms: defaults.timeout_ms,
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub engine: FileEngineSection,
    pub consensus: ConsensusTuning,
    pub gateway: GatewayPolicy,
    /// Keyed by stage name ("analysis", "validation", "research")
    pub stages: HashMap<String, FileStageSection>,
    /// Keyed by role name ("visual", "geographic", ...)
    pub roles: HashMap<String, RolePolicy>,
}

impl FileConfig {
    /// Convert into the domain [`EngineConfig`], rejecting unknown
    /// role/stage names, malformed quorum rules and out-of-range
    /// values.
    pub fn into_engine_config(self) -> Result<EngineConfig, String> {
        let mut config = EngineConfig {
            max_workers: self.engine.max_workers,
            retry_base_delay_ms: self.engine.retry_base_delay_ms,
            retry_max_delay_ms: self.engine.retry_max_delay_ms,
            consensus: self.consensus,
            ..EngineConfig::default()
        };

        for (name, policy) in self.roles {
            let role: AgentRole = name.parse()?;
            // File policies override the built-in reliability table
            config.roles.insert(role, policy);
        }

        for (name, section) in self.stages {
            let stage: Stage = name.parse()?;
            let quorum: QuorumRule = section.quorum.parse()?;
            config.stages.insert(
                stage,
                StagePolicy {
                    quorum,
                    timeout_ms: section.timeout_ms,
                },
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// The gateway policy carried alongside the engine configuration.
    pub fn gateway_policy(&self) -> GatewayPolicy {
        self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        let engine = config.into_engine_config().unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let toml_str = r#"
[engine]
max_workers = 2

[consensus]
unverified_discount = 0.25

[roles.research]
timeout_ms = 45000
max_attempts = 2
reliability = 1.1

[stages.validation]
quorum = "all"
timeout_ms = 60000
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let engine = config.into_engine_config().unwrap();

        assert_eq!(engine.max_workers, 2);
        assert_eq!(engine.consensus.unverified_discount, 0.25);
        // Untouched defaults survive
        assert_eq!(engine.consensus.max_alternatives, 5);
        assert_eq!(engine.role(AgentRole::Research).max_attempts, 2);
        assert_eq!(engine.reliability(AgentRole::Research), 1.1);
        // Roles not in the file keep the built-in table
        assert_eq!(engine.reliability(AgentRole::Validation), 1.2);
        assert_eq!(engine.stage(Stage::Validation).quorum, QuorumRule::All);
        assert_eq!(
            engine.stage(Stage::Analysis).quorum,
            QuorumRule::Majority
        );
    }

    #[test]
    fn test_quorum_string_forms() {
        let toml_str = r#"
[stages.analysis]
quorum = "75%"

[stages.research]
quorum = "atleast:1"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let engine = config.into_engine_config().unwrap();
        assert_eq!(
            engine.stage(Stage::Analysis).quorum,
            QuorumRule::Fraction(0.75)
        );
        assert_eq!(engine.stage(Stage::Research).quorum, QuorumRule::AtLeast(1));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let toml_str = r#"
[roles.astrologer]
reliability = 2.0
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.into_engine_config().is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let toml_str = r#"
[consensus]
unverified_discount = 3.0
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.into_engine_config().is_err());
    }

    #[test]
    fn test_gateway_section() {
        let toml_str = r#"
[gateway]
rate_per_sec = 2.0
breaker_threshold = 5
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let policy = config.gateway_policy();
        assert_eq!(policy.rate_per_sec, 2.0);
        assert_eq!(policy.breaker_threshold, 5);
        // Unnamed fields default
        assert_eq!(policy.burst, 10);
    }
}
