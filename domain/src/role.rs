//! Specialist agent roles
//!
//! The engine drives a fixed set of specialists. Each role is an opaque
//! analysis capability supplied by the embedding application; the role
//! only determines which stage the task runs in and which reliability
//! coefficient its findings carry.

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// The fixed set of specialist roles.
///
/// # Example
///
/// ```
/// use terra_domain::role::AgentRole;
/// use terra_domain::stage::Stage;
///
/// assert_eq!(AgentRole::Visual.stage(), Stage::Analysis);
/// assert_eq!(AgentRole::Research.stage(), Stage::Research);
/// assert_eq!("cultural".parse::<AgentRole>().unwrap(), AgentRole::Cultural);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Architecture, infrastructure, vehicles and other man-made markers
    Visual,
    /// Terrain, landmarks, sun position and topography
    Geographic,
    /// Vegetation, climate and seasonal indicators
    Environmental,
    /// Signage language, customs and regional traditions
    Cultural,
    /// Cross-references first-pass findings and scores agreement
    Validation,
    /// Verifies features against external knowledge sources
    Research,
}

impl AgentRole {
    /// All roles, in stage order.
    pub fn all() -> [AgentRole; 6] {
        [
            AgentRole::Visual,
            AgentRole::Geographic,
            AgentRole::Environmental,
            AgentRole::Cultural,
            AgentRole::Validation,
            AgentRole::Research,
        ]
    }

    /// The stage this role's task runs in.
    pub fn stage(&self) -> Stage {
        match self {
            AgentRole::Visual
            | AgentRole::Geographic
            | AgentRole::Environmental
            | AgentRole::Cultural => Stage::Analysis,
            AgentRole::Validation => Stage::Validation,
            AgentRole::Research => Stage::Research,
        }
    }

    /// Stable lowercase name, used in task ids and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Visual => "visual",
            AgentRole::Geographic => "geographic",
            AgentRole::Environmental => "environmental",
            AgentRole::Cultural => "cultural",
            AgentRole::Validation => "validation",
            AgentRole::Research => "research",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visual" => Ok(AgentRole::Visual),
            "geographic" => Ok(AgentRole::Geographic),
            "environmental" => Ok(AgentRole::Environmental),
            "cultural" => Ok(AgentRole::Cultural),
            "validation" => Ok(AgentRole::Validation),
            "research" => Ok(AgentRole::Research),
            other => Err(format!("unknown agent role: {}", other)),
        }
    }
}
