//! Findings and their supporting evidence
//!
//! A finding is one specialist's answer for one request: a location
//! hypothesis with a confidence, free-text reasoning and the evidence it
//! rests on. Findings are immutable once recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::LocationHypothesis;
use crate::role::AgentRole;

/// One piece of supporting evidence attached to a finding.
///
/// Evidence fetched through a degraded external gateway is recorded as
/// unverified and contributes less cluster weight during consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// What was observed or looked up
    pub description: String,
    /// Where it came from (descriptor field, external source name, ...)
    pub source: String,
    /// Whether the source call completed normally
    pub verified: bool,
}

impl Evidence {
    /// Evidence from a successfully completed lookup or observation.
    pub fn verified(description: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source: source.into(),
            verified: true,
        }
    }

    /// Evidence recorded while the backing source was unavailable.
    pub fn unverified(description: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source: source.into(),
            verified: false,
        }
    }
}

/// One specialist's location hypothesis for a request.
///
/// # Example
///
/// ```
/// use terra_domain::finding::{Evidence, Finding};
/// use terra_domain::geo::{Coordinate, LocationHypothesis};
/// use terra_domain::role::AgentRole;
///
/// let finding = Finding::new(
///     AgentRole::Geographic,
///     LocationHypothesis::Point(Coordinate::new(48.8566, 2.3522).unwrap()),
///     0.8,
///     "Haussmann facades and zinc roofs",
/// )
/// .with_evidence(Evidence::verified("zinc roofline", "descriptor"));
///
/// assert_eq!(finding.confidence, 0.8);
/// assert!(!finding.has_unverified_evidence());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Role that produced this finding
    pub role: AgentRole,
    /// The predicted location
    pub hypothesis: LocationHypothesis,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Free-text reasoning behind the hypothesis
    pub reasoning: String,
    /// Supporting evidence references
    pub evidence: Vec<Evidence>,
    /// Human-readable place name, when the specialist named one
    pub place_name: Option<String>,
    /// Country, when named
    pub country: Option<String>,
    /// When the finding was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Finding {
    /// Record a new finding. Confidence is clamped to [0, 1].
    pub fn new(
        role: AgentRole,
        hypothesis: LocationHypothesis,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            role,
            hypothesis,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            evidence: Vec::new(),
            place_name: None,
            country: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach one piece of evidence.
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    /// Attach a human-readable place name.
    pub fn with_place_name(mut self, place: impl Into<String>) -> Self {
        self.place_name = Some(place.into());
        self
    }

    /// Attach a country name.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// True when any attached evidence could not be verified.
    pub fn has_unverified_evidence(&self) -> bool {
        self.evidence.iter().any(|e| !e.verified)
    }

    /// Short one-line description for stage narratives.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} (confidence {:.2})",
            self.role, self.hypothesis, self.confidence
        )
    }
}
