//! Fundamental closed enums shared by every subsystem.
//!
//! All "type" fields are closed unions fixed at compile time so that gating
//! code can match exhaustively.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A string did not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// One of the six NIST SP 800-61 aligned incident response phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Detection,
    Analysis,
    Containment,
    Eradication,
    Recovery,
    PostIncident,
}

impl Phase {
    /// All phases in their fixed traversal order.
    pub const ALL: [Phase; 6] = [
        Phase::Detection,
        Phase::Analysis,
        Phase::Containment,
        Phase::Eradication,
        Phase::Recovery,
        Phase::PostIncident,
    ];

    /// Zero-based position in the traversal order.
    pub fn index(self) -> usize {
        match self {
            Phase::Detection => 0,
            Phase::Analysis => 1,
            Phase::Containment => 2,
            Phase::Eradication => 3,
            Phase::Recovery => 4,
            Phase::PostIncident => 5,
        }
    }

    /// The phase that follows this one, or `None` for post-incident.
    pub fn next(self) -> Option<Phase> {
        Phase::ALL.get(self.index() + 1).copied()
    }

    pub fn is_last(self) -> bool {
        self == Phase::PostIncident
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Detection => "detection",
            Phase::Analysis => "analysis",
            Phase::Containment => "containment",
            Phase::Eradication => "eradication",
            Phase::Recovery => "recovery",
            Phase::PostIncident => "post_incident",
        }
    }

    /// Human-readable title used in exports.
    pub fn title(self) -> &'static str {
        match self {
            Phase::Detection => "Detection",
            Phase::Analysis => "Analysis",
            Phase::Containment => "Containment",
            Phase::Eradication => "Eradication",
            Phase::Recovery => "Recovery",
            Phase::PostIncident => "Post-Incident",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "detection" => Ok(Phase::Detection),
            "analysis" => Ok(Phase::Analysis),
            "containment" => Ok(Phase::Containment),
            "eradication" => Ok(Phase::Eradication),
            "recovery" => Ok(Phase::Recovery),
            "post_incident" | "postincident" => Ok(Phase::PostIncident),
            _ => Err(ParseEnumError {
                kind: "phase",
                value: s.to_string(),
                expected: "detection, analysis, containment, eradication, recovery, post_incident",
            }),
        }
    }
}

/// Category of an evidence ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Observation,
    Action,
    Decision,
    Artifact,
    Note,
    System,
}

impl EntryType {
    pub const ALL: [EntryType; 6] = [
        EntryType::Observation,
        EntryType::Action,
        EntryType::Decision,
        EntryType::Artifact,
        EntryType::Note,
        EntryType::System,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Observation => "observation",
            EntryType::Action => "action",
            EntryType::Decision => "decision",
            EntryType::Artifact => "artifact",
            EntryType::Note => "note",
            EntryType::System => "system",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ParseEnumError {
                kind: "entry type",
                value: s.to_string(),
                expected: "observation, action, decision, artifact, note, system",
            })
    }
}

/// Incident severity as assessed at intake.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(ParseEnumError {
                kind: "severity",
                value: s.to_string(),
                expected: "low, medium, high, critical",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_and_next() {
        assert_eq!(Phase::Detection.next(), Some(Phase::Analysis));
        assert_eq!(Phase::Recovery.next(), Some(Phase::PostIncident));
        assert_eq!(Phase::PostIncident.next(), None);
        assert!(Phase::PostIncident.is_last());
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
        assert!(Phase::Detection < Phase::Containment);
    }

    #[test]
    fn test_phase_parse_accepts_dashes() {
        assert_eq!("post-incident".parse::<Phase>().unwrap(), Phase::PostIncident);
        assert_eq!("Containment".parse::<Phase>().unwrap(), Phase::Containment);
        let err = "triage".parse::<Phase>().unwrap_err();
        assert_eq!(err.kind, "phase");
        assert_eq!(err.value, "triage");
    }

    #[test]
    fn test_phase_serde_is_snake_case() {
        let json = serde_json::to_string(&Phase::PostIncident).unwrap();
        assert_eq!(json, "\"post_incident\"");
    }

    #[test]
    fn test_entry_type_parse() {
        assert_eq!("system".parse::<EntryType>().unwrap(), EntryType::System);
        assert_eq!("NOTE".parse::<EntryType>().unwrap(), EntryType::Note);
        assert!("memo".parse::<EntryType>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(Severity::default(), Severity::Medium);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
    }
}
