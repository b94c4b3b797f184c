//! The incident aggregate and its persisted state.

use crate::checklist::{ChecklistItem, ChecklistPhase};
use crate::decision::DecisionTree;
use crate::error::{ChecklistError, DecisionError, WorkflowError};
use crate::gating::{AdvancePolicy, Blocker};
use crate::phase::IncidentPhaseTracker;
use crate::types::{ParseEnumError, Phase, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Incident lifecycle, driven by phase completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Draft,
    #[default]
    Active,
    Contained,
    Eradicated,
    Recovered,
    Closed,
}

impl IncidentStatus {
    /// Status reached when `phase` completes, if completing it changes status.
    pub fn after_completing(phase: Phase) -> Option<IncidentStatus> {
        match phase {
            Phase::Containment => Some(IncidentStatus::Contained),
            Phase::Eradication => Some(IncidentStatus::Eradicated),
            Phase::Recovery => Some(IncidentStatus::Recovered),
            Phase::PostIncident => Some(IncidentStatus::Closed),
            Phase::Detection | Phase::Analysis => None,
        }
    }

    /// Draft and closed incidents accept evidence but no workflow changes.
    pub fn accepts_workflow_changes(self) -> bool {
        !matches!(self, IncidentStatus::Draft | IncidentStatus::Closed)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentStatus::Draft => write!(f, "draft"),
            IncidentStatus::Active => write!(f, "active"),
            IncidentStatus::Contained => write!(f, "contained"),
            IncidentStatus::Eradicated => write!(f, "eradicated"),
            IncidentStatus::Recovered => write!(f, "recovered"),
            IncidentStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(IncidentStatus::Draft),
            "active" => Ok(IncidentStatus::Active),
            "contained" => Ok(IncidentStatus::Contained),
            "eradicated" => Ok(IncidentStatus::Eradicated),
            "recovered" => Ok(IncidentStatus::Recovered),
            "closed" => Ok(IncidentStatus::Closed),
            _ => Err(ParseEnumError {
                kind: "incident status",
                value: s.to_string(),
                expected: "draft, active, contained, eradicated, recovered, closed",
            }),
        }
    }
}

/// Incident summary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub playbook_id: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub created_by: String,
    #[serde(with = "crate::timestamp::micros")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::micros")]
    pub updated_at: DateTime<Utc>,
}

/// Intake request for a new incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub playbook_id: String,
    #[serde(default)]
    pub severity: Severity,
    pub operator: String,
    /// Start detection immediately; otherwise the incident stays a draft.
    #[serde(default = "default_activate")]
    pub activate: bool,
}

fn default_activate() -> bool {
    true
}

impl NewIncident {
    pub fn new(
        title: impl Into<String>,
        playbook_id: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            playbook_id: playbook_id.into(),
            severity: Severity::default(),
            operator: operator.into(),
            activate: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn as_draft(mut self) -> Self {
        self.activate = false;
        self
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (field, value) in [
            ("title", &self.title),
            ("playbook_id", &self.playbook_id),
            ("operator", &self.operator),
        ] {
            if value.trim().is_empty() {
                return Err(WorkflowError::Validation {
                    field: field.to_string(),
                    reason: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Everything persisted for one incident besides its evidence chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentState {
    pub incident: Incident,
    pub tracker: IncidentPhaseTracker,
    pub checklists: BTreeMap<Phase, ChecklistPhase>,
    pub decision_trees: BTreeMap<String, DecisionTree>,
}

impl IncidentState {
    pub fn id(&self) -> &str {
        &self.incident.id
    }

    pub fn current_phase(&self) -> Phase {
        self.tracker.current_phase
    }

    pub fn checklist(&self, phase: Phase) -> Result<&ChecklistPhase, ChecklistError> {
        self.checklists
            .get(&phase)
            .ok_or(ChecklistError::PhaseNotFound { phase })
    }

    pub fn checklist_mut(&mut self, phase: Phase) -> Result<&mut ChecklistPhase, ChecklistError> {
        self.checklists
            .get_mut(&phase)
            .ok_or(ChecklistError::PhaseNotFound { phase })
    }

    /// Find an item by id in any phase.
    pub fn find_item(&self, item_id: &str) -> Option<&ChecklistItem> {
        self.checklists.values().find_map(|c| c.get(item_id))
    }

    /// The phase whose checklist contains `item_id`.
    pub fn item_phase(&self, item_id: &str) -> Result<Phase, ChecklistError> {
        self.find_item(item_id)
            .map(|item| item.phase)
            .ok_or_else(|| ChecklistError::ItemNotFound {
                phase: self.current_phase(),
                item_id: item_id.to_string(),
            })
    }

    /// Ids of every resolved checklist item across all phases.
    pub fn terminal_item_ids(&self) -> HashSet<&str> {
        self.checklists
            .values()
            .flat_map(|c| c.resolved_ids())
            .collect()
    }

    pub fn tree(&self, tree_id: &str) -> Result<&DecisionTree, DecisionError> {
        self.decision_trees
            .get(tree_id)
            .ok_or_else(|| DecisionError::TreeNotFound {
                tree_id: tree_id.to_string(),
            })
    }

    pub fn tree_mut(&mut self, tree_id: &str) -> Result<&mut DecisionTree, DecisionError> {
        self.decision_trees
            .get_mut(tree_id)
            .ok_or_else(|| DecisionError::TreeNotFound {
                tree_id: tree_id.to_string(),
            })
    }

    /// Decision trees belonging to `phase`.
    pub fn trees_for(&self, phase: Phase) -> impl Iterator<Item = &DecisionTree> {
        self.decision_trees.values().filter(move |t| t.phase == phase)
    }

    /// Advance policy view over this state.
    pub fn gate(&self, require_exception_approval: bool) -> IncidentGate<'_> {
        IncidentGate {
            state: self,
            require_exception_approval,
        }
    }
}

/// Combines checklist and decision-tree gating for one incident.
pub struct IncidentGate<'a> {
    state: &'a IncidentState,
    require_exception_approval: bool,
}

impl AdvancePolicy for IncidentGate<'_> {
    fn advance_blockers(&self, phase: Phase) -> Vec<Blocker> {
        let mut blockers = self
            .state
            .checklists
            .get(&phase)
            .map(|c| c.advance_blockers(self.require_exception_approval))
            .unwrap_or_default();
        blockers.extend(
            self.state
                .trees_for(phase)
                .filter(|t| t.gating && !t.completed)
                .map(|t| Blocker::DecisionTreeIncomplete {
                    tree_id: t.id.clone(),
                    current_node: t.current_node().map(|n| n.id.clone()),
                }),
        );
        blockers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_after_completing() {
        assert_eq!(IncidentStatus::after_completing(Phase::Detection), None);
        assert_eq!(
            IncidentStatus::after_completing(Phase::Containment),
            Some(IncidentStatus::Contained)
        );
        assert_eq!(
            IncidentStatus::after_completing(Phase::PostIncident),
            Some(IncidentStatus::Closed)
        );
    }

    #[test]
    fn test_status_accepts_changes() {
        assert!(IncidentStatus::Active.accepts_workflow_changes());
        assert!(IncidentStatus::Recovered.accepts_workflow_changes());
        assert!(!IncidentStatus::Draft.accepts_workflow_changes());
        assert!(!IncidentStatus::Closed.accepts_workflow_changes());
    }

    #[test]
    fn test_new_incident_validation() {
        assert!(NewIncident::new("Ransomware on FS01", "ransomware", "alice")
            .validate()
            .is_ok());
        let err = NewIncident::new("  ", "ransomware", "alice")
            .validate()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { ref field, .. } if field == "title"));
    }

    #[test]
    fn test_new_incident_defaults_from_json() {
        let req: NewIncident = serde_json::from_str(
            r#"{"title":"Phish","playbook_id":"generic","operator":"bob"}"#,
        )
        .unwrap();
        assert!(req.activate);
        assert_eq!(req.severity, Severity::Medium);
    }
}
