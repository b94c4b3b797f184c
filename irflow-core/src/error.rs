//! Error types for the irflow workflow core.
//!
//! Uses `thiserror` for public API error types. Each subsystem owns its own
//! error enum; [`IrflowError`] wraps them all and [`IrflowError::kind`]
//! classifies any failure into the taxonomy callers render to operators.

use crate::gating::Blocker;
use crate::types::{ParseEnumError, Phase};
use std::path::PathBuf;

/// Top-level error type for the irflow core library.
#[derive(Debug, thiserror::Error)]
pub enum IrflowError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Checklist error: {0}")]
    Checklist(#[from] ChecklistError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Playbook error: {0}")]
    Playbook(#[from] PlaybookError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Invalid value: {0}")]
    Parse(#[from] ParseEnumError),
}

/// Coarse classification of every failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change.
    Validation,
    /// An unmet dependency or prerequisite.
    Blocked,
    /// Unknown incident, item, tree, node, option or playbook.
    NotFound,
    /// Hash chain verification failed.
    Integrity,
    /// Malformed playbook definition.
    Configuration,
    /// The entity is not in a state that permits the operation.
    Conflict,
    /// The persistence collaborator failed.
    Storage,
}

impl IrflowError {
    /// Map this error onto the operator-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IrflowError::Ledger(e) => match e {
                LedgerError::Integrity { .. } => ErrorKind::Integrity,
                LedgerError::InvalidArtifact { .. } | LedgerError::UnsupportedFormat { .. } => {
                    ErrorKind::Validation
                }
                LedgerError::Render { .. } => ErrorKind::Storage,
            },
            IrflowError::Checklist(e) => match e {
                ChecklistError::ItemNotFound { .. } | ChecklistError::PhaseNotFound { .. } => {
                    ErrorKind::NotFound
                }
                ChecklistError::Blocked { .. } => ErrorKind::Blocked,
                ChecklistError::MandatoryItem { .. } | ChecklistError::MissingReason { .. } => {
                    ErrorKind::Validation
                }
                ChecklistError::InvalidTransition { .. } => ErrorKind::Conflict,
            },
            IrflowError::Decision(e) => match e {
                DecisionError::TreeNotFound { .. }
                | DecisionError::NodeNotFound { .. }
                | DecisionError::UnknownOption { .. } => ErrorKind::NotFound,
                DecisionError::ConfirmationRequired { .. } => ErrorKind::Validation,
                DecisionError::Unavailable { .. } => ErrorKind::Blocked,
                DecisionError::TreeCompleted { .. } => ErrorKind::Conflict,
            },
            IrflowError::Phase(_) => ErrorKind::Conflict,
            IrflowError::Playbook(e) => match e {
                PlaybookError::NotFound { .. } => ErrorKind::NotFound,
                _ => ErrorKind::Configuration,
            },
            IrflowError::Store(_) => ErrorKind::Storage,
            IrflowError::Workflow(e) => match e {
                WorkflowError::IncidentNotFound { .. } => ErrorKind::NotFound,
                WorkflowError::AdvanceBlocked { .. } => ErrorKind::Blocked,
                WorkflowError::Inactive { .. } => ErrorKind::Conflict,
                WorkflowError::Validation { .. } => ErrorKind::Validation,
            },
            IrflowError::Parse(_) => ErrorKind::Validation,
        }
    }
}

/// Errors from the evidence ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Evidence chain for {incident_id} is broken at sequence {sequence_number}: {reason}")]
    Integrity {
        incident_id: String,
        sequence_number: u64,
        reason: String,
    },

    #[error("Invalid artifact reference '{filename}': {reason}")]
    InvalidArtifact { filename: String, reason: String },

    #[error("Unsupported export format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to render export: {message}")]
    Render { message: String },
}

/// Errors from checklist operations.
#[derive(Debug, thiserror::Error)]
pub enum ChecklistError {
    #[error("Checklist item not found in {phase}: {item_id}")]
    ItemNotFound { phase: Phase, item_id: String },

    #[error("No checklist loaded for phase {phase}")]
    PhaseNotFound { phase: Phase },

    #[error("Checklist item '{item_id}' is blocked by: {}", .blockers.join(", "))]
    Blocked {
        item_id: String,
        blockers: Vec<String>,
    },

    #[error("Checklist item '{item_id}' ({title}) is mandatory and cannot be skipped")]
    MandatoryItem { item_id: String, title: String },

    #[error("A non-empty reason is required to {action} '{item_id}'")]
    MissingReason { item_id: String, action: String },

    #[error("Cannot {action} checklist item '{item_id}' while it is {status}")]
    InvalidTransition {
        item_id: String,
        status: String,
        action: String,
    },
}

/// Errors from the decision navigator.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Decision tree not found: {tree_id}")]
    TreeNotFound { tree_id: String },

    #[error("Decision node '{node_id}' not found in tree '{tree_id}'")]
    NodeNotFound { tree_id: String, node_id: String },

    #[error("Option '{option_id}' is not offered by node '{node_id}'")]
    UnknownOption { node_id: String, option_id: String },

    #[error("Option '{option_id}' ({label}) at node '{node_id}' requires explicit confirmation")]
    ConfirmationRequired {
        node_id: String,
        option_id: String,
        label: String,
    },

    #[error(
        "Decision node '{node_id}' is not available yet (items: [{}], decisions: [{}])",
        .missing_items.join(", "),
        .missing_decisions.join(", ")
    )]
    Unavailable {
        node_id: String,
        missing_items: Vec<String>,
        missing_decisions: Vec<String>,
    },

    #[error("Decision tree '{tree_id}' is already completed")]
    TreeCompleted { tree_id: String },
}

/// Errors from the phase tracker.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("Cannot {action} phase {phase} while it is {status}")]
    InvalidTransition {
        phase: Phase,
        status: String,
        action: String,
    },

    #[error("Phase {phase} is the final phase; there is nothing to advance to")]
    TerminalPhase { phase: Phase },

    #[error("Phase {active} is already in progress")]
    AlreadyActive { active: Phase },

    #[error("Phase {phase} cannot be skipped: {reason}")]
    CannotSkip { phase: Phase, reason: String },
}

/// Errors from playbook loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error("Failed to parse playbook '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Invalid playbook '{playbook_id}': {message}")]
    Invalid {
        playbook_id: String,
        message: String,
    },

    #[error("Playbook '{playbook_id}' has a dependency cycle through '{element_id}'")]
    Cycle {
        playbook_id: String,
        element_id: String,
    },

    #[error("Playbook not found: {playbook_id}")]
    NotFound { playbook_id: String },

    #[error("Failed to read playbook file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row no longer decodes. `sequence_number` names the evidence
    /// entry when the row belongs to a chain.
    #[error("Corrupt stored record: {message}")]
    Corrupt {
        sequence_number: Option<u64>,
        message: String,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Errors from the workflow orchestrator itself.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Incident not found: {incident_id}")]
    IncidentNotFound { incident_id: String },

    #[error(
        "Incident {incident_id} cannot leave {phase}: {}",
        .blockers.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    AdvanceBlocked {
        incident_id: String,
        phase: Phase,
        blockers: Vec<Blocker>,
    },

    #[error("Incident {incident_id} is {status}; {action} is not permitted")]
    Inactive {
        incident_id: String,
        status: String,
        action: String,
    },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

/// A type alias for results using the top-level `IrflowError`.
pub type Result<T> = std::result::Result<T, IrflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_checklist_blocked() {
        let err = IrflowError::Checklist(ChecklistError::Blocked {
            item_id: "det-3".into(),
            blockers: vec!["det-1".into(), "det-2".into()],
        });
        assert_eq!(
            err.to_string(),
            "Checklist error: Checklist item 'det-3' is blocked by: det-1, det-2"
        );
        assert_eq!(err.kind(), ErrorKind::Blocked);
    }

    #[test]
    fn test_error_display_integrity() {
        let err = IrflowError::Ledger(LedgerError::Integrity {
            incident_id: "INC-2026-ABC123".into(),
            sequence_number: 2,
            reason: "entry hash mismatch".into(),
        });
        assert_eq!(
            err.to_string(),
            "Ledger error: Evidence chain for INC-2026-ABC123 is broken at sequence 2: entry hash mismatch"
        );
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_mandatory_item_is_validation() {
        let err: IrflowError = ChecklistError::MandatoryItem {
            item_id: "det-1".into(),
            title: "Confirm ransomware indicators present".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("cannot be skipped"));
    }

    #[test]
    fn test_decision_unavailable_lists_missing() {
        let err = DecisionError::Unavailable {
            node_id: "isolate".into(),
            missing_items: vec!["ana-1".into()],
            missing_decisions: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Decision node 'isolate' is not available yet (items: [ana-1], decisions: [])"
        );
    }

    #[test]
    fn test_error_kind_mapping() {
        let cases: Vec<(IrflowError, ErrorKind)> = vec![
            (
                WorkflowError::IncidentNotFound {
                    incident_id: "INC-x".into(),
                }
                .into(),
                ErrorKind::NotFound,
            ),
            (
                PhaseError::TerminalPhase {
                    phase: Phase::PostIncident,
                }
                .into(),
                ErrorKind::Conflict,
            ),
            (
                PlaybookError::Invalid {
                    playbook_id: "p".into(),
                    message: "bad".into(),
                }
                .into(),
                ErrorKind::Configuration,
            ),
            (
                StoreError::Corrupt {
                    sequence_number: None,
                    message: "x".into(),
                }
                .into(),
                ErrorKind::Storage,
            ),
            (
                DecisionError::ConfirmationRequired {
                    node_id: "n".into(),
                    option_id: "o".into(),
                    label: "Wipe host".into(),
                }
                .into(),
                ErrorKind::Validation,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: StoreError = serde_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
