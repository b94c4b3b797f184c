//! Phase-advance gating: structured blocking reasons and the policy seam the
//! phase tracker consults.

use crate::checklist::ItemStatus;
use crate::types::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reason the current phase cannot be left yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Blocker {
    MandatoryItemIncomplete {
        item_id: String,
        title: String,
        status: ItemStatus,
    },
    ForensicSkipWithoutReason {
        item_id: String,
    },
    ForensicSkipUnapproved {
        item_id: String,
    },
    DecisionTreeIncomplete {
        tree_id: String,
        current_node: Option<String>,
    },
    IntegrityBroken {
        first_invalid_index: Option<u64>,
        reason: String,
    },
}

impl Blocker {
    /// The checklist item, decision tree or ledger this blocker refers to.
    pub fn subject(&self) -> &str {
        match self {
            Blocker::MandatoryItemIncomplete { item_id, .. }
            | Blocker::ForensicSkipWithoutReason { item_id }
            | Blocker::ForensicSkipUnapproved { item_id } => item_id,
            Blocker::DecisionTreeIncomplete { tree_id, .. } => tree_id,
            Blocker::IntegrityBroken { .. } => "evidence-ledger",
        }
    }
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::MandatoryItemIncomplete {
                item_id,
                title,
                status,
            } => write!(f, "mandatory item '{item_id}' ({title}) is {status}"),
            Blocker::ForensicSkipWithoutReason { item_id } => {
                write!(f, "forensic-critical item '{item_id}' was skipped without a reason")
            }
            Blocker::ForensicSkipUnapproved { item_id } => write!(
                f,
                "forensic-critical item '{item_id}' was skipped without an approved exception"
            ),
            Blocker::DecisionTreeIncomplete {
                tree_id,
                current_node,
            } => match current_node {
                Some(node) => write!(f, "decision tree '{tree_id}' is waiting at node '{node}'"),
                None => write!(f, "decision tree '{tree_id}' is incomplete"),
            },
            Blocker::IntegrityBroken {
                first_invalid_index,
                reason,
            } => match first_invalid_index {
                Some(idx) => write!(f, "evidence chain broken at entry {idx}: {reason}"),
                None => write!(f, "evidence chain broken: {reason}"),
            },
        }
    }
}

/// Decides whether a phase may be left. Implemented by the incident
/// aggregate, which knows the checklists and decision trees for each phase.
pub trait AdvancePolicy {
    fn advance_blockers(&self, phase: Phase) -> Vec<Blocker>;
}

/// A policy that never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl AdvancePolicy for Unrestricted {
    fn advance_blockers(&self, _phase: Phase) -> Vec<Blocker> {
        Vec::new()
    }
}

/// Result of asking whether an incident may advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceCheck {
    pub phase: Phase,
    pub can_advance: bool,
    pub blockers: Vec<Blocker>,
}
