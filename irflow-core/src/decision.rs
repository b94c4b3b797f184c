//! Guided decision trees.
//!
//! A tree is a directed graph of questions. Each recorded choice is kept as an
//! immutable [`DecisionPath`] and moves the cursor to the option's
//! `next_node`, or completes the tree when the option has none.

use crate::error::DecisionError;
use crate::timestamp;
use crate::types::{ParseEnumError, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How sure the playbook author is that an option is right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Confidence {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            _ => Err(ParseEnumError {
                kind: "confidence",
                value: s.to_string(),
                expected: "high, medium, low",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub recommended: bool,
    /// `None` makes this a terminal option.
    #[serde(default, alias = "next_node_id")]
    pub next_node: Option<String>,
    /// Advisory only; never moves the phase tracker.
    #[serde(default)]
    pub next_phase: Option<Phase>,
    #[serde(default)]
    pub modifies_evidence: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// A prerequisite decision: `node` must have been decided, with `option`
/// when given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequirement {
    pub node: String,
    #[serde(default)]
    pub option: Option<String>,
}

impl fmt::Display for DecisionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.option {
            Some(option) => write!(f, "{}={}", self.node, option),
            None => f.write_str(&self.node),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionNode {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub guidance: Option<String>,
    pub options: Vec<DecisionOption>,
    #[serde(default)]
    pub requires_checklist_items: Vec<String>,
    #[serde(default)]
    pub requires_decisions: Vec<DecisionRequirement>,
}

impl DecisionNode {
    pub fn option(&self, option_id: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// The first option flagged as recommended.
    pub fn recommended_option(&self) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.recommended)
    }
}

/// An immutable record of one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPath {
    pub node_id: String,
    pub selected_option_id: String,
    pub confidence: Confidence,
    pub rationale: Option<String>,
    pub operator: String,
    #[serde(with = "crate::timestamp::micros")]
    pub timestamp: DateTime<Utc>,
}

/// Why a node can or cannot be decided right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAvailability {
    pub node_id: String,
    pub available: bool,
    pub missing_items: Vec<String>,
    pub missing_decisions: Vec<String>,
}

impl NodeAvailability {
    pub fn into_result(self) -> Result<(), DecisionError> {
        if self.available {
            Ok(())
        } else {
            Err(DecisionError::Unavailable {
                node_id: self.node_id,
                missing_items: self.missing_items,
                missing_decisions: self.missing_decisions,
            })
        }
    }
}

/// A per-incident decision tree instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub id: String,
    pub name: String,
    pub phase: Phase,
    /// Gating trees must be completed before their phase can be left.
    #[serde(default)]
    pub gating: bool,
    pub nodes: Vec<DecisionNode>,
    pub entry_node_id: String,
    /// `None` once the tree is completed.
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub path_taken: Vec<DecisionPath>,
}

impl DecisionTree {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        phase: Phase,
        nodes: Vec<DecisionNode>,
        entry_node_id: impl Into<String>,
    ) -> Self {
        let entry_node_id = entry_node_id.into();
        Self {
            id: id.into(),
            name: name.into(),
            phase,
            gating: false,
            nodes,
            current_node_id: Some(entry_node_id.clone()),
            entry_node_id,
            completed: false,
            path_taken: Vec::new(),
        }
    }

    pub fn gating(mut self) -> Self {
        self.gating = true;
        self
    }

    pub fn node(&self, node_id: &str) -> Option<&DecisionNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn is_started(&self) -> bool {
        !self.path_taken.is_empty()
    }

    /// The node awaiting a decision, or `None` once completed.
    pub fn current_node(&self) -> Option<&DecisionNode> {
        if self.completed {
            return None;
        }
        let id = self.current_node_id.as_deref().unwrap_or(&self.entry_node_id);
        self.node(id)
    }

    fn decision_satisfied(&self, req: &DecisionRequirement) -> bool {
        self.path_taken.iter().any(|p| {
            p.node_id == req.node
                && req
                    .option
                    .as_deref()
                    .is_none_or(|opt| p.selected_option_id == opt)
        })
    }

    /// Read-only prerequisite check for `node_id`.
    ///
    /// `terminal_items` holds every checklist item id of the incident that is
    /// completed, skipped or not applicable.
    pub fn availability(
        &self,
        node_id: &str,
        terminal_items: &HashSet<&str>,
    ) -> Result<NodeAvailability, DecisionError> {
        let node = self.node(node_id).ok_or_else(|| DecisionError::NodeNotFound {
            tree_id: self.id.clone(),
            node_id: node_id.to_string(),
        })?;

        let missing_items: Vec<String> = node
            .requires_checklist_items
            .iter()
            .filter(|id| !terminal_items.contains(id.as_str()))
            .cloned()
            .collect();
        let missing_decisions: Vec<String> = node
            .requires_decisions
            .iter()
            .filter(|req| !self.decision_satisfied(req))
            .map(ToString::to_string)
            .collect();

        Ok(NodeAvailability {
            node_id: node_id.to_string(),
            available: missing_items.is_empty() && missing_decisions.is_empty(),
            missing_items,
            missing_decisions,
        })
    }

    pub fn is_available(&self, node_id: &str, terminal_items: &HashSet<&str>) -> bool {
        self.availability(node_id, terminal_items)
            .is_ok_and(|a| a.available)
    }

    /// Record a choice at the current node.
    ///
    /// Options flagged `requires_confirmation` are rejected unless `confirm`
    /// is set, so callers can prompt and resubmit.
    pub fn record_decision(
        &mut self,
        option_id: &str,
        operator: &str,
        rationale: Option<&str>,
        confirm: bool,
    ) -> Result<DecisionPath, DecisionError> {
        if self.completed {
            return Err(DecisionError::TreeCompleted {
                tree_id: self.id.clone(),
            });
        }
        let node = self.current_node().ok_or_else(|| DecisionError::NodeNotFound {
            tree_id: self.id.clone(),
            node_id: self
                .current_node_id
                .clone()
                .unwrap_or_else(|| self.entry_node_id.clone()),
        })?;
        let option = node
            .option(option_id)
            .ok_or_else(|| DecisionError::UnknownOption {
                node_id: node.id.clone(),
                option_id: option_id.to_string(),
            })?;
        if option.requires_confirmation && !confirm {
            return Err(DecisionError::ConfirmationRequired {
                node_id: node.id.clone(),
                option_id: option.id.clone(),
                label: option.label.clone(),
            });
        }

        let path = DecisionPath {
            node_id: node.id.clone(),
            selected_option_id: option.id.clone(),
            confidence: option.confidence,
            rationale: rationale
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            operator: operator.to_string(),
            timestamp: timestamp::now(),
        };
        let next = option.next_node.clone();

        self.path_taken.push(path.clone());
        match next {
            Some(next) => self.current_node_id = Some(next),
            None => {
                self.current_node_id = None;
                self.completed = true;
            }
        }
        Ok(path)
    }
}
