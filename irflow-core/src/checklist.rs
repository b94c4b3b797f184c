//! Dependency-aware checklists, one per (incident, phase).
//!
//! Availability is recomputed by set membership on every call; phases hold a
//! few dozen items at most, so no incremental graph bookkeeping is kept.
//! Dependency graphs are validated as DAGs when the playbook is loaded.

use crate::error::ChecklistError;
use crate::gating::Blocker;
use crate::timestamp;
use crate::types::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Lifecycle of a single checklist item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Skipped,
    NotApplicable,
}

impl ItemStatus {
    /// Completed, skipped and not-applicable items satisfy dependencies.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Skipped | ItemStatus::NotApplicable
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::NotStarted => write!(f, "not_started"),
            ItemStatus::InProgress => write!(f, "in_progress"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Skipped => write!(f, "skipped"),
            ItemStatus::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

/// An actionable checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub phase: Phase,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub mandatory: bool,
    /// Mishandling this item can irreversibly destroy evidence.
    pub forensic_critical: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    /// Reviewer who accepted a forensic-critical skip.
    #[serde(default)]
    pub exception_approved_by: Option<String>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default, with = "crate::timestamp::micros_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::micros_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChecklistItem {
    pub fn new(id: impl Into<String>, phase: Phase, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase,
            title: title.into(),
            description: String::new(),
            mandatory: false,
            forensic_critical: false,
            depends_on: Vec::new(),
            status: ItemStatus::NotStarted,
            notes: None,
            skip_reason: None,
            exception_approved_by: None,
            completed_by: None,
            completed_at: None,
            updated_at: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn forensic_critical(mut self) -> Self {
        self.forensic_critical = true;
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    fn has_recorded_reason(&self) -> bool {
        self.skip_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

/// Completion summary for a phase checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub phase: Phase,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub skipped: usize,
    pub not_applicable: usize,
    /// Items in any terminal state.
    pub resolved: usize,
    /// `resolved / total * 100`, 100 for an empty checklist.
    pub percentage: f64,
    pub mandatory_remaining: usize,
}

/// An item that cannot be started yet, with the dependencies holding it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedItem {
    pub item_id: String,
    pub title: String,
    pub waiting_on: Vec<String>,
}

/// The ordered checklist for one incident phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistPhase {
    pub phase: Phase,
    pub items: Vec<ChecklistItem>,
}

impl ChecklistPhase {
    pub fn new(phase: Phase, items: Vec<ChecklistItem>) -> Self {
        Self { phase, items }
    }

    pub fn get(&self, item_id: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    fn index_of(&self, item_id: &str) -> Result<usize, ChecklistError> {
        self.items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| ChecklistError::ItemNotFound {
                phase: self.phase,
                item_id: item_id.to_string(),
            })
    }

    /// Ids of items in a terminal state.
    pub fn resolved_ids(&self) -> HashSet<&str> {
        self.items
            .iter()
            .filter(|i| i.status.is_terminal())
            .map(|i| i.id.as_str())
            .collect()
    }

    fn unmet_dependencies(&self, item: &ChecklistItem, resolved: &HashSet<&str>) -> Vec<String> {
        item.depends_on
            .iter()
            .filter(|dep| !resolved.contains(dep.as_str()))
            .cloned()
            .collect()
    }

    /// Not-started items whose dependencies are all resolved.
    pub fn available_items(&self) -> Vec<&ChecklistItem> {
        let resolved = self.resolved_ids();
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::NotStarted)
            .filter(|i| self.unmet_dependencies(i, &resolved).is_empty())
            .collect()
    }

    /// Not-started items held back by at least one unresolved dependency.
    pub fn blocked_items(&self) -> Vec<BlockedItem> {
        let resolved = self.resolved_ids();
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::NotStarted)
            .filter_map(|i| {
                let waiting_on = self.unmet_dependencies(i, &resolved);
                (!waiting_on.is_empty()).then(|| BlockedItem {
                    item_id: i.id.clone(),
                    title: i.title.clone(),
                    waiting_on,
                })
            })
            .collect()
    }

    fn ensure_unblocked(&self, idx: usize) -> Result<(), ChecklistError> {
        let item = &self.items[idx];
        let waiting_on = self.unmet_dependencies(item, &self.resolved_ids());
        if waiting_on.is_empty() {
            Ok(())
        } else {
            Err(ChecklistError::Blocked {
                item_id: item.id.clone(),
                blockers: waiting_on,
            })
        }
    }

    fn ensure_open(&self, idx: usize, action: &str) -> Result<(), ChecklistError> {
        let item = &self.items[idx];
        if item.status.is_terminal() {
            return Err(ChecklistError::InvalidTransition {
                item_id: item.id.clone(),
                status: item.status.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    /// Move a not-started item to in-progress.
    pub fn start(&mut self, item_id: &str, operator: &str) -> Result<&ChecklistItem, ChecklistError> {
        let idx = self.index_of(item_id)?;
        if self.items[idx].status != ItemStatus::NotStarted {
            return Err(ChecklistError::InvalidTransition {
                item_id: item_id.to_string(),
                status: self.items[idx].status.to_string(),
                action: "start".into(),
            });
        }
        self.ensure_unblocked(idx)?;

        let item = &mut self.items[idx];
        item.status = ItemStatus::InProgress;
        item.updated_at = Some(timestamp::now());
        tracing::debug!(item_id, operator, "Checklist item started");
        Ok(&self.items[idx])
    }

    /// Complete an item once all of its dependencies are resolved.
    pub fn complete(
        &mut self,
        item_id: &str,
        operator: &str,
        notes: Option<&str>,
    ) -> Result<&ChecklistItem, ChecklistError> {
        let idx = self.index_of(item_id)?;
        self.ensure_open(idx, "complete")?;
        self.ensure_unblocked(idx)?;

        let now = timestamp::now();
        let item = &mut self.items[idx];
        item.status = ItemStatus::Completed;
        item.completed_by = Some(operator.to_string());
        item.completed_at = Some(now);
        item.updated_at = Some(now);
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            item.notes = Some(notes.to_string());
        }
        Ok(&self.items[idx])
    }

    /// Skip an optional item. Mandatory items always refuse and stay as-is.
    pub fn skip(
        &mut self,
        item_id: &str,
        operator: &str,
        reason: &str,
    ) -> Result<&ChecklistItem, ChecklistError> {
        let idx = self.index_of(item_id)?;
        let item = &self.items[idx];
        if item.mandatory {
            return Err(ChecklistError::MandatoryItem {
                item_id: item.id.clone(),
                title: item.title.clone(),
            });
        }
        if reason.trim().is_empty() {
            return Err(ChecklistError::MissingReason {
                item_id: item_id.to_string(),
                action: "skip".into(),
            });
        }
        self.ensure_open(idx, "skip")?;

        let item = &mut self.items[idx];
        item.status = ItemStatus::Skipped;
        item.skip_reason = Some(reason.trim().to_string());
        item.completed_by = Some(operator.to_string());
        item.updated_at = Some(timestamp::now());
        if item.forensic_critical {
            tracing::warn!(item_id, operator, "Forensic-critical checklist item skipped");
        }
        Ok(&self.items[idx])
    }

    /// Mark an optional item as not applicable to this incident.
    pub fn mark_not_applicable(
        &mut self,
        item_id: &str,
        operator: &str,
        reason: &str,
    ) -> Result<&ChecklistItem, ChecklistError> {
        let idx = self.index_of(item_id)?;
        let item = &self.items[idx];
        if item.mandatory {
            return Err(ChecklistError::MandatoryItem {
                item_id: item.id.clone(),
                title: item.title.clone(),
            });
        }
        if reason.trim().is_empty() {
            return Err(ChecklistError::MissingReason {
                item_id: item_id.to_string(),
                action: "mark not applicable".into(),
            });
        }
        self.ensure_open(idx, "mark not applicable")?;

        let item = &mut self.items[idx];
        item.status = ItemStatus::NotApplicable;
        item.skip_reason = Some(reason.trim().to_string());
        item.completed_by = Some(operator.to_string());
        item.updated_at = Some(timestamp::now());
        Ok(&self.items[idx])
    }

    /// Record a reviewed exception for a skipped forensic-critical item.
    pub fn approve_skip_exception(
        &mut self,
        item_id: &str,
        approver: &str,
    ) -> Result<&ChecklistItem, ChecklistError> {
        let idx = self.index_of(item_id)?;
        let item = &self.items[idx];
        if item.status != ItemStatus::Skipped || !item.forensic_critical {
            return Err(ChecklistError::InvalidTransition {
                item_id: item_id.to_string(),
                status: item.status.to_string(),
                action: "approve a skip exception for".into(),
            });
        }
        let item = &mut self.items[idx];
        item.exception_approved_by = Some(approver.to_string());
        item.updated_at = Some(timestamp::now());
        Ok(&self.items[idx])
    }

    pub fn progress(&self) -> ChecklistProgress {
        let count = |s: ItemStatus| self.items.iter().filter(|i| i.status == s).count();
        let total = self.items.len();
        let resolved = self.items.iter().filter(|i| i.status.is_terminal()).count();
        let percentage = if total == 0 {
            100.0
        } else {
            ((resolved as f64 / total as f64) * 1000.0).round() / 10.0
        };

        ChecklistProgress {
            phase: self.phase,
            total,
            completed: count(ItemStatus::Completed),
            in_progress: count(ItemStatus::InProgress),
            skipped: count(ItemStatus::Skipped),
            not_applicable: count(ItemStatus::NotApplicable),
            resolved,
            percentage,
            mandatory_remaining: self
                .items
                .iter()
                .filter(|i| i.mandatory && i.status != ItemStatus::Completed)
                .count(),
        }
    }

    /// Everything in this checklist that prevents the phase from advancing.
    ///
    /// Mandatory items must be completed. Skipped forensic-critical items must
    /// carry a non-blank reason, and when `require_exception_approval` is set
    /// they also need a reviewed exception.
    pub fn advance_blockers(&self, require_exception_approval: bool) -> Vec<Blocker> {
        let mut blockers = Vec::new();
        for item in &self.items {
            if item.mandatory && item.status != ItemStatus::Completed {
                blockers.push(Blocker::MandatoryItemIncomplete {
                    item_id: item.id.clone(),
                    title: item.title.clone(),
                    status: item.status,
                });
            }
            if item.forensic_critical && item.status == ItemStatus::Skipped {
                if !item.has_recorded_reason() {
                    blockers.push(Blocker::ForensicSkipWithoutReason {
                        item_id: item.id.clone(),
                    });
                } else if require_exception_approval && item.exception_approved_by.is_none() {
                    blockers.push(Blocker::ForensicSkipUnapproved {
                        item_id: item.id.clone(),
                    });
                }
            }
        }
        blockers
    }

    pub fn can_advance(&self, require_exception_approval: bool) -> bool {
        self.advance_blockers(require_exception_approval).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detection() -> ChecklistPhase {
        ChecklistPhase::new(
            Phase::Detection,
            vec![
                ChecklistItem::new("det-1", Phase::Detection, "Confirm ransomware indicators present")
                    .mandatory(),
                ChecklistItem::new("det-2", Phase::Detection, "Capture volatile memory")
                    .forensic_critical()
                    .depends_on(["det-1"]),
                ChecklistItem::new("det-3", Phase::Detection, "Notify stakeholders")
                    .depends_on(["det-1", "det-2"]),
                ChecklistItem::new("det-4", Phase::Detection, "Open ticket"),
            ],
        )
    }

    fn ids(items: &[&ChecklistItem]) -> Vec<String> {
        items.iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn test_initial_availability() {
        let cl = detection();
        assert_eq!(ids(&cl.available_items()), vec!["det-1", "det-4"]);
        let blocked = cl.blocked_items();
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[0].item_id, "det-2");
        assert_eq!(blocked[0].waiting_on, vec!["det-1".to_string()]);
        assert_eq!(blocked[1].waiting_on, vec!["det-1".to_string(), "det-2".to_string()]);
    }

    #[test]
    fn test_complete_blocked_item_fails_with_blockers() {
        let mut cl = detection();
        let err = cl.complete("det-3", "alice", None).unwrap_err();
        match err {
            ChecklistError::Blocked { item_id, blockers } => {
                assert_eq!(item_id, "det-3");
                assert_eq!(blockers, vec!["det-1".to_string(), "det-2".to_string()]);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert_eq!(cl.get("det-3").unwrap().status, ItemStatus::NotStarted);
    }

    #[test]
    fn test_skipped_dependency_unblocks() {
        let mut cl = detection();
        cl.complete("det-1", "alice", Some("EDR alert confirmed")).unwrap();
        cl.skip("det-2", "alice", "host already powered off").unwrap();
        assert_eq!(ids(&cl.available_items()), vec!["det-3", "det-4"]);
        assert!(cl.blocked_items().is_empty());
        cl.complete("det-3", "alice", None).unwrap();
    }

    #[test]
    fn test_complete_unknown_item() {
        let mut cl = detection();
        assert!(matches!(
            cl.complete("nope", "alice", None),
            Err(ChecklistError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_complete_records_operator_and_notes() {
        let mut cl = detection();
        let item = cl.complete("det-1", "alice", Some("confirmed")).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.completed_by.as_deref(), Some("alice"));
        assert_eq!(item.notes.as_deref(), Some("confirmed"));
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn test_complete_twice_is_invalid() {
        let mut cl = detection();
        cl.complete("det-4", "alice", None).unwrap();
        assert!(matches!(
            cl.complete("det-4", "alice", None),
            Err(ChecklistError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_skip_mandatory_never_mutates() {
        let mut cl = detection();
        let before = cl.clone();
        let err = cl.skip("det-1", "alice", "not needed").unwrap_err();
        assert!(matches!(err, ChecklistError::MandatoryItem { .. }));
        assert_eq!(cl, before);
    }

    #[test]
    fn test_skip_requires_reason() {
        let mut cl = detection();
        assert!(matches!(
            cl.skip("det-4", "alice", "   "),
            Err(ChecklistError::MissingReason { .. })
        ));
        assert_eq!(cl.get("det-4").unwrap().status, ItemStatus::NotStarted);
    }

    #[test]
    fn test_mark_not_applicable() {
        let mut cl = detection();
        let item = cl.mark_not_applicable("det-4", "alice", "no ticketing system").unwrap();
        assert_eq!(item.status, ItemStatus::NotApplicable);
        assert!(cl.mark_not_applicable("det-1", "alice", "x").is_err());
    }

    #[test]
    fn test_start_requires_unblocked() {
        let mut cl = detection();
        assert!(matches!(
            cl.start("det-2", "alice"),
            Err(ChecklistError::Blocked { .. })
        ));
        cl.start("det-1", "alice").unwrap();
        assert_eq!(cl.get("det-1").unwrap().status, ItemStatus::InProgress);
        assert!(cl.available_items().iter().all(|i| i.id != "det-1"));
        cl.complete("det-1", "alice", None).unwrap();
    }

    #[test]
    fn test_progress() {
        let mut cl = detection();
        let p = cl.progress();
        assert_eq!(p.total, 4);
        assert_eq!(p.mandatory_remaining, 1);
        assert_eq!(p.percentage, 0.0);

        cl.complete("det-1", "alice", None).unwrap();
        cl.skip("det-4", "alice", "duplicate").unwrap();
        let p = cl.progress();
        assert_eq!(p.completed, 1);
        assert_eq!(p.skipped, 1);
        assert_eq!(p.resolved, 2);
        assert_eq!(p.percentage, 50.0);
        assert_eq!(p.mandatory_remaining, 0);
    }

    #[test]
    fn test_empty_checklist_progress() {
        let cl = ChecklistPhase::new(Phase::Recovery, Vec::new());
        assert_eq!(cl.progress().percentage, 100.0);
        assert!(cl.can_advance(true));
    }

    #[test]
    fn test_can_advance_requires_mandatory() {
        let mut cl = detection();
        assert!(!cl.can_advance(false));
        let blockers = cl.advance_blockers(false);
        assert_eq!(blockers.len(), 1);
        cl.complete("det-1", "alice", None).unwrap();
        assert!(cl.can_advance(false));
    }

    #[test]
    fn test_forensic_skip_without_reason_blocks() {
        let mut cl = detection();
        cl.complete("det-1", "alice", None).unwrap();
        cl.skip("det-2", "alice", "host offline").unwrap();
        assert!(cl.can_advance(false));

        // Stored state lost its reason.
        cl.items[1].skip_reason = Some(" ".into());
        assert!(matches!(
            cl.advance_blockers(false).as_slice(),
            [Blocker::ForensicSkipWithoutReason { .. }]
        ));
    }

    #[test]
    fn test_forensic_skip_exception_approval() {
        let mut cl = detection();
        cl.complete("det-1", "alice", None).unwrap();
        cl.skip("det-2", "alice", "host offline").unwrap();
        assert!(!cl.can_advance(true));
        assert!(matches!(
            cl.advance_blockers(true).as_slice(),
            [Blocker::ForensicSkipUnapproved { .. }]
        ));
        cl.approve_skip_exception("det-2", "lead").unwrap();
        assert!(cl.can_advance(true));
    }

    #[test]
    fn test_exception_only_for_skipped_forensic_items() {
        let mut cl = detection();
        assert!(cl.approve_skip_exception("det-2", "lead").is_err());
        cl.skip("det-4", "alice", "n/a").unwrap();
        assert!(cl.approve_skip_exception("det-4", "lead").is_err());
    }
}
