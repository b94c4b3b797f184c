//! The six-phase incident state machine.

use crate::error::PhaseError;
use crate::gating::{AdvancePolicy, Blocker};
use crate::timestamp;
use crate::types::Phase;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::NotStarted => write!(f, "not_started"),
            PhaseStatus::InProgress => write!(f, "in_progress"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Progress through a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default, with = "crate::timestamp::micros_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::micros_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl PhaseProgress {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::NotStarted,
            started_at: None,
            completed_at: None,
            notes: None,
            skip_reason: None,
        }
    }

    /// Time spent in the phase, once it has both started and completed.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// Phase transitions performed by [`IncidentPhaseTracker::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Tracks all six phases of one incident.
///
/// At most one phase is in progress at a time and phases complete in their
/// declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentPhaseTracker {
    pub current_phase: Phase,
    pub phases: Vec<PhaseProgress>,
}

impl Default for IncidentPhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentPhaseTracker {
    /// A tracker positioned at detection with nothing started.
    pub fn new() -> Self {
        Self {
            current_phase: Phase::Detection,
            phases: Phase::ALL.into_iter().map(PhaseProgress::new).collect(),
        }
    }

    pub fn progress(&self, phase: Phase) -> &PhaseProgress {
        &self.phases[phase.index()]
    }

    fn progress_mut(&mut self, phase: Phase) -> &mut PhaseProgress {
        &mut self.phases[phase.index()]
    }

    pub fn status(&self, phase: Phase) -> PhaseStatus {
        self.progress(phase).status
    }

    /// The phase currently in progress, if any.
    pub fn active_phase(&self) -> Option<Phase> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseStatus::InProgress)
            .map(|p| p.phase)
    }

    /// Whether the final phase has been completed.
    pub fn is_finished(&self) -> bool {
        self.status(Phase::PostIncident) == PhaseStatus::Completed
    }

    fn invalid(&self, phase: Phase, action: &str) -> PhaseError {
        PhaseError::InvalidTransition {
            phase,
            status: self.status(phase).to_string(),
            action: action.to_string(),
        }
    }

    /// Start the current phase.
    pub fn start(&mut self, phase: Phase) -> Result<(), PhaseError> {
        if let Some(active) = self.active_phase() {
            return Err(PhaseError::AlreadyActive { active });
        }
        if self.status(phase) != PhaseStatus::NotStarted || phase != self.current_phase {
            return Err(self.invalid(phase, "start"));
        }
        let p = self.progress_mut(phase);
        p.status = PhaseStatus::InProgress;
        p.started_at = Some(timestamp::now());
        Ok(())
    }

    /// Complete an in-progress phase.
    pub fn complete(&mut self, phase: Phase, notes: Option<&str>) -> Result<(), PhaseError> {
        if self.status(phase) != PhaseStatus::InProgress {
            return Err(self.invalid(phase, "complete"));
        }
        let p = self.progress_mut(phase);
        p.status = PhaseStatus::Completed;
        p.completed_at = Some(timestamp::now());
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            p.notes = Some(notes.to_string());
        }
        Ok(())
    }

    /// The first phase after the current one that has not been skipped.
    pub fn next_phase(&self) -> Option<Phase> {
        Phase::ALL[self.current_phase.index() + 1..]
            .iter()
            .copied()
            .find(|p| self.status(*p) != PhaseStatus::Skipped)
    }

    /// Complete the current phase and start the next non-skipped one.
    pub fn advance(&mut self, notes: Option<&str>) -> Result<PhaseTransition, PhaseError> {
        let from = self.current_phase;
        let to = self
            .next_phase()
            .ok_or(PhaseError::TerminalPhase { phase: from })?;
        if self.status(from) != PhaseStatus::InProgress {
            return Err(self.invalid(from, "advance from"));
        }

        self.complete(from, notes)?;
        self.current_phase = to;
        self.start(to)?;
        Ok(PhaseTransition { from, to })
    }

    /// Mark a future phase as skipped. The final phase is never skippable.
    pub fn skip(&mut self, phase: Phase, reason: &str) -> Result<(), PhaseError> {
        let cannot = |reason: &str| PhaseError::CannotSkip {
            phase,
            reason: reason.to_string(),
        };
        if phase.is_last() {
            return Err(cannot("the final phase is always performed"));
        }
        if phase <= self.current_phase {
            return Err(cannot("only phases after the current phase can be skipped"));
        }
        if self.status(phase) != PhaseStatus::NotStarted {
            return Err(self.invalid(phase, "skip"));
        }
        if reason.trim().is_empty() {
            return Err(cannot("a reason is required"));
        }

        let p = self.progress_mut(phase);
        p.status = PhaseStatus::Skipped;
        p.skip_reason = Some(reason.trim().to_string());
        Ok(())
    }

    /// Complete the final phase.
    pub fn finish(&mut self, notes: Option<&str>) -> Result<(), PhaseError> {
        if !self.current_phase.is_last() {
            return Err(self.invalid(self.current_phase, "finish the incident from"));
        }
        self.complete(self.current_phase, notes)
    }

    /// Everything preventing the current phase from being advanced.
    pub fn advance_blockers(&self, policy: &dyn AdvancePolicy) -> Vec<Blocker> {
        policy.advance_blockers(self.current_phase)
    }

    pub fn can_advance(&self, policy: &dyn AdvancePolicy) -> bool {
        self.status(self.current_phase) == PhaseStatus::InProgress
            && self.next_phase().is_some()
            && self.advance_blockers(policy).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::Unrestricted;

    struct AlwaysBlocked;

    impl AdvancePolicy for AlwaysBlocked {
        fn advance_blockers(&self, _phase: Phase) -> Vec<Blocker> {
            vec![Blocker::ForensicSkipWithoutReason {
                item_id: "det-2".into(),
            }]
        }
    }

    fn started() -> IncidentPhaseTracker {
        let mut t = IncidentPhaseTracker::new();
        t.start(Phase::Detection).unwrap();
        t
    }

    #[test]
    fn test_new_tracker() {
        let t = IncidentPhaseTracker::new();
        assert_eq!(t.current_phase, Phase::Detection);
        assert_eq!(t.phases.len(), 6);
        assert!(t.active_phase().is_none());
        assert!(!t.can_advance(&Unrestricted));
    }

    #[test]
    fn test_advance_moves_to_next() {
        let mut t = started();
        let tr = t.advance(Some("triaged")).unwrap();
        assert_eq!(tr, PhaseTransition { from: Phase::Detection, to: Phase::Analysis });
        assert_eq!(t.current_phase, Phase::Analysis);
        assert_eq!(t.status(Phase::Detection), PhaseStatus::Completed);
        assert_eq!(t.status(Phase::Analysis), PhaseStatus::InProgress);
        assert_eq!(t.progress(Phase::Detection).notes.as_deref(), Some("triaged"));
        assert!(t.progress(Phase::Detection).duration().is_some());
    }

    #[test]
    fn test_single_in_progress() {
        let mut t = started();
        assert!(matches!(
            t.start(Phase::Detection),
            Err(PhaseError::AlreadyActive { active: Phase::Detection })
        ));
        t.advance(None).unwrap();
        let active: Vec<_> = t
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::InProgress)
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_start_out_of_order_refused() {
        let mut t = IncidentPhaseTracker::new();
        assert!(matches!(
            t.start(Phase::Recovery),
            Err(PhaseError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut t = IncidentPhaseTracker::new();
        assert!(t.complete(Phase::Detection, None).is_err());
    }

    #[test]
    fn test_terminal_phase() {
        let mut t = started();
        for _ in 0..5 {
            t.advance(None).unwrap();
        }
        assert_eq!(t.current_phase, Phase::PostIncident);
        assert!(matches!(
            t.advance(None),
            Err(PhaseError::TerminalPhase { phase: Phase::PostIncident })
        ));
        assert!(!t.can_advance(&Unrestricted));
        t.finish(Some("lessons learned")).unwrap();
        assert!(t.is_finished());
    }

    #[test]
    fn test_skip_future_phase() {
        let mut t = started();
        t.skip(Phase::Eradication, "no persistence found").unwrap();
        t.advance(None).unwrap();
        t.advance(None).unwrap();
        assert_eq!(t.current_phase, Phase::Containment);
        let tr = t.advance(None).unwrap();
        assert_eq!(tr.to, Phase::Recovery);
        assert_eq!(t.status(Phase::Eradication), PhaseStatus::Skipped);
    }

    #[test]
    fn test_skip_rules() {
        let mut t = started();
        assert!(matches!(
            t.skip(Phase::PostIncident, "x"),
            Err(PhaseError::CannotSkip { .. })
        ));
        assert!(matches!(
            t.skip(Phase::Detection, "x"),
            Err(PhaseError::CannotSkip { .. })
        ));
        assert!(matches!(
            t.skip(Phase::Analysis, " "),
            Err(PhaseError::CannotSkip { .. })
        ));
        t.skip(Phase::Analysis, "analysis done upstream").unwrap();
        assert!(t.skip(Phase::Analysis, "again").is_err());
    }

    #[test]
    fn test_finish_only_from_last_phase() {
        let mut t = started();
        assert!(t.finish(None).is_err());
    }

    #[test]
    fn test_can_advance_consults_policy() {
        let t = started();
        assert!(t.can_advance(&Unrestricted));
        assert!(!t.can_advance(&AlwaysBlocked));
        assert_eq!(t.advance_blockers(&AlwaysBlocked).len(), 1);
    }
}
