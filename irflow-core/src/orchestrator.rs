//! The workflow orchestrator: the only writer of incident state.
//!
//! Every mutation follows the same shape: take the incident lock, load the
//! stored state, apply the change to a clone, and commit the clone together
//! with exactly one ledger entry. An error anywhere before the commit drops
//! the clone, so a failed operation leaves no trace.

use crate::checklist::{BlockedItem, ChecklistItem, ChecklistPhase, ChecklistProgress};
use crate::config::{IrflowConfig, WorkflowConfig};
use crate::decision::{DecisionNode, DecisionPath, NodeAvailability};
use crate::error::{ChecklistError, DecisionError, PhaseError, Result, WorkflowError};
use crate::gating::{AdvanceCheck, Blocker};
use crate::ids;
use crate::incident::{Incident, IncidentState, IncidentStatus, NewIncident};
use crate::ledger::{
    ArtifactRef, ChainLink, EntryDraft, EvidenceEntry, EvidenceFilter, ExportFormat, Ledger,
    VerificationReport,
};
use crate::lock::IncidentLocks;
use crate::phase::{IncidentPhaseTracker, PhaseStatus, PhaseTransition};
use crate::playbook::{LoadReport, PlaybookLibrary};
use crate::store::{self, IncidentStore};
use crate::timestamp;
use crate::types::{EntryType, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A choice submitted for the current node of a decision tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecision {
    pub option_id: String,
    pub operator: String,
    #[serde(default)]
    pub rationale: Option<String>,
    /// Acknowledges options flagged `requires_confirmation`.
    #[serde(default)]
    pub confirm: bool,
}

impl RecordDecision {
    pub fn new(option_id: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            option_id: option_id.into(),
            operator: operator.into(),
            rationale: None,
            confirm: false,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }
}

/// Evidence submitted directly by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvidence {
    pub entry_type: EntryType,
    /// Defaults to the incident's current phase.
    #[serde(default)]
    pub phase: Option<Phase>,
    pub description: String,
    pub operator: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

impl NewEvidence {
    pub fn new(
        entry_type: EntryType,
        description: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            entry_type,
            phase: None,
            description: description.into(),
            operator: operator.into(),
            tags: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Which lifecycle states an operation accepts.
#[derive(Debug, Clone, Copy)]
enum Requires {
    Workable,
    Draft,
}

impl Requires {
    fn allows(self, status: IncidentStatus) -> bool {
        match self {
            Requires::Workable => status.accepts_workflow_changes(),
            Requires::Draft => status == IncidentStatus::Draft,
        }
    }
}

/// Drives incidents through their playbooks.
pub struct Orchestrator {
    store: Arc<dyn IncidentStore>,
    ledger: Ledger,
    locks: Arc<IncidentLocks>,
    playbooks: Arc<PlaybookLibrary>,
    settings: WorkflowConfig,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("playbooks", &self.playbooks.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        playbooks: Arc<PlaybookLibrary>,
        settings: WorkflowConfig,
    ) -> Self {
        let locks = Arc::new(IncidentLocks::new());
        Self {
            ledger: Ledger::new(Arc::clone(&store), Arc::clone(&locks)),
            store,
            locks,
            playbooks,
            settings,
        }
    }

    /// Open the configured store and playbook library.
    pub fn from_config(config: &IrflowConfig, workspace: &Path) -> Result<(Self, LoadReport)> {
        let store = store::open_store(&config.storage, workspace)?;
        let (library, report) = PlaybookLibrary::from_config(&config.playbooks)?;
        Ok((
            Self::new(store, Arc::new(library), config.workflow.clone()),
            report,
        ))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn playbooks(&self) -> &PlaybookLibrary {
        &self.playbooks
    }

    pub fn settings(&self) -> &WorkflowConfig {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn load(&self, incident_id: &str) -> Result<IncidentState> {
        self.store
            .load_state(incident_id)?
            .ok_or_else(|| {
                WorkflowError::IncidentNotFound {
                    incident_id: incident_id.to_string(),
                }
                .into()
            })
    }

    /// Apply `change` to a copy of the incident and commit it with the entry
    /// it returns.
    fn mutate<T>(
        &self,
        incident_id: &str,
        action: &str,
        requires: Requires,
        change: impl FnOnce(&mut IncidentState) -> Result<(EntryDraft, T)>,
    ) -> Result<T> {
        // Unknown ids never reach the lock registry.
        self.load(incident_id)?;
        self.locks.with_lock(incident_id, || {
            let mut next = self.load(incident_id)?;
            let status = next.incident.status;
            if !requires.allows(status) {
                return Err(WorkflowError::Inactive {
                    incident_id: incident_id.to_string(),
                    status: status.to_string(),
                    action: action.to_string(),
                }
                .into());
            }

            let (draft, out) = change(&mut next)?;
            draft.validate()?;
            next.incident.updated_at = timestamp::now();
            let entry = self.store.commit(incident_id, &draft, Some(&next))?;
            tracing::debug!(
                incident_id,
                action,
                sequence = entry.sequence_number,
                "Incident state committed"
            );
            Ok(out)
        })
    }

    fn ensure_phase_open(state: &IncidentState, phase: Phase, action: &str) -> Result<()> {
        let status = state.tracker.status(phase);
        if matches!(status, PhaseStatus::Completed | PhaseStatus::Skipped) {
            return Err(PhaseError::InvalidTransition {
                phase,
                status: status.to_string(),
                action: action.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn require_operator(operator: &str) -> Result<()> {
        if operator.trim().is_empty() {
            return Err(WorkflowError::Validation {
                field: "operator".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }
        Ok(())
    }

    fn integrity_blocker(&self, incident_id: &str) -> Result<Option<Blocker>> {
        if !self.settings.verify_chain_before_advance {
            return Ok(None);
        }
        let report = self.ledger.verify(incident_id)?;
        Ok((!report.is_valid).then(|| Blocker::IntegrityBroken {
            first_invalid_index: report.first_invalid_index,
            reason: report.reason.unwrap_or_default(),
        }))
    }

    /// Shared path for checklist item mutations.
    fn change_item(
        &self,
        incident_id: &str,
        item_id: &str,
        operator: &str,
        action: &str,
        apply: impl FnOnce(&mut ChecklistPhase) -> Result<String>,
    ) -> Result<ChecklistItem> {
        Self::require_operator(operator)?;
        self.mutate(incident_id, action, Requires::Workable, |state| {
            let phase = state.item_phase(item_id)?;
            Self::ensure_phase_open(state, phase, action)?;
            let checklist = state.checklist_mut(phase)?;
            let description = apply(checklist)?;
            let item = checklist
                .get(item_id)
                .cloned()
                .ok_or_else(|| ChecklistError::ItemNotFound {
                    phase,
                    item_id: item_id.to_string(),
                })?;

            let mut tags = vec!["checklist".to_string(), item.id.clone(), item.status.to_string()];
            if item.forensic_critical {
                tags.push("forensic-critical".into());
            }
            let draft = EntryDraft::new(incident_id, EntryType::Action, phase, description, operator)
                .with_tags(tags);
            tracing::info!(incident_id, item_id, status = %item.status, "Checklist item updated");
            Ok((draft, item))
        })
    }

    // -----------------------------------------------------------------------
    // Incidents
    // -----------------------------------------------------------------------

    /// Open a new incident from a playbook. Writes the incident's first
    /// ledger entry.
    pub fn create_incident(&self, request: NewIncident) -> Result<IncidentState> {
        request.validate()?;
        let playbook = self.playbooks.get(&request.playbook_id)?;

        let incident_id = loop {
            let candidate = ids::incident_id();
            if self.store.load_state(&candidate)?.is_none() {
                break candidate;
            }
        };

        let mut tracker = IncidentPhaseTracker::new();
        let status = if request.activate {
            tracker.start(Phase::Detection)?;
            IncidentStatus::Active
        } else {
            IncidentStatus::Draft
        };
        let now = timestamp::now();
        let materialized = playbook.materialize();
        let state = IncidentState {
            incident: Incident {
                id: incident_id.clone(),
                title: request.title.trim().to_string(),
                description: request.description.clone(),
                playbook_id: playbook.id.clone(),
                severity: request.severity,
                status,
                created_by: request.operator.clone(),
                created_at: now,
                updated_at: now,
            },
            tracker,
            checklists: materialized.checklists,
            decision_trees: materialized.decision_trees,
        };

        let draft = EntryDraft::new(
            &incident_id,
            EntryType::System,
            Phase::Detection,
            format!(
                "Incident created: {} (playbook {} v{}, severity {}, status {})",
                state.incident.title, playbook.id, playbook.version, request.severity, status
            ),
            &request.operator,
        )
        .with_tags(["incident-created"]);

        self.locks.with_lock(&incident_id, || {
            self.store.commit(&incident_id, &draft, Some(&state))
        })?;
        tracing::info!(
            incident_id = %incident_id,
            playbook = %playbook.id,
            status = %status,
            "Incident created"
        );
        Ok(state)
    }

    /// Start detection on a draft incident.
    pub fn activate_incident(&self, incident_id: &str, operator: &str) -> Result<Incident> {
        Self::require_operator(operator)?;
        self.mutate(incident_id, "activate", Requires::Draft, |state| {
            state.tracker.start(Phase::Detection)?;
            state.incident.status = IncidentStatus::Active;
            let draft = EntryDraft::new(
                incident_id,
                EntryType::System,
                Phase::Detection,
                "Incident activated; detection started",
                operator,
            )
            .with_tags(["incident-activated"]);
            tracing::info!(incident_id, "Incident activated");
            Ok((draft, state.incident.clone()))
        })
    }

    pub fn incident(&self, incident_id: &str) -> Result<Incident> {
        Ok(self.load(incident_id)?.incident)
    }

    pub fn state(&self, incident_id: &str) -> Result<IncidentState> {
        self.load(incident_id)
    }

    pub fn list_incidents(&self) -> Result<Vec<Incident>> {
        Ok(self.store.list_incidents()?)
    }

    // -----------------------------------------------------------------------
    // Checklists
    // -----------------------------------------------------------------------

    pub fn checklist(&self, incident_id: &str, phase: Phase) -> Result<ChecklistPhase> {
        Ok(self.load(incident_id)?.checklist(phase)?.clone())
    }

    pub fn available_items(&self, incident_id: &str, phase: Phase) -> Result<Vec<ChecklistItem>> {
        let state = self.load(incident_id)?;
        Ok(state
            .checklist(phase)?
            .available_items()
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn blocked_items(&self, incident_id: &str, phase: Phase) -> Result<Vec<BlockedItem>> {
        Ok(self.load(incident_id)?.checklist(phase)?.blocked_items())
    }

    pub fn progress(&self, incident_id: &str, phase: Phase) -> Result<ChecklistProgress> {
        Ok(self.load(incident_id)?.checklist(phase)?.progress())
    }

    pub fn start_item(&self, incident_id: &str, item_id: &str, operator: &str) -> Result<ChecklistItem> {
        self.change_item(incident_id, item_id, operator, "start", |cl| {
            let item = cl.start(item_id, operator)?;
            Ok(format!("Started checklist item {}: {}", item.id, item.title))
        })
    }

    pub fn complete_item(
        &self,
        incident_id: &str,
        item_id: &str,
        operator: &str,
        notes: Option<&str>,
    ) -> Result<ChecklistItem> {
        self.change_item(incident_id, item_id, operator, "complete", |cl| {
            let item = cl.complete(item_id, operator, notes)?;
            let mut description = format!("Completed checklist item {}: {}", item.id, item.title);
            if let Some(notes) = &item.notes {
                description.push_str(&format!("\nNotes: {notes}"));
            }
            Ok(description)
        })
    }

    pub fn skip_item(
        &self,
        incident_id: &str,
        item_id: &str,
        operator: &str,
        reason: &str,
    ) -> Result<ChecklistItem> {
        self.change_item(incident_id, item_id, operator, "skip", |cl| {
            let item = cl.skip(item_id, operator, reason)?;
            Ok(format!(
                "Skipped checklist item {}: {}\nReason: {}",
                item.id,
                item.title,
                item.skip_reason.as_deref().unwrap_or_default()
            ))
        })
    }

    pub fn mark_not_applicable(
        &self,
        incident_id: &str,
        item_id: &str,
        operator: &str,
        reason: &str,
    ) -> Result<ChecklistItem> {
        self.change_item(incident_id, item_id, operator, "mark not applicable", |cl| {
            let item = cl.mark_not_applicable(item_id, operator, reason)?;
            Ok(format!(
                "Marked checklist item {} not applicable: {}\nReason: {}",
                item.id,
                item.title,
                item.skip_reason.as_deref().unwrap_or_default()
            ))
        })
    }

    /// Record a reviewer's acceptance of a skipped forensic-critical item.
    pub fn approve_skip_exception(
        &self,
        incident_id: &str,
        item_id: &str,
        approver: &str,
    ) -> Result<ChecklistItem> {
        self.change_item(incident_id, item_id, approver, "approve exception", |cl| {
            let item = cl.approve_skip_exception(item_id, approver)?;
            Ok(format!(
                "Approved skip exception for forensic-critical item {}: {}",
                item.id, item.title
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// The node awaiting a decision, or `None` once the tree is complete.
    pub fn current_decision_node(&self, incident_id: &str, tree_id: &str) -> Result<Option<DecisionNode>> {
        let state = self.load(incident_id)?;
        Ok(state.tree(tree_id)?.current_node().cloned())
    }

    /// Prerequisite status of the current node, or `None` once complete.
    pub fn decision_availability(
        &self,
        incident_id: &str,
        tree_id: &str,
    ) -> Result<Option<NodeAvailability>> {
        let state = self.load(incident_id)?;
        let tree = state.tree(tree_id)?;
        let terminal = state.terminal_item_ids();
        match tree.current_node() {
            Some(node) => Ok(Some(tree.availability(&node.id, &terminal)?)),
            None => Ok(None),
        }
    }

    pub fn record_decision(
        &self,
        incident_id: &str,
        tree_id: &str,
        decision: RecordDecision,
    ) -> Result<DecisionPath> {
        Self::require_operator(&decision.operator)?;
        self.mutate(incident_id, "record decision", Requires::Workable, |state| {
            let tree = state.tree(tree_id)?;
            let phase = tree.phase;
            Self::ensure_phase_open(state, phase, "record a decision in")?;
            let Some(node) = tree.current_node() else {
                return Err(DecisionError::TreeCompleted {
                    tree_id: tree_id.to_string(),
                }
                .into());
            };
            tree.availability(&node.id, &state.terminal_item_ids())?
                .into_result()?;
            let node = node.clone();

            let path = state.tree_mut(tree_id)?.record_decision(
                &decision.option_id,
                &decision.operator,
                decision.rationale.as_deref(),
                decision.confirm,
            )?;
            // record_decision only succeeds for an option on this node.
            let option = node
                .option(&path.selected_option_id)
                .cloned()
                .ok_or_else(|| DecisionError::UnknownOption {
                    node_id: node.id.clone(),
                    option_id: path.selected_option_id.clone(),
                })?;

            let mut description = format!(
                "Decision {}/{}: {} -> {} (confidence {})",
                tree_id, node.id, node.question, option.label, option.confidence
            );
            if let Some(rationale) = &path.rationale {
                description.push_str(&format!("\nRationale: {rationale}"));
            }
            if let Some(next_phase) = option.next_phase {
                description.push_str(&format!("\nSuggested next phase: {next_phase}"));
            }

            let mut tags = vec!["decision".to_string(), tree_id.to_string()];
            if option.modifies_evidence {
                tags.push("modifies-evidence".into());
                tracing::warn!(
                    incident_id,
                    tree_id,
                    option = %option.id,
                    "Selected option modifies evidence"
                );
            }
            if option.requires_confirmation {
                tags.push("confirmed".into());
            }

            let draft = EntryDraft::new(incident_id, EntryType::Decision, phase, description, &decision.operator)
                .with_tags(tags)
                .with_related_decision(tree_id, &node.id);
            tracing::info!(incident_id, tree_id, node = %node.id, option = %option.id, "Decision recorded");
            Ok((draft, path))
        })
    }

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    /// Append an operator-supplied entry. Allowed in every lifecycle state.
    pub fn add_evidence(&self, incident_id: &str, evidence: NewEvidence) -> Result<EvidenceEntry> {
        Self::require_operator(&evidence.operator)?;
        if evidence.description.trim().is_empty() {
            return Err(WorkflowError::Validation {
                field: "description".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }
        if evidence.entry_type == EntryType::System {
            return Err(WorkflowError::Validation {
                field: "entry_type".into(),
                reason: "system entries are written by the workflow only".into(),
            }
            .into());
        }
        let state = self.load(incident_id)?;
        let draft = EntryDraft::new(
            incident_id,
            evidence.entry_type,
            evidence.phase.unwrap_or(state.current_phase()),
            evidence.description,
            evidence.operator,
        )
        .with_tags(evidence.tags)
        .with_artifacts(evidence.artifacts);
        self.ledger.append(draft)
    }

    pub fn evidence(&self, incident_id: &str, filter: &EvidenceFilter) -> Result<Vec<EvidenceEntry>> {
        self.load(incident_id)?;
        Ok(self.ledger.entries(incident_id, filter)?)
    }

    pub fn chain(&self, incident_id: &str) -> Result<Vec<ChainLink>> {
        self.load(incident_id)?;
        Ok(self.ledger.chain(incident_id)?)
    }

    pub fn verify(&self, incident_id: &str) -> Result<VerificationReport> {
        self.load(incident_id)?;
        Ok(self.ledger.verify(incident_id)?)
    }

    pub fn export(&self, incident_id: &str, format: ExportFormat) -> Result<String> {
        self.load(incident_id)?;
        self.ledger.export(incident_id, format)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Whether the current phase may be left, with every blocking reason.
    pub fn can_advance(&self, incident_id: &str) -> Result<AdvanceCheck> {
        let state = self.load(incident_id)?;
        let gate = state.gate(self.settings.require_forensic_skip_approval);
        let mut blockers = state.tracker.advance_blockers(&gate);
        blockers.extend(self.integrity_blocker(incident_id)?);
        Ok(AdvanceCheck {
            phase: state.current_phase(),
            can_advance: blockers.is_empty()
                && state.incident.status.accepts_workflow_changes()
                && state.tracker.can_advance(&gate),
            blockers,
        })
    }

    /// Complete the current phase and start the next one.
    pub fn advance_phase(
        &self,
        incident_id: &str,
        operator: &str,
        notes: Option<&str>,
    ) -> Result<PhaseTransition> {
        Self::require_operator(operator)?;
        self.mutate(incident_id, "advance", Requires::Workable, |state| {
            if self.settings.verify_chain_before_advance {
                self.ledger.ensure_intact(incident_id)?;
            }
            let phase = state.current_phase();
            let blockers = state
                .tracker
                .advance_blockers(&state.gate(self.settings.require_forensic_skip_approval));
            if !blockers.is_empty() {
                tracing::info!(incident_id, %phase, blockers = blockers.len(), "Phase advance blocked");
                return Err(WorkflowError::AdvanceBlocked {
                    incident_id: incident_id.to_string(),
                    phase,
                    blockers,
                }
                .into());
            }

            let transition = state.tracker.advance(notes)?;
            if let Some(status) = IncidentStatus::after_completing(transition.from) {
                state.incident.status = status;
            }

            let mut description = format!(
                "Phase advanced from {} to {}",
                transition.from.title(),
                transition.to.title()
            );
            if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
                description.push_str(&format!("\nNotes: {notes}"));
            }
            let draft = EntryDraft::new(incident_id, EntryType::System, transition.from, description, operator)
                .with_tags([
                    "phase-transition".to_string(),
                    transition.from.to_string(),
                    transition.to.to_string(),
                ]);
            tracing::info!(
                incident_id,
                from = %transition.from,
                to = %transition.to,
                status = %state.incident.status,
                "Phase advanced"
            );
            Ok((draft, transition))
        })
    }

    /// Mark a future phase as skipped.
    pub fn skip_phase(
        &self,
        incident_id: &str,
        phase: Phase,
        operator: &str,
        reason: &str,
    ) -> Result<()> {
        Self::require_operator(operator)?;
        self.mutate(incident_id, "skip a phase", Requires::Workable, |state| {
            state.tracker.skip(phase, reason)?;
            let draft = EntryDraft::new(
                incident_id,
                EntryType::System,
                state.current_phase(),
                format!("Phase {} skipped\nReason: {}", phase.title(), reason.trim()),
                operator,
            )
            .with_tags(["phase-skipped".to_string(), phase.to_string()]);
            tracing::info!(incident_id, %phase, "Phase skipped");
            Ok((draft, ()))
        })
    }

    /// Complete post-incident and close the incident.
    pub fn close_incident(
        &self,
        incident_id: &str,
        operator: &str,
        notes: Option<&str>,
    ) -> Result<Incident> {
        Self::require_operator(operator)?;
        self.mutate(incident_id, "close", Requires::Workable, |state| {
            if self.settings.verify_chain_before_advance {
                self.ledger.ensure_intact(incident_id)?;
            }
            let phase = state.current_phase();
            if !phase.is_last() {
                return Err(PhaseError::InvalidTransition {
                    phase,
                    status: state.tracker.status(phase).to_string(),
                    action: "close the incident from".into(),
                }
                .into());
            }
            let blockers = state
                .tracker
                .advance_blockers(&state.gate(self.settings.require_forensic_skip_approval));
            if !blockers.is_empty() {
                return Err(WorkflowError::AdvanceBlocked {
                    incident_id: incident_id.to_string(),
                    phase,
                    blockers,
                }
                .into());
            }

            state.tracker.finish(notes)?;
            state.incident.status = IncidentStatus::Closed;
            let mut description = "Incident closed".to_string();
            if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
                description.push_str(&format!("\nNotes: {notes}"));
            }
            let draft = EntryDraft::new(incident_id, EntryType::System, phase, description, operator)
                .with_tags(["incident-closed"]);
            tracing::info!(incident_id, "Incident closed");
            Ok((draft, state.incident.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, IrflowError};
    use crate::store::MemoryStore;

    fn orchestrator() -> Orchestrator {
        let library = PlaybookLibrary::with_builtins().unwrap();
        Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(library),
            WorkflowConfig::default(),
        )
    }

    fn ransomware(orch: &Orchestrator) -> String {
        orch.create_incident(NewIncident::new("Encrypted file shares", "ransomware", "alice"))
            .unwrap()
            .incident
            .id
    }

    fn entry_count(orch: &Orchestrator, id: &str) -> usize {
        orch.chain(id).unwrap().len()
    }

    #[test]
    fn test_create_incident_writes_genesis_entry() {
        let orch = orchestrator();
        let state = orch
            .create_incident(NewIncident::new("Encrypted file shares", "ransomware", "alice"))
            .unwrap();
        assert_eq!(state.incident.status, IncidentStatus::Active);
        assert_eq!(state.tracker.status(Phase::Detection), PhaseStatus::InProgress);

        let entries = orch.evidence(&state.incident.id, &EvidenceFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, EntryType::System);
        assert!(entries[0].previous_hash.is_none());
    }

    #[test]
    fn test_create_incident_unknown_playbook() {
        let orch = orchestrator();
        let err = orch
            .create_incident(NewIncident::new("x", "nope", "alice"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(orch.list_incidents().unwrap().is_empty());
    }

    #[test]
    fn test_each_mutation_writes_one_entry() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        orch.start_item(&id, "rw-det-01", "alice").unwrap();
        assert_eq!(entry_count(&orch, &id), 2);
        orch.complete_item(&id, "rw-det-01", "alice", Some("EDR alert")).unwrap();
        assert_eq!(entry_count(&orch, &id), 3);
        orch.skip_item(&id, "rw-det-04", "alice", "note already collected by EDR").unwrap();
        assert_eq!(entry_count(&orch, &id), 4);
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        let before = orch.state(&id).unwrap();
        let err = orch.complete_item(&id, "rw-det-02", "alice", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
        assert_eq!(entry_count(&orch, &id), 1);
        assert_eq!(orch.state(&id).unwrap(), before);
    }

    #[test]
    fn test_complete_item_entry_is_tagged() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        orch.complete_item(&id, "rw-det-01", "alice", None).unwrap();
        orch.complete_item(&id, "rw-det-03", "alice", None).unwrap();
        let actions = orch
            .evidence(
                &id,
                &EvidenceFilter {
                    phase: None,
                    entry_type: Some(EntryType::Action),
                },
            )
            .unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions[1].tags.contains(&"rw-det-03".to_string()));
        assert!(actions[1].tags.contains(&"forensic-critical".to_string()));
    }

    #[test]
    fn test_advance_blocked_lists_reasons() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        let check = orch.can_advance(&id).unwrap();
        assert!(!check.can_advance);
        assert_eq!(check.blockers.len(), 1);
        assert_eq!(check.blockers[0].subject(), "rw-det-01");

        let err = orch.advance_phase(&id, "alice", None).unwrap_err();
        assert!(matches!(
            err,
            IrflowError::Workflow(WorkflowError::AdvanceBlocked { ref blockers, .. }) if blockers.len() == 1
        ));
        assert_eq!(orch.state(&id).unwrap().current_phase(), Phase::Detection);
        assert_eq!(entry_count(&orch, &id), 1);
    }

    #[test]
    fn test_draft_incident_rejects_workflow_changes() {
        let orch = orchestrator();
        let state = orch
            .create_incident(NewIncident::new("Suspicious login", "generic", "bob").as_draft())
            .unwrap();
        let id = state.incident.id;
        assert_eq!(state.incident.status, IncidentStatus::Draft);
        assert!(state.tracker.active_phase().is_none());

        let err = orch.complete_item(&id, "gen-det-01", "bob", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Evidence is accepted regardless of lifecycle.
        orch.add_evidence(&id, NewEvidence::new(EntryType::Observation, "VPN login from new ASN", "bob"))
            .unwrap();

        let incident = orch.activate_incident(&id, "bob").unwrap();
        assert_eq!(incident.status, IncidentStatus::Active);
        orch.complete_item(&id, "gen-det-01", "bob", None).unwrap();
        assert!(orch.activate_incident(&id, "bob").is_err());
    }

    #[test]
    fn test_record_decision_requires_prerequisites() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        let err = orch
            .record_decision(&id, "ransom-demand", RecordDecision::new("do-not-pay", "alice"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
        let availability = orch.decision_availability(&id, "ransom-demand").unwrap().unwrap();
        assert_eq!(availability.missing_items, vec!["rw-ana-04".to_string()]);
    }

    #[test]
    fn test_add_evidence_rejects_system_type() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        let err = orch
            .add_evidence(&id, NewEvidence::new(EntryType::System, "forged", "mallory"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_unknown_incident() {
        let orch = orchestrator();
        for err in [
            orch.state("INC-2026-FFFFFF").unwrap_err(),
            orch.verify("INC-2026-FFFFFF").unwrap_err(),
            orch.complete_item("INC-2026-FFFFFF", "rw-det-01", "alice", None)
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn test_unknown_incident_leaves_no_chain_or_lock() {
        let orch = orchestrator();
        let err = orch
            .add_evidence(
                "INC-2026-FFFFFF",
                NewEvidence::new(EntryType::Note, "orphan", "alice"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        orch.skip_item("INC-2026-FFFFFF", "rw-det-02", "alice", "n/a")
            .unwrap_err();
        orch.advance_phase("INC-2026-FFFFFF", "alice", None).unwrap_err();

        assert!(orch.store.entries("INC-2026-FFFFFF").unwrap().is_empty());
        assert!(orch.locks.is_empty());
    }

    #[test]
    fn test_blank_operator_rejected() {
        let orch = orchestrator();
        let id = ransomware(&orch);
        let err = orch.complete_item(&id, "rw-det-01", "  ", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
