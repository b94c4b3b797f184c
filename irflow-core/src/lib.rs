//! # irflow Core
//!
//! Workflow core for guided incident response.
//! Provides the hash-chained evidence ledger, dependency-aware checklists,
//! decision trees, the six-phase tracker, playbook loading, persistence and
//! the orchestrator that drives them together.

pub mod checklist;
pub mod config;
pub mod decision;
pub mod error;
pub mod gating;
pub mod ids;
pub mod incident;
pub mod ledger;
pub mod lock;
pub mod orchestrator;
pub mod phase;
pub mod playbook;
pub mod store;
pub mod timestamp;
pub mod types;

// Re-export commonly used types at the crate root.
pub use checklist::{BlockedItem, ChecklistItem, ChecklistPhase, ChecklistProgress, ItemStatus};
pub use config::{IrflowConfig, StorageBackend, load_config};
pub use decision::{Confidence, DecisionNode, DecisionOption, DecisionPath, DecisionTree};
pub use error::{ErrorKind, IrflowError, Result};
pub use gating::{AdvanceCheck, AdvancePolicy, Blocker};
pub use incident::{Incident, IncidentState, IncidentStatus, NewIncident};
pub use ledger::{
    ArtifactRef, EntryDraft, EvidenceEntry, EvidenceFilter, ExportFormat, Ledger,
    VerificationReport,
};
pub use orchestrator::{NewEvidence, Orchestrator, RecordDecision};
pub use phase::{IncidentPhaseTracker, PhaseProgress, PhaseStatus, PhaseTransition};
pub use playbook::{Playbook, PlaybookLibrary};
pub use store::{IncidentStore, MemoryStore, SqliteStore};
pub use types::{EntryType, Phase, Severity};
