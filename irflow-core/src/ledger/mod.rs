//! The evidence ledger: an append-only, hash-chained record per incident.

pub mod entry;
mod export;

pub use entry::{
    ArtifactRef, ChainLink, EntryDraft, EvidenceEntry, GENESIS, VerificationReport, hex_sha256,
    verify_chain,
};

use crate::error::{LedgerError, Result, StoreError};
use crate::lock::IncidentLocks;
use crate::store::IncidentStore;
use crate::types::{EntryType, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Output format for ledger exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Markdown => write!(f, "markdown"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = LedgerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(LedgerError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Optional filters for listing entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceFilter {
    pub phase: Option<Phase>,
    pub entry_type: Option<EntryType>,
}

impl EvidenceFilter {
    pub fn matches(&self, entry: &EvidenceEntry) -> bool {
        self.phase.is_none_or(|p| entry.phase == p)
            && self.entry_type.is_none_or(|t| entry.entry_type == t)
    }
}

/// Appends to and audits evidence chains held by an [`IncidentStore`].
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn IncidentStore>,
    locks: Arc<IncidentLocks>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    pub fn new(store: Arc<dyn IncidentStore>, locks: Arc<IncidentLocks>) -> Self {
        Self { store, locks }
    }

    /// Append one entry to the draft's incident.
    ///
    /// Sequence number, previous hash and entry hash are assigned by the
    /// store under the incident lock, so concurrent appends never fork the
    /// chain. Callers check that the incident exists first.
    pub(crate) fn append(&self, draft: EntryDraft) -> Result<EvidenceEntry> {
        draft.validate()?;
        let entry = self.locks.with_lock(&draft.incident_id, || {
            self.store.commit(&draft.incident_id, &draft, None)
        })?;
        tracing::debug!(
            incident_id = %entry.incident_id,
            sequence = entry.sequence_number,
            entry_type = %entry.entry_type,
            "Evidence entry appended"
        );
        Ok(entry)
    }

    /// Recompute every hash and link in the stored chain.
    ///
    /// A stored entry that no longer decodes fails verification at its
    /// sequence number rather than surfacing as a storage error.
    pub fn verify(&self, incident_id: &str) -> std::result::Result<VerificationReport, StoreError> {
        let report = match self.store.entries(incident_id) {
            Ok(entries) => verify_chain(incident_id, &entries),
            Err(StoreError::Corrupt {
                sequence_number: Some(sequence_number),
                message,
            }) => VerificationReport {
                incident_id: incident_id.to_string(),
                is_valid: false,
                entries_checked: usize::try_from(sequence_number).unwrap_or(usize::MAX),
                first_invalid_index: Some(sequence_number),
                reason: Some(format!("stored entry {sequence_number} is unreadable: {message}")),
                head_hash: None,
            },
            Err(e) => return Err(e),
        };
        if !report.is_valid {
            tracing::warn!(
                incident_id,
                first_invalid_index = ?report.first_invalid_index,
                reason = ?report.reason,
                "Evidence chain verification failed"
            );
        }
        Ok(report)
    }

    /// Like [`verify`](Self::verify), but a broken chain is an error naming
    /// the first offending sequence number.
    pub fn ensure_intact(&self, incident_id: &str) -> Result<VerificationReport> {
        Ok(self.verify(incident_id)?.into_result()?)
    }

    pub fn entries(
        &self,
        incident_id: &str,
        filter: &EvidenceFilter,
    ) -> std::result::Result<Vec<EvidenceEntry>, StoreError> {
        let mut entries = self.store.entries(incident_id)?;
        entries.retain(|e| filter.matches(e));
        Ok(entries)
    }

    pub fn chain(&self, incident_id: &str) -> std::result::Result<Vec<ChainLink>, StoreError> {
        Ok(self
            .store
            .entries(incident_id)?
            .iter()
            .map(ChainLink::from)
            .collect())
    }

    /// Render the chain, its verification result and the incident summary.
    /// Read-only: nothing rendered here is ever hashed.
    pub fn export(&self, incident_id: &str, format: ExportFormat) -> Result<String> {
        let entries = self.store.entries(incident_id)?;
        let state = self.store.load_state(incident_id)?;
        let report = verify_chain(incident_id, &entries);
        let ctx = export::ExportContext {
            incident_id,
            incident: state.as_ref().map(|s| &s.incident),
            entries: &entries,
            report: &report,
        };
        Ok(export::render(&ctx, format)?)
    }
}
