use super::IncidentStore;
use crate::error::StoreError;
use crate::incident::{Incident, IncidentState};
use crate::ledger::entry::{EntryDraft, EvidenceEntry};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, IncidentState>,
    chains: HashMap<String, Vec<EvidenceEntry>>,
}

/// Process-local store. Every commit runs under a single mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl IncidentStore for MemoryStore {
    fn commit(
        &self,
        incident_id: &str,
        draft: &EntryDraft,
        state: Option<&IncidentState>,
    ) -> Result<EvidenceEntry, StoreError> {
        let mut inner = self.lock()?;
        let chain = inner.chains.entry(incident_id.to_string()).or_default();
        let entry = EvidenceEntry::seal(draft, chain.last());
        chain.push(entry.clone());
        if let Some(state) = state {
            inner.states.insert(incident_id.to_string(), state.clone());
        }
        Ok(entry)
    }

    fn entries(&self, incident_id: &str) -> Result<Vec<EvidenceEntry>, StoreError> {
        Ok(self
            .lock()?
            .chains
            .get(incident_id)
            .cloned()
            .unwrap_or_default())
    }

    fn tail(&self, incident_id: &str) -> Result<Option<EvidenceEntry>, StoreError> {
        Ok(self
            .lock()?
            .chains
            .get(incident_id)
            .and_then(|c| c.last().cloned()))
    }

    fn load_state(&self, incident_id: &str) -> Result<Option<IncidentState>, StoreError> {
        Ok(self.lock()?.states.get(incident_id).cloned())
    }

    fn list_incidents(&self) -> Result<Vec<Incident>, StoreError> {
        let mut incidents: Vec<Incident> = self
            .lock()?
            .states
            .values()
            .map(|s| s.incident.clone())
            .collect();
        incidents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(incidents)
    }
}
