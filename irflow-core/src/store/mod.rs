//! Persistence for incident state and evidence chains.
//!
//! The only write is [`IncidentStore::commit`]: it reads the chain tail,
//! seals the next entry onto it and stores that entry together with the
//! incident's new state in one atomic step. Callers never compute sequence
//! numbers or hashes themselves.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreError;
use crate::incident::{Incident, IncidentState};
use crate::ledger::entry::{EntryDraft, EvidenceEntry};
use std::path::Path;
use std::sync::Arc;

pub trait IncidentStore: Send + Sync {
    /// Seal `draft` onto the incident's chain and persist it, along with
    /// `state` when given. Either both are written or neither is.
    fn commit(
        &self,
        incident_id: &str,
        draft: &EntryDraft,
        state: Option<&IncidentState>,
    ) -> Result<EvidenceEntry, StoreError>;

    /// The full chain in sequence order.
    fn entries(&self, incident_id: &str) -> Result<Vec<EvidenceEntry>, StoreError>;

    /// The most recent entry, if any.
    fn tail(&self, incident_id: &str) -> Result<Option<EvidenceEntry>, StoreError>;

    fn load_state(&self, incident_id: &str) -> Result<Option<IncidentState>, StoreError>;

    /// Incident summaries, oldest first.
    fn list_incidents(&self) -> Result<Vec<Incident>, StoreError>;
}

/// Open the store selected by `config`. SQLite files default to the
/// workspace's `.irflow/` directory.
pub fn open_store(config: &StorageConfig, workspace: &Path) -> Result<Arc<dyn IncidentStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => {
            let path = config.database_path(workspace);
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
    }
}
