use super::IncidentStore;
use crate::error::StoreError;
use crate::incident::{Incident, IncidentState};
use crate::ledger::entry::{ArtifactRef, EntryDraft, EvidenceEntry};
use crate::timestamp;
use crate::types::{EntryType, Phase};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS incidents (
    incident_id TEXT PRIMARY KEY,
    state_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence_entries (
    entry_id        TEXT PRIMARY KEY,
    incident_id     TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    previous_hash   TEXT,
    entry_hash      TEXT NOT NULL,
    entry_type      TEXT NOT NULL,
    phase           TEXT NOT NULL,
    description     TEXT NOT NULL,
    operator        TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    tags_json       TEXT NOT NULL,
    artifacts_json  TEXT NOT NULL,
    related_json    TEXT NOT NULL,
    UNIQUE (incident_id, sequence_number)
);
"#;

const SELECT_ENTRY: &str = "SELECT entry_id, incident_id, sequence_number, previous_hash, \
     entry_hash, entry_type, phase, description, operator, timestamp, tags_json, \
     artifacts_json, related_json FROM evidence_entries";

/// SQLite-backed store. Commits use an IMMEDIATE transaction so the tail
/// read and the following insert cannot interleave with another writer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened incident database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn tail_of(conn: &Connection, incident_id: &str) -> Result<Option<EvidenceEntry>, StoreError> {
    let sql = format!("{SELECT_ENTRY} WHERE incident_id = ?1 ORDER BY sequence_number DESC LIMIT 1");
    let raw = conn
        .query_row(&sql, params![incident_id], RawEntry::from_row)
        .optional()?;
    raw.map(|r| r.into_entry(0)).transpose()
}

/// Column values as stored, before JSON and enum decoding.
struct RawEntry {
    entry_id: String,
    incident_id: String,
    sequence_number: i64,
    previous_hash: Option<String>,
    entry_hash: String,
    entry_type: String,
    phase: String,
    description: String,
    operator: String,
    timestamp: String,
    tags_json: String,
    artifacts_json: String,
    related_json: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry_id: row.get(0)?,
            incident_id: row.get(1)?,
            sequence_number: row.get(2)?,
            previous_hash: row.get(3)?,
            entry_hash: row.get(4)?,
            entry_type: row.get(5)?,
            phase: row.get(6)?,
            description: row.get(7)?,
            operator: row.get(8)?,
            timestamp: row.get(9)?,
            tags_json: row.get(10)?,
            artifacts_json: row.get(11)?,
            related_json: row.get(12)?,
        })
    }

    /// Decode the row. `position` stands in for the sequence number in
    /// errors when the stored one is itself unusable.
    fn into_entry(self, position: u64) -> Result<EvidenceEntry, StoreError> {
        let sequence = u64::try_from(self.sequence_number).unwrap_or(position);
        let corrupt = |what: &str, detail: String| StoreError::Corrupt {
            sequence_number: Some(sequence),
            message: format!("entry {}: {what}: {detail}", self.entry_id),
        };
        let sequence_number = u64::try_from(self.sequence_number)
            .map_err(|e| corrupt("sequence_number", e.to_string()))?;
        let entry_type = self
            .entry_type
            .parse::<EntryType>()
            .map_err(|e| corrupt("entry_type", e.to_string()))?;
        let phase = self
            .phase
            .parse::<Phase>()
            .map_err(|e| corrupt("phase", e.to_string()))?;
        let timestamp = timestamp::parse(&self.timestamp)
            .map_err(|e| corrupt("timestamp", e.to_string()))?;
        // The hash covers the canonical rendering, so any other spelling of
        // the same instant is a modification.
        if timestamp::format(&timestamp) != self.timestamp {
            return Err(corrupt(
                "timestamp",
                format!("'{}' is not in canonical form", self.timestamp),
            ));
        }
        let tags: Vec<String> = serde_json::from_str(&self.tags_json)
            .map_err(|e| corrupt("tags_json", e.to_string()))?;
        let artifacts: Vec<ArtifactRef> = serde_json::from_str(&self.artifacts_json)
            .map_err(|e| corrupt("artifacts_json", e.to_string()))?;
        let related_decisions: Vec<String> = serde_json::from_str(&self.related_json)
            .map_err(|e| corrupt("related_json", e.to_string()))?;

        Ok(EvidenceEntry {
            entry_id: self.entry_id,
            incident_id: self.incident_id,
            sequence_number,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
            entry_type,
            phase,
            description: self.description,
            operator: self.operator,
            timestamp,
            tags,
            artifacts,
            related_decisions,
        })
    }
}

impl IncidentStore for SqliteStore {
    fn commit(
        &self,
        incident_id: &str,
        draft: &EntryDraft,
        state: Option<&IncidentState>,
    ) -> Result<EvidenceEntry, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let tail = tail_of(&tx, incident_id)?;
        let entry = EvidenceEntry::seal(draft, tail.as_ref());

        tx.execute(
            "INSERT INTO evidence_entries (entry_id, incident_id, sequence_number, previous_hash, \
             entry_hash, entry_type, phase, description, operator, timestamp, tags_json, \
             artifacts_json, related_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entry.entry_id,
                incident_id,
                entry.sequence_number as i64,
                entry.previous_hash,
                entry.entry_hash,
                entry.entry_type.as_str(),
                entry.phase.as_str(),
                entry.description,
                entry.operator,
                timestamp::format(&entry.timestamp),
                serde_json::to_string(&entry.tags)?,
                serde_json::to_string(&entry.artifacts)?,
                serde_json::to_string(&entry.related_decisions)?,
            ],
        )?;

        if let Some(state) = state {
            tx.execute(
                "INSERT INTO incidents (incident_id, state_json, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(incident_id) DO UPDATE SET state_json = excluded.state_json, \
                 updated_at = excluded.updated_at",
                params![
                    incident_id,
                    serde_json::to_string(state)?,
                    timestamp::format(&state.incident.updated_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(entry)
    }

    fn entries(&self, incident_id: &str) -> Result<Vec<EvidenceEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{SELECT_ENTRY} WHERE incident_id = ?1 ORDER BY sequence_number"))?;
        let rows = stmt.query_map(params![incident_id], RawEntry::from_row)?;
        rows.enumerate()
            .map(|(position, raw)| {
                raw.map_err(StoreError::from)
                    .and_then(|r| r.into_entry(position as u64))
            })
            .collect()
    }

    fn tail(&self, incident_id: &str) -> Result<Option<EvidenceEntry>, StoreError> {
        let conn = self.conn()?;
        tail_of(&conn, incident_id)
    }

    fn load_state(&self, incident_id: &str) -> Result<Option<IncidentState>, StoreError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM incidents WHERE incident_id = ?1",
                params![incident_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    fn list_incidents(&self) -> Result<Vec<Incident>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT state_json FROM incidents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut incidents = Vec::new();
        for json in rows {
            let state: IncidentState = serde_json::from_str(&json?)?;
            incidents.push(state.incident);
        }
        incidents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(incidents)
    }
}
