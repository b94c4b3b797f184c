//! Evidence entries and the hash chain that binds them.
//!
//! Each [`EvidenceEntry`] stores a SHA-256 digest over its canonical content
//! followed by its predecessor's digest (or `GENESIS` for sequence 0), so any
//! retroactive edit breaks every later link.

use crate::error::LedgerError;
use crate::ids;
use crate::timestamp;
use crate::types::{EntryType, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash input used in place of a predecessor digest for sequence 0.
pub const GENESIS: &str = "GENESIS";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A reference to an artifact held outside the ledger. Raw bytes never enter
/// the chain; only the name, digest and size do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    /// Lowercase hex SHA-256 of the artifact content.
    pub sha256: String,
    pub size_bytes: u64,
}

impl ArtifactRef {
    pub fn new(filename: impl Into<String>, sha256: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            filename: filename.into(),
            sha256: sha256.into(),
            size_bytes,
        }
    }

    /// Build a reference by hashing content the caller already holds.
    pub fn from_bytes(filename: impl Into<String>, content: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            sha256: hex_sha256(content),
            size_bytes: content.len() as u64,
        }
    }

    /// Hash everything `reader` yields without buffering it in memory.
    pub fn from_reader(
        filename: impl Into<String>,
        mut reader: impl std::io::Read,
    ) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let size_bytes = std::io::copy(&mut reader, &mut hasher)?;
        Ok(Self {
            filename: filename.into(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes,
        })
    }

    /// Stream a file from disk into a reference named after its file name.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = std::fs::File::open(path)?;
        Self::from_reader(filename, std::io::BufReader::new(file))
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.filename.trim().is_empty() {
            return Err(LedgerError::InvalidArtifact {
                filename: self.filename.clone(),
                reason: "filename is empty".into(),
            });
        }
        if !ids::is_sha256_hex(&self.sha256) {
            return Err(LedgerError::InvalidArtifact {
                filename: self.filename.clone(),
                reason: "sha256 must be 64 lowercase hex characters".into(),
            });
        }
        Ok(())
    }
}

/// Content of an entry before it is sealed into the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub incident_id: String,
    pub entry_type: EntryType,
    pub phase: Phase,
    pub description: String,
    pub operator: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    /// `"<tree_id>/<node_id>"` references to decisions this entry relates to.
    #[serde(default)]
    pub related_decisions: Vec<String>,
}

impl EntryDraft {
    pub fn new(
        incident_id: impl Into<String>,
        entry_type: EntryType,
        phase: Phase,
        description: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            incident_id: incident_id.into(),
            entry_type,
            phase,
            description: description.into(),
            operator: operator.into(),
            tags: Vec::new(),
            artifacts: Vec::new(),
            related_decisions: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    pub fn with_related_decision(mut self, tree_id: &str, node_id: &str) -> Self {
        self.related_decisions.push(format!("{tree_id}/{node_id}"));
        self
    }

    /// Malformed artifact references are the only thing a draft can be
    /// rejected for.
    pub fn validate(&self) -> Result<(), LedgerError> {
        self.artifacts.iter().try_for_each(ArtifactRef::validate)
    }
}

/// A finalized, immutable entry in an incident's evidence chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub entry_id: String,
    pub incident_id: String,
    /// 0-based, contiguous per incident.
    pub sequence_number: u64,
    /// `None` only at sequence 0.
    pub previous_hash: Option<String>,
    pub entry_hash: String,
    pub entry_type: EntryType,
    pub phase: Phase,
    pub description: String,
    pub operator: String,
    #[serde(with = "crate::timestamp::micros")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default)]
    pub related_decisions: Vec<String>,
}

/// Field order here is the canonical order; changing it changes every hash.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    entry_id: &'a str,
    incident_id: &'a str,
    sequence_number: u64,
    entry_type: EntryType,
    phase: Phase,
    description: &'a str,
    operator: &'a str,
    timestamp: String,
    tags: &'a [String],
    artifacts: &'a [ArtifactRef],
    related_decisions: &'a [String],
}

impl EvidenceEntry {
    /// Seal a draft onto `tail`, assigning id, timestamp, sequence and hashes.
    pub fn seal(draft: &EntryDraft, tail: Option<&EvidenceEntry>) -> Self {
        Self::seal_at(draft, tail, ids::evidence_id(), timestamp::now())
    }

    /// Seal with an explicit id and timestamp.
    pub fn seal_at(
        draft: &EntryDraft,
        tail: Option<&EvidenceEntry>,
        entry_id: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self {
            entry_id,
            incident_id: draft.incident_id.clone(),
            sequence_number: tail.map_or(0, |t| t.sequence_number + 1),
            previous_hash: tail.map(|t| t.entry_hash.clone()),
            entry_hash: String::new(),
            entry_type: draft.entry_type,
            phase: draft.phase,
            description: draft.description.clone(),
            operator: draft.operator.clone(),
            timestamp,
            tags: draft.tags.clone(),
            artifacts: draft.artifacts.clone(),
            related_decisions: draft.related_decisions.clone(),
        };
        entry.entry_hash = entry.compute_hash(entry.previous_hash.as_deref());
        entry
    }

    /// Canonical serialization of the content fields (hashes excluded).
    pub fn canonical(&self) -> String {
        let canonical = CanonicalEntry {
            entry_id: &self.entry_id,
            incident_id: &self.incident_id,
            sequence_number: self.sequence_number,
            entry_type: self.entry_type,
            phase: self.phase,
            description: &self.description,
            operator: &self.operator,
            timestamp: timestamp::format(&self.timestamp),
            tags: &self.tags,
            artifacts: &self.artifacts,
            related_decisions: &self.related_decisions,
        };
        // Plain strings, enums and vectors of them cannot fail to serialize.
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// `sha256(canonical || previous_hash)`, with `GENESIS` standing in for a
    /// missing predecessor.
    pub fn compute_hash(&self, previous_hash: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hasher.update(previous_hash.unwrap_or(GENESIS).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored hash matches the entry's own content.
    pub fn hash_matches(&self) -> bool {
        self.compute_hash(self.previous_hash.as_deref()) == self.entry_hash
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Result of verifying an incident's evidence chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub incident_id: String,
    pub is_valid: bool,
    pub entries_checked: usize,
    /// Sequence number of the first entry that failed, if any.
    pub first_invalid_index: Option<u64>,
    pub reason: Option<String>,
    /// Hash of the last entry checked.
    pub head_hash: Option<String>,
}

impl VerificationReport {
    pub fn into_result(self) -> Result<Self, LedgerError> {
        match self.first_invalid_index {
            Some(sequence_number) if !self.is_valid => Err(LedgerError::Integrity {
                incident_id: self.incident_id,
                sequence_number,
                reason: self.reason.unwrap_or_else(|| "verification failed".into()),
            }),
            _ => Ok(self),
        }
    }
}

/// Projection of one chain link for audit views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub sequence_number: u64,
    pub entry_id: String,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

impl From<&EvidenceEntry> for ChainLink {
    fn from(entry: &EvidenceEntry) -> Self {
        Self {
            sequence_number: entry.sequence_number,
            entry_id: entry.entry_id.clone(),
            previous_hash: entry.previous_hash.clone(),
            entry_hash: entry.entry_hash.clone(),
        }
    }
}

/// Verify an ordered chain. Pure: reads only the entries given.
pub fn verify_chain(incident_id: &str, entries: &[EvidenceEntry]) -> VerificationReport {
    let fail = |index: usize, reason: String| VerificationReport {
        incident_id: incident_id.to_string(),
        is_valid: false,
        entries_checked: index + 1,
        first_invalid_index: Some(index as u64),
        reason: Some(reason),
        head_hash: index
            .checked_sub(1)
            .and_then(|i| entries.get(i))
            .map(|e| e.entry_hash.clone()),
    };

    for (index, entry) in entries.iter().enumerate() {
        if entry.incident_id != incident_id {
            return fail(
                index,
                format!("entry belongs to incident {}", entry.incident_id),
            );
        }
        if entry.sequence_number != index as u64 {
            return fail(
                index,
                format!(
                    "sequence number {} found at position {index}",
                    entry.sequence_number
                ),
            );
        }
        let expected_previous = index.checked_sub(1).map(|i| entries[i].entry_hash.as_str());
        if entry.previous_hash.as_deref() != expected_previous {
            return fail(index, "previous hash does not match prior entry".into());
        }
        if !entry.hash_matches() {
            return fail(index, "entry hash does not match its content".into());
        }
    }

    VerificationReport {
        incident_id: incident_id.to_string(),
        is_valid: true,
        entries_checked: entries.len(),
        first_invalid_index: None,
        reason: None,
        head_hash: entries.last().map(|e| e.entry_hash.clone()),
    }
}

/// Compute SHA-256 of arbitrary bytes and return lowercase hex.
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
