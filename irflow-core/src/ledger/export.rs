//! Markdown and JSON renderings of an evidence chain.

use super::ExportFormat;
use super::entry::{ChainLink, EvidenceEntry, VerificationReport};
use crate::error::LedgerError;
use crate::incident::Incident;
use crate::timestamp;
use serde::Serialize;
use std::fmt::Write;

pub(super) struct ExportContext<'a> {
    pub incident_id: &'a str,
    pub incident: Option<&'a Incident>,
    pub entries: &'a [EvidenceEntry],
    pub report: &'a VerificationReport,
}

pub(super) fn render(ctx: &ExportContext<'_>, format: ExportFormat) -> Result<String, LedgerError> {
    match format {
        ExportFormat::Markdown => render_markdown(ctx).map_err(|e| LedgerError::Render {
            message: e.to_string(),
        }),
        ExportFormat::Json => render_json(ctx),
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    incident_id: &'a str,
    incident: Option<&'a Incident>,
    exported_at: String,
    verification: &'a VerificationReport,
    chain: Vec<ChainLink>,
    entries: &'a [EvidenceEntry],
}

fn render_json(ctx: &ExportContext<'_>) -> Result<String, LedgerError> {
    let doc = JsonExport {
        incident_id: ctx.incident_id,
        incident: ctx.incident,
        exported_at: timestamp::format(&timestamp::now()),
        verification: ctx.report,
        chain: ctx.entries.iter().map(ChainLink::from).collect(),
        entries: ctx.entries,
    };
    serde_json::to_string_pretty(&doc).map_err(|e| LedgerError::Render {
        message: e.to_string(),
    })
}

fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

fn render_markdown(ctx: &ExportContext<'_>) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Evidence Ledger: {}", ctx.incident_id)?;
    writeln!(out)?;

    if let Some(inc) = ctx.incident {
        writeln!(out, "| Field | Value |")?;
        writeln!(out, "|---|---|")?;
        writeln!(out, "| Title | {} |", inc.title)?;
        writeln!(out, "| Playbook | {} |", inc.playbook_id)?;
        writeln!(out, "| Severity | {} |", inc.severity)?;
        writeln!(out, "| Status | {} |", inc.status)?;
        writeln!(out, "| Opened by | {} |", inc.created_by)?;
        writeln!(out, "| Opened at | {} |", timestamp::format(&inc.created_at))?;
        writeln!(out)?;
    }

    writeln!(out, "## Integrity")?;
    writeln!(out)?;
    if ctx.report.is_valid {
        writeln!(
            out,
            "Chain verified: {} entries, head `{}`.",
            ctx.report.entries_checked,
            ctx.report.head_hash.as_deref().unwrap_or("-")
        )?;
    } else {
        writeln!(
            out,
            "**CHAIN BROKEN** at entry {}: {}.",
            ctx.report
                .first_invalid_index
                .map_or_else(|| "?".to_string(), |i| i.to_string()),
            ctx.report.reason.as_deref().unwrap_or("unknown reason")
        )?;
    }
    writeln!(out)?;

    writeln!(out, "## Hash Chain")?;
    writeln!(out)?;
    writeln!(out, "| # | Entry | Previous | Hash |")?;
    writeln!(out, "|---|---|---|---|")?;
    for e in ctx.entries {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            e.sequence_number,
            e.entry_id,
            e.previous_hash.as_deref().map_or("GENESIS", short),
            short(&e.entry_hash)
        )?;
    }
    writeln!(out)?;

    writeln!(out, "## Entries")?;
    for e in ctx.entries {
        writeln!(out)?;
        writeln!(
            out,
            "### {}. [{}] {} ({})",
            e.sequence_number,
            e.entry_type,
            e.phase.title(),
            timestamp::format(&e.timestamp)
        )?;
        writeln!(out)?;
        writeln!(out, "{}", e.description)?;
        writeln!(out)?;
        writeln!(out, "- Operator: {}", e.operator)?;
        if !e.tags.is_empty() {
            writeln!(out, "- Tags: {}", e.tags.join(", "))?;
        }
        if !e.related_decisions.is_empty() {
            writeln!(out, "- Decisions: {}", e.related_decisions.join(", "))?;
        }
        for a in &e.artifacts {
            writeln!(
                out,
                "- Artifact: {} ({} bytes, sha256 `{}`)",
                a.filename, a.size_bytes, a.sha256
            )?;
        }
        writeln!(out, "- Hash: `{}`", e.entry_hash)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::{ArtifactRef, EntryDraft, verify_chain};
    use crate::types::{EntryType, Phase};

    fn chain() -> Vec<EvidenceEntry> {
        let first = EvidenceEntry::seal(
            &EntryDraft::new("INC-2026-ABCDEF", EntryType::System, Phase::Detection, "Incident created", "alice"),
            None,
        );
        let second = EvidenceEntry::seal(
            &EntryDraft::new("INC-2026-ABCDEF", EntryType::Artifact, Phase::Detection, "Memory image", "alice")
                .with_tags(["memory"])
                .with_artifacts(vec![ArtifactRef::from_bytes("mem.raw", b"\x00\x01")]),
            Some(&first),
        );
        vec![first, second]
    }

    #[test]
    fn test_markdown_contains_chain_and_status() {
        let entries = chain();
        let report = verify_chain("INC-2026-ABCDEF", &entries);
        let ctx = ExportContext {
            incident_id: "INC-2026-ABCDEF",
            incident: None,
            entries: &entries,
            report: &report,
        };
        let md = render(&ctx, ExportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Evidence Ledger: INC-2026-ABCDEF"));
        assert!(md.contains("Chain verified: 2 entries"));
        assert!(md.contains("| 0 |"));
        assert!(md.contains("GENESIS"));
        assert!(md.contains("Artifact: mem.raw (2 bytes"));
        assert!(md.contains(&entries[1].entry_hash));
    }

    #[test]
    fn test_markdown_reports_broken_chain() {
        let mut entries = chain();
        entries[1].description = "edited".into();
        let report = verify_chain("INC-2026-ABCDEF", &entries);
        let ctx = ExportContext {
            incident_id: "INC-2026-ABCDEF",
            incident: None,
            entries: &entries,
            report: &report,
        };
        let md = render(&ctx, ExportFormat::Markdown).unwrap();
        assert!(md.contains("**CHAIN BROKEN** at entry 1"));
    }

    #[test]
    fn test_json_export_shape() {
        let entries = chain();
        let report = verify_chain("INC-2026-ABCDEF", &entries);
        let ctx = ExportContext {
            incident_id: "INC-2026-ABCDEF",
            incident: None,
            entries: &entries,
            report: &report,
        };
        let json: serde_json::Value =
            serde_json::from_str(&render(&ctx, ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["verification"]["is_valid"], true);
        assert_eq!(json["chain"].as_array().unwrap().len(), 2);
        assert_eq!(json["chain"][0]["previous_hash"], serde_json::Value::Null);
        assert_eq!(json["entries"][1]["entry_type"], "artifact");
    }
}
