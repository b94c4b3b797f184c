//! Text rendering for workflow values.

use irflow_core::checklist::ChecklistProgress;
use irflow_core::phase::PhaseStatus;
use irflow_core::{
    AdvanceCheck, ChecklistItem, ChecklistPhase, DecisionNode, DecisionTree, Incident,
    IncidentPhaseTracker, ItemStatus, VerificationReport,
};
use serde::Serialize;

/// Pretty-print any serializable value as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_marker(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::NotStarted => "[ ]",
        ItemStatus::InProgress => "[~]",
        ItemStatus::Completed => "[x]",
        ItemStatus::Skipped => "[-]",
        ItemStatus::NotApplicable => "[n/a]",
    }
}

fn phase_marker(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::NotStarted => " ",
        PhaseStatus::InProgress => ">",
        PhaseStatus::Completed => "x",
        PhaseStatus::Skipped => "-",
    }
}

pub fn incident_line(incident: &Incident) {
    println!(
        "  {}  {:<10} {:<9} {:<12} {}",
        incident.id,
        incident.status.to_string(),
        incident.severity.to_string(),
        incident.playbook_id,
        incident.title
    );
}

pub fn incident_header(incident: &Incident) {
    println!("{}: {}", incident.id, incident.title);
    println!("  Status:    {}", incident.status);
    println!("  Severity:  {}", incident.severity);
    println!("  Playbook:  {}", incident.playbook_id);
    println!(
        "  Opened:    {} by {}",
        irflow_core::timestamp::format(&incident.created_at),
        incident.created_by
    );
    if !incident.description.is_empty() {
        println!("  {}", incident.description);
    }
}

pub fn tracker(tracker: &IncidentPhaseTracker) {
    for p in &tracker.phases {
        let mut line = format!("  [{}] {:<15} {}", phase_marker(p.status), p.phase.title(), p.status);
        if let Some(d) = p.duration() {
            line.push_str(&format!(" ({}m)", d.num_minutes()));
        }
        if let Some(reason) = &p.skip_reason {
            line.push_str(&format!(" - {reason}"));
        }
        println!("{line}");
    }
}

fn item_line(item: &ChecklistItem) {
    let mut flags = Vec::new();
    if item.mandatory {
        flags.push("mandatory");
    }
    if item.forensic_critical {
        flags.push("forensic");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" ({})", flags.join(", "))
    };
    println!("  {:<5} {:<12} {}{}", status_marker(item.status), item.id, item.title, flags);
    if !item.depends_on.is_empty() && item.status == ItemStatus::NotStarted {
        println!("        after: {}", item.depends_on.join(", "));
    }
    if let Some(reason) = &item.skip_reason {
        println!("        reason: {reason}");
    }
    if let Some(approver) = &item.exception_approved_by {
        println!("        exception approved by {approver}");
    }
}

pub fn checklist(checklist: &ChecklistPhase) {
    println!("{} checklist:", checklist.phase.title());
    if checklist.items.is_empty() {
        println!("  (no items)");
    }
    for item in &checklist.items {
        item_line(item);
    }
}

pub fn progress(p: &ChecklistProgress) {
    println!(
        "{}: {}/{} resolved ({:.1}%), {} completed, {} in progress, {} skipped, {} n/a",
        p.phase.title(),
        p.resolved,
        p.total,
        p.percentage,
        p.completed,
        p.in_progress,
        p.skipped,
        p.not_applicable
    );
    if p.mandatory_remaining > 0 {
        println!("  {} mandatory item(s) remaining", p.mandatory_remaining);
    }
}

pub fn tree_line(tree: &DecisionTree) {
    let state = match tree.current_node() {
        None => "complete".to_string(),
        Some(node) => format!("at '{}'", node.id),
    };
    println!(
        "  {:<22} {:<14} {}{}",
        tree.id,
        tree.phase.title(),
        state,
        if tree.gating { " (gating)" } else { "" }
    );
}

pub fn decision_node(tree: &DecisionTree, node: &DecisionNode) {
    println!("{} / {}", tree.name, node.id);
    println!("  {}", node.question);
    if let Some(guidance) = &node.guidance {
        println!("  {guidance}");
    }
    for option in &node.options {
        let mut notes = vec![option.confidence.to_string()];
        if option.recommended {
            notes.push("recommended".into());
        }
        if option.requires_confirmation {
            notes.push("needs confirmation".into());
        }
        if option.modifies_evidence {
            notes.push("MODIFIES EVIDENCE".into());
        }
        if let Some(next) = option.next_phase {
            notes.push(format!("then {next}"));
        }
        println!("    {:<18} {} [{}]", option.id, option.label, notes.join(", "));
    }
    for step in &tree.path_taken {
        println!(
            "  chose '{}' at '{}' ({})",
            step.selected_option_id, step.node_id, step.operator
        );
    }
}

pub fn advance_check(check: &AdvanceCheck) {
    if check.can_advance {
        println!("{} can advance.", check.phase.title());
        return;
    }
    println!("{} cannot advance:", check.phase.title());
    for blocker in &check.blockers {
        println!("  - {blocker}");
    }
}

pub fn verification(report: &VerificationReport) {
    if report.is_valid {
        println!(
            "Chain intact: {} entries verified, head {}",
            report.entries_checked,
            report.head_hash.as_deref().unwrap_or("-")
        );
    } else {
        println!(
            "CHAIN BROKEN at entry {}: {}",
            report
                .first_invalid_index
                .map_or_else(|| "?".to_string(), |i| i.to_string()),
            report.reason.as_deref().unwrap_or("unknown reason")
        );
    }
}
