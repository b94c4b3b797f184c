//! Property-based tests for the ledger, checklists and phase tracker.

use proptest::prelude::*;

use irflow_core::checklist::{ChecklistItem, ChecklistPhase, ItemStatus};
use irflow_core::ledger::{EntryDraft, EvidenceEntry, verify_chain};
use irflow_core::phase::{IncidentPhaseTracker, PhaseStatus};
use irflow_core::types::{EntryType, Phase};
use irflow_core::{MemoryStore, NewEvidence, NewIncident, Orchestrator, PlaybookLibrary};
use std::sync::Arc;

const INC: &str = "INC-2026-ABC123";

fn entry_type(n: u8) -> EntryType {
    match n % 5 {
        0 => EntryType::Observation,
        1 => EntryType::Action,
        2 => EntryType::Decision,
        3 => EntryType::Artifact,
        _ => EntryType::Note,
    }
}

fn build_chain(descriptions: &[String]) -> Vec<EvidenceEntry> {
    let mut chain: Vec<EvidenceEntry> = Vec::new();
    for (i, d) in descriptions.iter().enumerate() {
        let draft = EntryDraft::new(INC, entry_type(i as u8), Phase::Detection, d.as_str(), "alice");
        let entry = EvidenceEntry::seal(&draft, chain.last());
        chain.push(entry);
    }
    chain
}

// --- Ledger properties ---

proptest! {
    #[test]
    fn chain_of_any_length_verifies(descriptions in prop::collection::vec("[ -~]{1,40}", 1..30)) {
        let chain = build_chain(&descriptions);
        let report = verify_chain(INC, &chain);
        prop_assert!(report.is_valid);
        prop_assert_eq!(report.entries_checked, chain.len());
        prop_assert!(chain[0].previous_hash.is_none());
        for (i, e) in chain.iter().enumerate() {
            prop_assert_eq!(e.sequence_number, i as u64);
        }
    }

    #[test]
    fn verification_is_idempotent(descriptions in prop::collection::vec("[a-z]{1,12}", 1..15)) {
        let chain = build_chain(&descriptions);
        prop_assert_eq!(verify_chain(INC, &chain), verify_chain(INC, &chain));
    }

    #[test]
    fn tampered_description_is_located(
        descriptions in prop::collection::vec("[a-z]{1,12}", 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut chain = build_chain(&descriptions);
        let idx = pick.index(chain.len());
        chain[idx].description.push_str(" (edited)");

        let report = verify_chain(INC, &chain);
        prop_assert!(!report.is_valid);
        prop_assert_eq!(report.first_invalid_index, Some(idx as u64));
    }

    #[test]
    fn removed_entry_breaks_the_chain(
        descriptions in prop::collection::vec("[a-z]{1,12}", 2..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut chain = build_chain(&descriptions);
        let idx = pick.index(chain.len() - 1);
        chain.remove(idx);
        prop_assert!(!verify_chain(INC, &chain).is_valid);
    }
}

// --- Checklist properties ---

#[derive(Debug, Clone)]
enum ItemOp {
    Start(usize),
    Complete(usize),
    Skip(usize),
    NotApplicable(usize),
}

fn item_op() -> impl Strategy<Value = ItemOp> {
    prop_oneof![
        (0usize..8).prop_map(ItemOp::Start),
        (0usize..8).prop_map(ItemOp::Complete),
        (0usize..8).prop_map(ItemOp::Skip),
        (0usize..8).prop_map(ItemOp::NotApplicable),
    ]
}

/// Eight items; item `i` may depend on any earlier item.
fn checklist_strategy() -> impl Strategy<Value = ChecklistPhase> {
    prop::collection::vec((any::<bool>(), any::<bool>(), prop::option::of(0usize..8)), 8).prop_map(
        |specs| {
            let items = specs
                .into_iter()
                .enumerate()
                .map(|(i, (mandatory, forensic, dep))| {
                    let mut item = ChecklistItem::new(format!("it-{i}"), Phase::Detection, format!("Item {i}"));
                    if mandatory {
                        item = item.mandatory();
                    }
                    if forensic {
                        item = item.forensic_critical();
                    }
                    match dep {
                        Some(d) if d < i => item.depends_on([format!("it-{d}")]),
                        _ => item,
                    }
                })
                .collect();
            ChecklistPhase::new(Phase::Detection, items)
        },
    )
}

fn apply(checklist: &mut ChecklistPhase, op: &ItemOp) {
    let id = |i: &usize| format!("it-{i}");
    // Refused operations are part of the property; their errors are ignored.
    let _ = match op {
        ItemOp::Start(i) => checklist.start(&id(i), "alice").map(|_| ()),
        ItemOp::Complete(i) => checklist.complete(&id(i), "alice", None).map(|_| ()),
        ItemOp::Skip(i) => checklist.skip(&id(i), "alice", "not needed").map(|_| ()),
        ItemOp::NotApplicable(i) => checklist
            .mark_not_applicable(&id(i), "alice", "out of scope")
            .map(|_| ()),
    };
}

proptest! {
    #[test]
    fn mandatory_items_are_never_skipped(
        mut checklist in checklist_strategy(),
        ops in prop::collection::vec(item_op(), 0..40),
    ) {
        for op in &ops {
            apply(&mut checklist, op);
        }
        for item in checklist.items.iter().filter(|i| i.mandatory) {
            prop_assert!(!matches!(item.status, ItemStatus::Skipped | ItemStatus::NotApplicable));
        }
    }

    #[test]
    fn completed_items_have_resolved_dependencies(
        mut checklist in checklist_strategy(),
        ops in prop::collection::vec(item_op(), 0..40),
    ) {
        for op in &ops {
            apply(&mut checklist, op);
        }
        for item in checklist.items.iter().filter(|i| i.status == ItemStatus::Completed) {
            for dep in &item.depends_on {
                prop_assert!(checklist.get(dep).unwrap().status.is_terminal());
            }
        }
    }

    #[test]
    fn available_items_are_open_and_unblocked(
        mut checklist in checklist_strategy(),
        ops in prop::collection::vec(item_op(), 0..40),
    ) {
        for op in &ops {
            apply(&mut checklist, op);
        }
        let available: Vec<String> = checklist.available_items().iter().map(|i| i.id.clone()).collect();
        let blocked: Vec<String> = checklist.blocked_items().into_iter().map(|b| b.item_id).collect();
        for id in &available {
            prop_assert!(!blocked.contains(id));
            let item = checklist.get(id).unwrap();
            prop_assert!(!item.status.is_terminal());
        }
    }

    #[test]
    fn cannot_advance_with_incomplete_mandatory_items(
        mut checklist in checklist_strategy(),
        ops in prop::collection::vec(item_op(), 0..40),
    ) {
        for op in &ops {
            apply(&mut checklist, op);
        }
        let incomplete = checklist
            .items
            .iter()
            .any(|i| i.mandatory && i.status != ItemStatus::Completed);
        if incomplete {
            prop_assert!(!checklist.can_advance(false));
            prop_assert!(!checklist.can_advance(true));
        }
        prop_assert_eq!(checklist.progress().mandatory_remaining == 0, !incomplete);
    }
}

// --- Phase tracker properties ---

proptest! {
    #[test]
    fn advancing_visits_phases_in_order(skips in prop::collection::vec(any::<bool>(), 4)) {
        let mut tracker = IncidentPhaseTracker::new();
        tracker.start(Phase::Detection).unwrap();
        // Analysis through recovery may be skipped.
        for (phase, skip) in Phase::ALL[1..5].iter().zip(&skips) {
            if *skip {
                tracker.skip(*phase, "not required").unwrap();
            }
        }

        let mut visited = vec![tracker.current_phase];
        while !tracker.current_phase.is_last() {
            let t = tracker.advance(None).unwrap();
            prop_assert!(t.to > t.from);
            visited.push(t.to);
        }
        for window in visited.windows(2) {
            for between in Phase::ALL.iter().filter(|p| **p > window[0] && **p < window[1]) {
                prop_assert_eq!(tracker.status(*between), PhaseStatus::Skipped);
            }
        }
        prop_assert_eq!(tracker.active_phase(), Some(Phase::PostIncident));
    }
}

// --- Orchestrator properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_append_extends_a_valid_chain(notes in prop::collection::vec("[a-z ]{1,24}", 1..12)) {
        let orch = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PlaybookLibrary::with_builtins().unwrap()),
            Default::default(),
        );
        let id = orch
            .create_incident(NewIncident::new("Phishing wave", "generic", "alice"))
            .unwrap()
            .incident
            .id;
        for (i, text) in notes.iter().enumerate() {
            let text = format!("{i}: {text}");
            orch.add_evidence(&id, NewEvidence::new(entry_type(i as u8), text, "alice")).unwrap();
        }
        let report = orch.verify(&id).unwrap();
        prop_assert!(report.is_valid);
        prop_assert_eq!(report.entries_checked, notes.len() + 1);
    }
}
