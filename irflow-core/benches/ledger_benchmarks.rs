use criterion::{Criterion, black_box, criterion_group, criterion_main};
use irflow_core::ledger::{ArtifactRef, EntryDraft, EvidenceEntry, verify_chain};
use irflow_core::playbook::builtin_playbooks;
use irflow_core::types::{EntryType, Phase};
use irflow_core::{MemoryStore, NewEvidence, NewIncident, Orchestrator, PlaybookLibrary};
use std::sync::Arc;

const INC: &str = "INC-2026-BE4C40";

fn draft(i: usize) -> EntryDraft {
    EntryDraft::new(
        INC,
        EntryType::Observation,
        Phase::Analysis,
        format!("Observed beacon #{i} to 203.0.113.7:443"),
        "analyst",
    )
    .with_tags(["network", "c2"])
}

fn build_chain(len: usize) -> Vec<EvidenceEntry> {
    let mut chain: Vec<EvidenceEntry> = Vec::with_capacity(len);
    for i in 0..len {
        let entry = EvidenceEntry::seal(&draft(i), chain.last());
        chain.push(entry);
    }
    chain
}

fn bench_entry_hashing(c: &mut Criterion) {
    let plain = EvidenceEntry::seal(&draft(0), None);
    c.bench_function("entry_compute_hash", |b| b.iter(|| black_box(&plain).compute_hash(None)));

    let with_artifacts = draft(1).with_artifacts(
        (0..8)
            .map(|n| ArtifactRef::from_bytes(format!("dump-{n}.bin"), &[n as u8; 64]))
            .collect(),
    );
    c.bench_function("entry_seal_with_artifacts", |b| {
        b.iter(|| EvidenceEntry::seal(black_box(&with_artifacts), Some(&plain)))
    });
}

fn bench_verify_chain(c: &mut Criterion) {
    let small = build_chain(100);
    c.bench_function("verify_chain_100", |b| b.iter(|| verify_chain(INC, black_box(&small))));

    let large = build_chain(1_000);
    c.bench_function("verify_chain_1000", |b| b.iter(|| verify_chain(INC, black_box(&large))));
}

fn bench_evidence_append(c: &mut Criterion) {
    let orch = Orchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(PlaybookLibrary::with_builtins().unwrap()),
        Default::default(),
    );
    let id = orch
        .create_incident(NewIncident::new("Bench incident", "generic", "analyst"))
        .unwrap()
        .incident
        .id;
    c.bench_function("evidence_append_memory", |b| {
        let mut i = 0;
        b.iter(|| {
            i += 1;
            orch.add_evidence(
                &id,
                NewEvidence::new(EntryType::Observation, format!("Observed beacon #{i}"), "analyst")
                    .with_tags(["network", "c2"]),
            )
            .unwrap()
        })
    });
}

fn bench_playbooks(c: &mut Criterion) {
    c.bench_function("playbook_compile_builtins", |b| b.iter(|| builtin_playbooks().unwrap()));

    let orch = Orchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(PlaybookLibrary::with_builtins().unwrap()),
        Default::default(),
    );
    c.bench_function("incident_create_ransomware", |b| {
        b.iter(|| {
            orch.create_incident(NewIncident::new("Bench incident", "ransomware", "analyst"))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_entry_hashing,
    bench_verify_chain,
    bench_evidence_append,
    bench_playbooks,
);
criterion_main!(benches);
