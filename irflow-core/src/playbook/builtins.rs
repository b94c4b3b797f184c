//! Playbooks shipped with irflow.
//!
//! The YAML sources live under `irflow-core/playbooks/` and are embedded at
//! compile time, so they are parsed and validated by the same path as
//! user-supplied playbooks.

use super::Playbook;
use crate::error::PlaybookError;

/// `(id, yaml)` for every built-in playbook.
pub const BUILTIN_PLAYBOOKS: &[(&str, &str)] = &[
    ("ransomware", include_str!("../../playbooks/ransomware.yaml")),
    ("generic", include_str!("../../playbooks/generic.yaml")),
];

/// Parse every built-in playbook.
pub fn builtin_playbooks() -> Result<Vec<Playbook>, PlaybookError> {
    BUILTIN_PLAYBOOKS
        .iter()
        .map(|(id, yaml)| Playbook::from_yaml(yaml, &format!("builtin:{id}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;

    #[test]
    fn test_builtins_parse_and_validate() {
        let playbooks = builtin_playbooks().unwrap();
        assert_eq!(playbooks.len(), BUILTIN_PLAYBOOKS.len());
        for (pb, (id, _)) in playbooks.iter().zip(BUILTIN_PLAYBOOKS) {
            assert_eq!(&pb.id, id);
        }
    }

    #[test]
    fn test_ransomware_detection_has_mandatory_confirmation() {
        let pb = builtin_playbooks()
            .unwrap()
            .into_iter()
            .find(|p| p.id == "ransomware")
            .unwrap();
        let det = pb.checklist(Phase::Detection).unwrap();
        let item = det
            .items
            .iter()
            .find(|i| i.title == "Confirm ransomware indicators present")
            .unwrap();
        assert!(item.mandatory);
    }

    #[test]
    fn test_every_phase_has_items() {
        for pb in builtin_playbooks().unwrap() {
            for phase in Phase::ALL {
                assert!(
                    !pb.checklist(phase).unwrap().items.is_empty(),
                    "{} has no {} items",
                    pb.id,
                    phase
                );
            }
        }
    }
}
