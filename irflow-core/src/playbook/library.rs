//! The set of playbooks available to the orchestrator.

use super::{Playbook, PlaybookSummary, builtin_playbooks};
use crate::config::PlaybooksConfig;
use crate::error::PlaybookError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<PlaybookLibrary>> = OnceLock::new();

/// A playbook file that failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedPlaybook {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of loading a directory. One bad file never prevents the others
/// from loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<RejectedPlaybook>,
}

/// Immutable playbook templates keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PlaybookLibrary {
    playbooks: BTreeMap<String, Arc<Playbook>>,
}

impl PlaybookLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding only the built-in playbooks.
    pub fn with_builtins() -> Result<Self, PlaybookError> {
        let mut lib = Self::new();
        for pb in builtin_playbooks()? {
            lib.insert(pb);
        }
        Ok(lib)
    }

    /// Build a library as configured: built-ins first, then the playbook
    /// directory, whose entries override built-ins with the same id.
    pub fn from_config(config: &PlaybooksConfig) -> Result<(Self, LoadReport), PlaybookError> {
        let mut lib = if config.include_builtins {
            Self::with_builtins()?
        } else {
            Self::new()
        };
        let report = match &config.directory {
            Some(dir) if dir.is_dir() => lib.load_dir(dir)?,
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "Playbook directory does not exist, skipping");
                LoadReport::default()
            }
            None => LoadReport::default(),
        };
        Ok((lib, report))
    }

    /// Add or replace a playbook.
    pub fn insert(&mut self, playbook: Playbook) -> Option<Arc<Playbook>> {
        let id = playbook.id.clone();
        let previous = self.playbooks.insert(id.clone(), Arc::new(playbook));
        if previous.is_some() {
            tracing::info!(playbook = %id, "Replaced existing playbook definition");
        }
        previous
    }

    pub fn get(&self, playbook_id: &str) -> Result<Arc<Playbook>, PlaybookError> {
        self.playbooks
            .get(playbook_id)
            .cloned()
            .ok_or_else(|| PlaybookError::NotFound {
                playbook_id: playbook_id.to_string(),
            })
    }

    pub fn contains(&self, playbook_id: &str) -> bool {
        self.playbooks.contains_key(playbook_id)
    }

    pub fn len(&self) -> usize {
        self.playbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playbooks.is_empty()
    }

    pub fn list(&self) -> Vec<PlaybookSummary> {
        self.playbooks.values().map(|p| p.summary()).collect()
    }

    /// Read and validate a single playbook file.
    pub fn load_file(path: &Path) -> Result<Playbook, PlaybookError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| PlaybookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Playbook::from_yaml(&yaml, &path.display().to_string())
    }

    /// Load every `*.yaml`/`*.yml` file in `dir`, in name order.
    ///
    /// Invalid playbooks are logged and reported but do not abort the load;
    /// only failing to read the directory itself is an error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<LoadReport, PlaybookError> {
        let read_dir = std::fs::read_dir(dir).map_err(|source| PlaybookError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            })
            .collect();
        paths.sort();

        let mut report = LoadReport::default();
        for path in paths {
            match Self::load_file(&path) {
                Ok(pb) => {
                    report.loaded.push(pb.id.clone());
                    self.insert(pb);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Rejected playbook");
                    report.rejected.push(RejectedPlaybook {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            dir = %dir.display(),
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            "Loaded playbook directory"
        );
        Ok(report)
    }

    /// Install the process-wide library. Returns the library back if one was
    /// already installed.
    pub fn init_global(library: Arc<PlaybookLibrary>) -> Result<(), Arc<PlaybookLibrary>> {
        GLOBAL.set(library)
    }

    /// The process-wide library, if [`init_global`](Self::init_global) ran.
    pub fn global() -> Option<Arc<PlaybookLibrary>> {
        GLOBAL.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CUSTOM: &str = r#"
id: phishing
name: Phishing
phases:
  - phase: detection
    elements:
      - kind: checklist_item
        id: ph-1
        title: Retrieve reported message
        mandatory: true
"#;

    #[test]
    fn test_with_builtins() {
        let lib = PlaybookLibrary::with_builtins().unwrap();
        assert!(lib.contains("ransomware"));
        assert!(lib.contains("generic"));
        assert_eq!(lib.list().len(), 2);
    }

    #[test]
    fn test_get_unknown() {
        let lib = PlaybookLibrary::new();
        assert!(lib.is_empty());
        assert!(matches!(
            lib.get("nope"),
            Err(PlaybookError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_dir_isolates_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a-phishing.yaml"), CUSTOM).unwrap();
        std::fs::write(dir.path().join("b-broken.yml"), "id: [").unwrap();
        std::fs::write(
            dir.path().join("c-cycle.yaml"),
            r#"
id: cyclic
name: Cyclic
phases:
  - phase: detection
    elements:
      - kind: checklist_item
        id: x
        title: X
        depends_on: [y]
      - kind: checklist_item
        id: y
        title: Y
        depends_on: [x]
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut lib = PlaybookLibrary::new();
        let report = lib.load_dir(dir.path()).unwrap();
        assert_eq!(report.loaded, vec!["phishing".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert!(lib.contains("phishing"));
        assert!(!lib.contains("cyclic"));
    }

    #[test]
    fn test_load_dir_missing() {
        let mut lib = PlaybookLibrary::new();
        assert!(matches!(
            lib.load_dir(Path::new("/definitely/not/here")),
            Err(PlaybookError::Io { .. })
        ));
    }

    #[test]
    fn test_from_config_overrides_builtin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("generic.yaml"),
            CUSTOM.replace("id: phishing", "id: generic"),
        )
        .unwrap();
        let config = PlaybooksConfig {
            directory: Some(dir.path().to_path_buf()),
            include_builtins: true,
        };
        let (lib, report) = PlaybookLibrary::from_config(&config).unwrap();
        assert_eq!(report.loaded, vec!["generic".to_string()]);
        assert_eq!(lib.get("generic").unwrap().name, "Phishing");
        assert!(lib.contains("ransomware"));
    }

    #[test]
    fn test_from_config_without_builtins() {
        let config = PlaybooksConfig {
            directory: None,
            include_builtins: false,
        };
        let (lib, report) = PlaybookLibrary::from_config(&config).unwrap();
        assert!(lib.is_empty());
        assert_eq!(report, LoadReport::default());
    }
}
