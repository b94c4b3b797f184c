//! Configuration system for irflow.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from the user config directory and/or `.irflow/config.toml`
//! in the workspace directory.

use crate::ledger::ExportFormat;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the per-workspace directory holding config and the default database.
pub const WORKSPACE_DIR: &str = ".irflow";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrflowConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub playbooks: PlaybooksConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives the process; useful for dry runs and tests.
    Memory,
    #[default]
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file. Defaults to `.irflow/irflow.db` in the workspace.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self, workspace: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| workspace.join(WORKSPACE_DIR).join("irflow.db"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybooksConfig {
    /// Directory of additional YAML playbooks.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_builtins: bool,
}

impl Default for PlaybooksConfig {
    fn default() -> Self {
        Self {
            directory: None,
            include_builtins: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Refuse to advance or close an incident whose evidence chain fails verification.
    #[serde(default = "default_true")]
    pub verify_chain_before_advance: bool,
    /// Skipped forensic-critical items additionally need a reviewed exception.
    #[serde(default)]
    pub require_forensic_skip_approval: bool,
    /// Operator recorded when none is given explicitly.
    #[serde(default)]
    pub default_operator: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            verify_chain_before_advance: true,
            require_forensic_skip_approval: false,
            default_operator: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub default_format: ExportFormat,
}

fn default_true() -> bool {
    true
}

impl IrflowConfig {
    /// Semantic problems that deserialization cannot catch.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.storage.backend == StorageBackend::Memory && self.storage.path.is_some() {
            warnings.push("storage.path is ignored by the memory backend".to_string());
        }
        if !self.playbooks.include_builtins && self.playbooks.directory.is_none() {
            warnings.push(
                "playbooks.include_builtins is false and no playbooks.directory is set; \
                 no playbooks will be available"
                    .to_string(),
            );
        }
        if self
            .workflow
            .default_operator
            .as_deref()
            .is_some_and(|op| op.trim().is_empty())
        {
            warnings.push("workflow.default_operator is blank".to_string());
        }
        warnings
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "irflow", "irflow")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `IRFLOW_`)
/// 3. Workspace-local config (`.irflow/config.toml`)
/// 4. User config (`<config dir>/irflow/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&IrflowConfig>,
) -> Result<IrflowConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(IrflowConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // IRFLOW_STORAGE__BACKEND, IRFLOW_WORKFLOW__DEFAULT_OPERATOR, ...
    figment = figment.merge(Env::prefixed("IRFLOW_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether any configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    user_config_path().is_some_and(|p| p.exists())
        || workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Write `config` to the workspace config file, replacing it atomically.
///
/// Writes to a `.tmp` sibling and renames over the target, creating
/// `.irflow/` if needed. Returns the path written.
pub fn save_workspace_config(workspace: &Path, config: &IrflowConfig) -> io::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    let body = toml::to_string_pretty(config).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}
