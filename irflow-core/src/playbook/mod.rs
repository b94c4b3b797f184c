//! Playbook definitions: YAML parsing, load-time validation and
//! materialization into per-incident copies.
//!
//! A parsed [`Playbook`] is an immutable template. Incidents never share
//! state with it: [`Playbook::materialize`] clones checklists and decision
//! trees into values owned by the incident.

mod builtins;
mod library;

pub use builtins::{builtin_playbooks, BUILTIN_PLAYBOOKS};
pub use library::{LoadReport, PlaybookLibrary, RejectedPlaybook};

use crate::checklist::{ChecklistItem, ChecklistPhase};
use crate::decision::{DecisionNode, DecisionTree};
use crate::error::PlaybookError;
use crate::types::Phase;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// On-disk playbook document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaybookDocument {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    pub phases: Vec<PhaseSection>,
}

fn default_version() -> String {
    "1.0".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSection {
    pub phase: Phase,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub elements: Vec<PlaybookElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybookElement {
    ChecklistItem(ChecklistItemDef),
    DecisionTree(DecisionTreeDef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChecklistItemDef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub forensic_critical: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionTreeDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gating: bool,
    pub entry_node: String,
    pub nodes: Vec<DecisionNode>,
}

/// A validated, immutable playbook template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: Option<String>,
    pub description: String,
    pub objectives: BTreeMap<Phase, Vec<String>>,
    checklists: BTreeMap<Phase, ChecklistPhase>,
    decision_trees: BTreeMap<String, DecisionTree>,
}

/// Per-incident copies of a playbook's checklists and decision trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub checklists: BTreeMap<Phase, ChecklistPhase>,
    pub decision_trees: BTreeMap<String, DecisionTree>,
}

/// Summary row for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybookSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: Option<String>,
    pub checklist_items: usize,
    pub mandatory_items: usize,
    pub decision_trees: usize,
}

impl Playbook {
    /// Parse and validate a YAML playbook. `source_name` is used in errors.
    pub fn from_yaml(yaml: &str, source_name: &str) -> Result<Self, PlaybookError> {
        let doc: PlaybookDocument =
            serde_yaml::from_str(yaml).map_err(|e| PlaybookError::Parse {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        Self::compile(doc)
    }

    /// Validate a parsed document and build the template.
    pub fn compile(doc: PlaybookDocument) -> Result<Self, PlaybookError> {
        let invalid = |message: String| PlaybookError::Invalid {
            playbook_id: doc.id.clone(),
            message,
        };
        if doc.id.trim().is_empty() {
            return Err(invalid("playbook id must not be empty".into()));
        }

        let mut checklists: BTreeMap<Phase, ChecklistPhase> = Phase::ALL
            .into_iter()
            .map(|p| (p, ChecklistPhase::new(p, Vec::new())))
            .collect();
        let mut objectives = BTreeMap::new();
        let mut decision_trees = BTreeMap::new();
        let mut seen_phases = HashSet::new();
        let mut seen_items = HashSet::new();

        for section in &doc.phases {
            if !seen_phases.insert(section.phase) {
                return Err(invalid(format!("duplicate phase section '{}'", section.phase)));
            }
            objectives.insert(section.phase, section.objectives.clone());

            for element in &section.elements {
                match element {
                    PlaybookElement::ChecklistItem(def) => {
                        if !seen_items.insert(def.id.clone()) {
                            return Err(invalid(format!("duplicate checklist item id '{}'", def.id)));
                        }
                        let mut item = ChecklistItem::new(&def.id, section.phase, &def.title)
                            .depends_on(def.depends_on.iter().cloned());
                        item.description = def.description.clone();
                        item.mandatory = def.mandatory;
                        item.forensic_critical = def.forensic_critical;
                        if let Some(cl) = checklists.get_mut(&section.phase) {
                            cl.items.push(item);
                        }
                    }
                    PlaybookElement::DecisionTree(def) => {
                        if decision_trees.contains_key(&def.id) {
                            return Err(invalid(format!("duplicate decision tree id '{}'", def.id)));
                        }
                        let mut tree = DecisionTree::new(
                            &def.id,
                            &def.name,
                            section.phase,
                            def.nodes.clone(),
                            &def.entry_node,
                        );
                        tree.gating = def.gating;
                        decision_trees.insert(def.id.clone(), tree);
                    }
                }
            }
        }

        for checklist in checklists.values() {
            validate_dependencies(&doc.id, checklist, &seen_items)?;
        }
        for tree in decision_trees.values() {
            validate_tree(&doc.id, tree, &seen_items)?;
        }

        tracing::debug!(
            playbook = %doc.id,
            items = seen_items.len(),
            trees = decision_trees.len(),
            "Playbook compiled"
        );

        Ok(Self {
            id: doc.id,
            name: doc.name,
            version: doc.version,
            category: doc.category,
            description: doc.description,
            objectives,
            checklists,
            decision_trees,
        })
    }

    pub fn checklist(&self, phase: Phase) -> Option<&ChecklistPhase> {
        self.checklists.get(&phase)
    }

    pub fn decision_tree(&self, tree_id: &str) -> Option<&DecisionTree> {
        self.decision_trees.get(tree_id)
    }

    pub fn decision_trees(&self) -> impl Iterator<Item = &DecisionTree> {
        self.decision_trees.values()
    }

    /// Fresh, incident-owned copies of every checklist and decision tree.
    pub fn materialize(&self) -> Materialized {
        Materialized {
            checklists: self.checklists.clone(),
            decision_trees: self.decision_trees.clone(),
        }
    }

    pub fn summary(&self) -> PlaybookSummary {
        let items = self.checklists.values().flat_map(|c| &c.items);
        PlaybookSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            category: self.category.clone(),
            checklist_items: items.clone().count(),
            mandatory_items: items.filter(|i| i.mandatory).count(),
            decision_trees: self.decision_trees.len(),
        }
    }
}

/// depends_on must name known items in the same phase and form a DAG.
fn validate_dependencies(
    playbook_id: &str,
    checklist: &ChecklistPhase,
    known_items: &HashSet<String>,
) -> Result<(), PlaybookError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let index: HashMap<&str, NodeIndex> = checklist
        .items
        .iter()
        .map(|i| (i.id.as_str(), graph.add_node(i.id.as_str())))
        .collect();

    for item in &checklist.items {
        for dep in &item.depends_on {
            let Some(&from) = index.get(dep.as_str()) else {
                let message = if known_items.contains(dep) {
                    format!(
                        "item '{}' depends on '{}' from another phase; dependencies must stay within {}",
                        item.id, dep, checklist.phase
                    )
                } else {
                    format!("item '{}' depends on unknown item '{}'", item.id, dep)
                };
                return Err(PlaybookError::Invalid {
                    playbook_id: playbook_id.to_string(),
                    message,
                });
            };
            graph.add_edge(from, index[item.id.as_str()], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| PlaybookError::Cycle {
        playbook_id: playbook_id.to_string(),
        element_id: graph[cycle.node_id()].to_string(),
    })?;
    Ok(())
}

fn validate_tree(
    playbook_id: &str,
    tree: &DecisionTree,
    known_items: &HashSet<String>,
) -> Result<(), PlaybookError> {
    let invalid = |message: String| PlaybookError::Invalid {
        playbook_id: playbook_id.to_string(),
        message: format!("decision tree '{}': {message}", tree.id),
    };

    if tree.nodes.is_empty() {
        return Err(invalid("has no nodes".into()));
    }
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &tree.nodes {
        if index.insert(&node.id, graph.add_node(&node.id)).is_some() {
            return Err(invalid(format!("duplicate node id '{}'", node.id)));
        }
    }
    if !index.contains_key(tree.entry_node_id.as_str()) {
        return Err(invalid(format!("entry node '{}' does not exist", tree.entry_node_id)));
    }

    for node in &tree.nodes {
        if node.options.is_empty() {
            return Err(invalid(format!("node '{}' has no options", node.id)));
        }
        let mut option_ids = HashSet::new();
        for option in &node.options {
            if !option_ids.insert(option.id.as_str()) {
                return Err(invalid(format!(
                    "node '{}' has duplicate option '{}'",
                    node.id, option.id
                )));
            }
            if let Some(next) = &option.next_node {
                let Some(&to) = index.get(next.as_str()) else {
                    return Err(invalid(format!(
                        "option '{}' of node '{}' points to missing node '{}'",
                        option.id, node.id, next
                    )));
                };
                graph.add_edge(index[node.id.as_str()], to, ());
            }
        }
        for item in &node.requires_checklist_items {
            if !known_items.contains(item) {
                return Err(invalid(format!(
                    "node '{}' requires unknown checklist item '{}'",
                    node.id, item
                )));
            }
        }
        for req in &node.requires_decisions {
            let Some(target) = tree.node(&req.node) else {
                return Err(invalid(format!(
                    "node '{}' requires a decision at unknown node '{}'",
                    node.id, req.node
                )));
            };
            if let Some(option) = &req.option
                && target.option(option).is_none()
            {
                return Err(invalid(format!(
                    "node '{}' requires unknown option '{}' at node '{}'",
                    node.id, option, req.node
                )));
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| PlaybookError::Cycle {
        playbook_id: playbook_id.to_string(),
        element_id: format!("{}/{}", tree.id, graph[cycle.node_id()]),
    })?;
    Ok(())
}
