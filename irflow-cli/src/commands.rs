//! CLI subcommand handlers.

use crate::output;
use crate::{
    ChecklistAction, Commands, ConfigAction, DecisionAction, EvidenceAction, IncidentAction,
    PhaseAction, PlaybookAction,
};
use dialoguer::Confirm;
use irflow_core::config::{self, IrflowConfig};
use irflow_core::error::{DecisionError, WorkflowError};
use irflow_core::playbook::PlaybookLibrary;
use irflow_core::{
    ArtifactRef, EntryType, EvidenceFilter, ExportFormat, IrflowError, NewEvidence, NewIncident,
    Orchestrator, Phase, RecordDecision, Severity,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Options shared by every subcommand.
pub struct Context {
    pub workspace: PathBuf,
    pub operator: Option<String>,
    pub json: bool,
}

impl Context {
    fn config(&self) -> anyhow::Result<IrflowConfig> {
        let config = config::load_config(Some(&self.workspace), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
        for warning in config.validate() {
            tracing::warn!("{warning}");
        }
        Ok(config)
    }

    /// Open the workspace store and playbook library.
    fn open(&self) -> anyhow::Result<(Orchestrator, IrflowConfig)> {
        let config = self.config()?;
        let (orch, report) = Orchestrator::from_config(&config, &self.workspace)?;
        for rejected in &report.rejected {
            eprintln!(
                "warning: playbook {} was not loaded: {}",
                rejected.path.display(),
                rejected.error
            );
        }
        Ok((orch, config))
    }

    /// `--operator`, then `workflow.default_operator`, then the login name.
    fn operator(&self, config: &IrflowConfig) -> anyhow::Result<String> {
        self.operator
            .clone()
            .or_else(|| config.workflow.default_operator.clone())
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|op| !op.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No operator given. Pass --operator or set workflow.default_operator."
                )
            })
    }
}

fn parse_phase(value: Option<&str>, orch: &Orchestrator, incident_id: &str) -> anyhow::Result<Phase> {
    match value {
        Some(v) => Ok(v.parse::<Phase>()?),
        None => Ok(orch.state(incident_id)?.current_phase()),
    }
}

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, ctx),
        Commands::Playbook { action } => handle_playbook(action, ctx),
        Commands::Incident { action } => handle_incident(action, ctx),
        Commands::Checklist { action } => handle_checklist(action, ctx),
        Commands::Decision { action } => handle_decision(action, ctx),
        Commands::Evidence { action } => handle_evidence(action, ctx),
        Commands::Phase { action } => handle_phase(action, ctx),
    }
}

fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = config::workspace_config_path(&ctx.workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = config::save_workspace_config(&ctx.workspace, &IrflowConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.config()?;
            if ctx.json {
                return output::print_json(&config);
            }
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn handle_playbook(action: PlaybookAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        PlaybookAction::List => {
            let (orch, _) = ctx.open()?;
            let playbooks = orch.playbooks().list();
            if ctx.json {
                return output::print_json(&playbooks);
            }
            if playbooks.is_empty() {
                println!("No playbooks available.");
                return Ok(());
            }
            println!("Available playbooks ({}):", playbooks.len());
            for pb in &playbooks {
                println!(
                    "  {:<14} v{:<6} {} ({} items, {} mandatory, {} decision trees)",
                    pb.id, pb.version, pb.name, pb.checklist_items, pb.mandatory_items, pb.decision_trees
                );
            }
            Ok(())
        }
        PlaybookAction::Show { id } => {
            let (orch, _) = ctx.open()?;
            let playbook = orch.playbooks().get(&id)?;
            if ctx.json {
                let materialized = playbook.materialize();
                return output::print_json(&serde_json::json!({
                    "summary": playbook.summary(),
                    "description": playbook.description,
                    "objectives": playbook.objectives,
                    "checklists": materialized.checklists,
                    "decision_trees": materialized.decision_trees,
                }));
            }
            println!("{} ({} v{})", playbook.name, playbook.id, playbook.version);
            if !playbook.description.is_empty() {
                println!("{}", playbook.description.trim());
            }
            for phase in Phase::ALL {
                println!();
                for objective in playbook.objectives.get(&phase).into_iter().flatten() {
                    println!("  objective: {objective}");
                }
                if let Some(checklist) = playbook.checklist(phase) {
                    output::checklist(checklist);
                }
            }
            println!();
            println!("Decision trees:");
            for tree in playbook.decision_trees() {
                output::tree_line(tree);
            }
            Ok(())
        }
        PlaybookAction::Validate { path } => {
            let playbook = PlaybookLibrary::load_file(&path)?;
            let summary = playbook.summary();
            if ctx.json {
                return output::print_json(&summary);
            }
            println!(
                "Playbook '{}' v{} is valid: {} items ({} mandatory), {} decision trees.",
                summary.id,
                summary.version,
                summary.checklist_items,
                summary.mandatory_items,
                summary.decision_trees
            );
            Ok(())
        }
    }
}

fn handle_incident(action: IncidentAction, ctx: &Context) -> anyhow::Result<()> {
    let (orch, config) = ctx.open()?;
    match action {
        IncidentAction::Create {
            title,
            playbook,
            severity,
            description,
            draft,
        } => {
            let operator = ctx.operator(&config)?;
            let mut request = NewIncident::new(title, playbook, operator)
                .with_severity(severity.parse::<Severity>()?);
            if let Some(description) = description {
                request = request.with_description(description);
            }
            if draft {
                request = request.as_draft();
            }
            let state = orch.create_incident(request)?;
            if ctx.json {
                return output::print_json(&state.incident);
            }
            println!("Created incident {}", state.incident.id);
            output::incident_header(&state.incident);
            Ok(())
        }
        IncidentAction::List => {
            let incidents = orch.list_incidents()?;
            if ctx.json {
                return output::print_json(&incidents);
            }
            if incidents.is_empty() {
                println!("No incidents recorded in this workspace.");
                return Ok(());
            }
            println!("Incidents ({}):", incidents.len());
            for incident in &incidents {
                output::incident_line(incident);
            }
            Ok(())
        }
        IncidentAction::Show { id } => {
            let state = orch.state(&id)?;
            if ctx.json {
                return output::print_json(&state);
            }
            output::incident_header(&state.incident);
            println!();
            println!("Phases:");
            output::tracker(&state.tracker);
            println!();
            for checklist in state.checklists.values() {
                output::progress(&checklist.progress());
            }
            Ok(())
        }
        IncidentAction::Activate { id } => {
            let operator = ctx.operator(&config)?;
            let incident = orch.activate_incident(&id, &operator)?;
            if ctx.json {
                return output::print_json(&incident);
            }
            println!("Incident {} is now {}; detection started.", incident.id, incident.status);
            Ok(())
        }
        IncidentAction::Close { id, notes } => {
            let operator = ctx.operator(&config)?;
            let incident = orch.close_incident(&id, &operator, notes.as_deref())?;
            if ctx.json {
                return output::print_json(&incident);
            }
            println!("Incident {} closed.", incident.id);
            Ok(())
        }
    }
}

fn handle_checklist(action: ChecklistAction, ctx: &Context) -> anyhow::Result<()> {
    let (orch, config) = ctx.open()?;
    let item = match action {
        ChecklistAction::Show { id, phase } => {
            let phase = parse_phase(phase.as_deref(), &orch, &id)?;
            let checklist = orch.checklist(&id, phase)?;
            if ctx.json {
                return output::print_json(&checklist);
            }
            output::checklist(&checklist);
            let available = orch.available_items(&id, phase)?;
            if !available.is_empty() {
                let ids: Vec<&str> = available.iter().map(|i| i.id.as_str()).collect();
                println!("Available now: {}", ids.join(", "));
            }
            return Ok(());
        }
        ChecklistAction::Progress { id, phase } => {
            let phase = parse_phase(phase.as_deref(), &orch, &id)?;
            let progress = orch.progress(&id, phase)?;
            if ctx.json {
                return output::print_json(&progress);
            }
            output::progress(&progress);
            for blocked in orch.blocked_items(&id, phase)? {
                println!("  {} waits on {}", blocked.item_id, blocked.waiting_on.join(", "));
            }
            return Ok(());
        }
        ChecklistAction::Start { id, item } => {
            orch.start_item(&id, &item, &ctx.operator(&config)?)?
        }
        ChecklistAction::Complete { id, item, notes } => {
            orch.complete_item(&id, &item, &ctx.operator(&config)?, notes.as_deref())?
        }
        ChecklistAction::Skip { id, item, reason } => {
            orch.skip_item(&id, &item, &ctx.operator(&config)?, &reason)?
        }
        ChecklistAction::Na { id, item, reason } => {
            orch.mark_not_applicable(&id, &item, &ctx.operator(&config)?, &reason)?
        }
        ChecklistAction::Approve { id, item } => {
            orch.approve_skip_exception(&id, &item, &ctx.operator(&config)?)?
        }
    };
    if ctx.json {
        return output::print_json(&item);
    }
    println!("{} {}: {}", item.id, item.status, item.title);
    Ok(())
}

fn confirm_option(prompt: &str) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn handle_decision(action: DecisionAction, ctx: &Context) -> anyhow::Result<()> {
    let (orch, config) = ctx.open()?;
    match action {
        DecisionAction::Show { id, tree: None } => {
            let state = orch.state(&id)?;
            if ctx.json {
                return output::print_json(&state.decision_trees);
            }
            println!("Decision trees for {id}:");
            for tree in state.decision_trees.values() {
                output::tree_line(tree);
            }
            Ok(())
        }
        DecisionAction::Show { id, tree: Some(tree_id) } => {
            let state = orch.state(&id)?;
            let tree = state.tree(&tree_id)?;
            let availability = orch.decision_availability(&id, &tree_id)?;
            if ctx.json {
                return output::print_json(&serde_json::json!({
                    "tree": tree,
                    "current_node": tree.current_node(),
                    "availability": availability,
                }));
            }
            match tree.current_node() {
                None => println!("Decision tree '{}' is complete.", tree.id),
                Some(node) => output::decision_node(tree, node),
            }
            if let Some(a) = availability.filter(|a| !a.available) {
                let waiting: Vec<String> = a.missing_items.into_iter().chain(a.missing_decisions).collect();
                println!("  not yet available; waiting on {}", waiting.join(", "));
            }
            Ok(())
        }
        DecisionAction::Record {
            id,
            tree,
            option,
            rationale,
            yes,
        } => {
            let operator = ctx.operator(&config)?;
            let mut request = RecordDecision::new(option, operator);
            if let Some(rationale) = rationale {
                request = request.with_rationale(rationale);
            }
            if yes {
                request = request.confirmed();
            }
            let path = match orch.record_decision(&id, &tree, request.clone()) {
                Err(IrflowError::Decision(DecisionError::ConfirmationRequired { label, .. })) => {
                    let prompt = format!("'{label}' requires confirmation. Proceed?");
                    if !confirm_option(&prompt)? {
                        anyhow::bail!("Decision not recorded: '{}' was not confirmed (use --yes)", label);
                    }
                    orch.record_decision(&id, &tree, request.confirmed())?
                }
                other => other?,
            };
            if ctx.json {
                return output::print_json(&path);
            }
            println!("Recorded '{}' at '{}' in {}", path.selected_option_id, path.node_id, tree);
            match orch.current_decision_node(&id, &tree)? {
                Some(next) => println!("Next: {}", next.question),
                None => println!("Decision tree '{tree}' is complete."),
            }
            Ok(())
        }
    }
}

fn artifact_from_file(path: &Path) -> anyhow::Result<ArtifactRef> {
    ArtifactRef::from_path(path)
        .map_err(|e| anyhow::anyhow!("Failed to read artifact {}: {}", path.display(), e))
}

fn handle_evidence(action: EvidenceAction, ctx: &Context) -> anyhow::Result<()> {
    let (orch, config) = ctx.open()?;
    match action {
        EvidenceAction::Add {
            id,
            entry_type,
            description,
            phase,
            tags,
            artifacts,
        } => {
            let operator = ctx.operator(&config)?;
            let mut evidence = NewEvidence::new(entry_type.parse::<EntryType>()?, description, operator)
                .with_tags(tags);
            if let Some(phase) = phase {
                evidence = evidence.in_phase(phase.parse::<Phase>()?);
            }
            for path in &artifacts {
                evidence = evidence.with_artifact(artifact_from_file(path)?);
            }
            let entry = orch.add_evidence(&id, evidence)?;
            if ctx.json {
                return output::print_json(&entry);
            }
            println!(
                "Appended entry {} ({}) to {}, hash {}",
                entry.sequence_number, entry.entry_type, entry.incident_id, entry.entry_hash
            );
            Ok(())
        }
        EvidenceAction::List {
            id,
            phase,
            entry_type,
        } => {
            let filter = EvidenceFilter {
                phase: phase.map(|p| p.parse::<Phase>()).transpose()?,
                entry_type: entry_type.map(|t| t.parse::<EntryType>()).transpose()?,
            };
            let entries = orch.evidence(&id, &filter)?;
            if ctx.json {
                return output::print_json(&entries);
            }
            for e in &entries {
                let first_line = e.description.lines().next().unwrap_or_default();
                println!(
                    "  {:>4}  {}  {:<11} {:<13} {:<10} {}",
                    e.sequence_number,
                    irflow_core::timestamp::format(&e.timestamp),
                    e.entry_type.to_string(),
                    e.phase.to_string(),
                    e.operator,
                    first_line
                );
            }
            Ok(())
        }
        EvidenceAction::Chain { id } => {
            let chain = orch.chain(&id)?;
            if ctx.json {
                return output::print_json(&chain);
            }
            for link in &chain {
                println!(
                    "  {:>4}  {}  <- {}",
                    link.sequence_number,
                    link.entry_hash,
                    link.previous_hash.as_deref().unwrap_or("GENESIS")
                );
            }
            Ok(())
        }
        EvidenceAction::Verify { id } => {
            let report = orch.verify(&id)?;
            if ctx.json {
                output::print_json(&report)?;
            } else {
                output::verification(&report);
            }
            if !report.is_valid {
                anyhow::bail!("Evidence chain for {} failed verification", id);
            }
            Ok(())
        }
        EvidenceAction::Export { id, format, out } => {
            let format = match format {
                Some(f) => f.parse::<ExportFormat>()?,
                None => config.export.default_format,
            };
            let rendered = orch.export(&id, format)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Exported {} ledger to {}", format, path.display());
                }
                None => print!("{rendered}"),
            }
            Ok(())
        }
    }
}

fn handle_phase(action: PhaseAction, ctx: &Context) -> anyhow::Result<()> {
    let (orch, config) = ctx.open()?;
    match action {
        PhaseAction::Status { id } => {
            let state = orch.state(&id)?;
            if ctx.json {
                return output::print_json(&state.tracker);
            }
            println!("{} ({}), current phase: {}", id, state.incident.status, state.current_phase().title());
            output::tracker(&state.tracker);
            Ok(())
        }
        PhaseAction::Check { id } => {
            let check = orch.can_advance(&id)?;
            if ctx.json {
                return output::print_json(&check);
            }
            output::advance_check(&check);
            Ok(())
        }
        PhaseAction::Advance { id, notes } => {
            let operator = ctx.operator(&config)?;
            match orch.advance_phase(&id, &operator, notes.as_deref()) {
                Ok(transition) => {
                    if ctx.json {
                        return output::print_json(&transition);
                    }
                    println!(
                        "Advanced {} from {} to {}",
                        id,
                        transition.from.title(),
                        transition.to.title()
                    );
                    Ok(())
                }
                Err(err @ IrflowError::Workflow(WorkflowError::AdvanceBlocked { .. })) => {
                    if !ctx.json {
                        output::advance_check(&orch.can_advance(&id)?);
                    }
                    Err(err.into())
                }
                Err(err) => Err(err.into()),
            }
        }
        PhaseAction::Skip { id, phase, reason } => {
            let operator = ctx.operator(&config)?;
            let phase = phase.parse::<Phase>()?;
            orch.skip_phase(&id, phase, &operator, &reason)?;
            if ctx.json {
                return output::print_json(&orch.state(&id)?.tracker);
            }
            println!("Skipped {} for {}", phase.title(), id);
            Ok(())
        }
    }
}
