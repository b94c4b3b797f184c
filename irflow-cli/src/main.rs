//! irflow CLI: operator interface for guided incident response.
//!
//! Every subcommand opens the workspace store, performs one workflow
//! operation and prints the result.

mod commands;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// irflow: NIST SP 800-61 incident response with a tamper-evident ledger
#[derive(Parser, Debug)]
#[command(name = "irflow", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Operator recorded on ledger entries (defaults to workflow.default_operator, then $USER)
    #[arg(short, long, global = true)]
    operator: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect and validate playbooks
    Playbook {
        #[command(subcommand)]
        action: PlaybookAction,
    },
    /// Open, inspect and close incidents
    Incident {
        #[command(subcommand)]
        action: IncidentAction,
    },
    /// Work through phase checklists
    Checklist {
        #[command(subcommand)]
        action: ChecklistAction,
    },
    /// Walk decision trees
    Decision {
        #[command(subcommand)]
        action: DecisionAction,
    },
    /// Record and audit evidence
    Evidence {
        #[command(subcommand)]
        action: EvidenceAction,
    },
    /// Inspect and move through response phases
    Phase {
        #[command(subcommand)]
        action: PhaseAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default workspace configuration file
    Init,
}

#[derive(clap::Subcommand, Debug)]
enum PlaybookAction {
    /// List available playbooks
    List,
    /// Show the checklists and decision trees of a playbook
    Show {
        /// Playbook id
        id: String,
    },
    /// Validate a playbook file without installing it
    Validate {
        /// Path to a YAML playbook
        path: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum IncidentAction {
    /// Open a new incident from a playbook
    Create {
        /// Short incident title
        title: String,
        /// Playbook id (see `irflow playbook list`)
        #[arg(short, long)]
        playbook: String,
        /// Severity: low, medium, high, critical
        #[arg(short, long, default_value = "medium")]
        severity: String,
        /// Longer description
        #[arg(short, long)]
        description: Option<String>,
        /// Create as a draft; detection starts on `incident activate`
        #[arg(long)]
        draft: bool,
    },
    /// List incidents
    List,
    /// Show an incident with its phase tracker
    Show {
        /// Incident id
        id: String,
    },
    /// Start detection on a draft incident
    Activate {
        /// Incident id
        id: String,
    },
    /// Close an incident from the post-incident phase
    Close {
        /// Incident id
        id: String,
        /// Closing notes
        #[arg(short, long)]
        notes: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ChecklistAction {
    /// Show a phase checklist (defaults to the current phase)
    Show {
        /// Incident id
        id: String,
        /// Phase name
        #[arg(short, long)]
        phase: Option<String>,
    },
    /// Show completion counts for a phase
    Progress {
        /// Incident id
        id: String,
        /// Phase name
        #[arg(short, long)]
        phase: Option<String>,
    },
    /// Mark an item as in progress
    Start {
        /// Incident id
        id: String,
        /// Checklist item id
        item: String,
    },
    /// Complete an item
    Complete {
        /// Incident id
        id: String,
        /// Checklist item id
        item: String,
        /// Notes recorded with the completion
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Skip an optional item
    Skip {
        /// Incident id
        id: String,
        /// Checklist item id
        item: String,
        /// Why the item is being skipped
        #[arg(short, long)]
        reason: String,
    },
    /// Mark an optional item as not applicable
    Na {
        /// Incident id
        id: String,
        /// Checklist item id
        item: String,
        /// Why the item does not apply
        #[arg(short, long)]
        reason: String,
    },
    /// Approve the skip of a forensic-critical item
    Approve {
        /// Incident id
        id: String,
        /// Checklist item id
        item: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum DecisionAction {
    /// Show the current node of a decision tree, or all trees of the incident
    Show {
        /// Incident id
        id: String,
        /// Decision tree id
        tree: Option<String>,
    },
    /// Select an option at the current node
    Record {
        /// Incident id
        id: String,
        /// Decision tree id
        tree: String,
        /// Option id
        option: String,
        /// Rationale for the choice
        #[arg(short, long)]
        rationale: Option<String>,
        /// Confirm options that require it without prompting
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum EvidenceAction {
    /// Append an entry to the evidence ledger
    Add {
        /// Incident id
        id: String,
        /// Entry type: observation, action, decision, artifact, note
        #[arg(short = 't', long = "type", default_value = "note")]
        entry_type: String,
        /// Entry description
        description: String,
        /// Phase (defaults to the current phase)
        #[arg(short, long)]
        phase: Option<String>,
        /// Tags, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Files to hash and reference, repeatable
        #[arg(short, long = "artifact")]
        artifacts: Vec<PathBuf>,
    },
    /// List ledger entries
    List {
        /// Incident id
        id: String,
        /// Only entries from this phase
        #[arg(short, long)]
        phase: Option<String>,
        /// Only entries of this type
        #[arg(short = 't', long = "type")]
        entry_type: Option<String>,
    },
    /// Show the hash chain
    Chain {
        /// Incident id
        id: String,
    },
    /// Recompute and check every hash in the chain
    Verify {
        /// Incident id
        id: String,
    },
    /// Export the ledger as markdown or JSON
    Export {
        /// Incident id
        id: String,
        /// Output format: markdown, json (defaults to export.default_format)
        #[arg(short, long)]
        format: Option<String>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum PhaseAction {
    /// Show the status of every phase
    Status {
        /// Incident id
        id: String,
    },
    /// Explain what blocks the current phase from advancing
    Check {
        /// Incident id
        id: String,
    },
    /// Complete the current phase and start the next
    Advance {
        /// Incident id
        id: String,
        /// Notes recorded with the transition
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Skip a future phase
    Skip {
        /// Incident id
        id: String,
        /// Phase to skip
        phase: String,
        /// Why the phase is not needed
        #[arg(short, long)]
        reason: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "irflow", "irflow")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "irflow.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let ctx = commands::Context {
        workspace,
        operator: cli.operator,
        json: cli.json,
    };
    commands::handle_command(cli.command, &ctx)
}
