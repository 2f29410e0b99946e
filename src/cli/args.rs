//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs,
    index::IndexCommands,
    init::InitArgs,
    instance::InstanceCommands,
    prop::PropCommands,
    query::QueryArgs,
    source::SourceCommands,
    status::StatusArgs,
    task::TaskCommands,
    typ::TypeCommands,
};

#[derive(Parser)]
#[command(name = "taskdesk")]
#[command(author, version, about = "Multi-tenant task store with property-driven indexes")]
#[command(
    long_about = "A workspace-local store where each task declares its own typed properties, instances keep their values in canonical SQLite rows, and secondary indexes speed up property lookups without changing query results."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .taskdesk/)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new taskdesk workspace
    Init(InitArgs),

    /// Task management (per-tenant containers)
    #[command(subcommand)]
    Task(TaskCommands),

    /// Task type management (placement targets for instances)
    #[command(subcommand)]
    Type(TypeCommands),

    /// Source management (placement targets for instances)
    #[command(subcommand)]
    Source(SourceCommands),

    /// Property management (typed attributes declared per task)
    #[command(subcommand)]
    Prop(PropCommands),

    /// Index management (secondary indexes over properties)
    #[command(subcommand)]
    Index(IndexCommands),

    /// Instance management (records stored under a task)
    #[command(subcommand)]
    Instance(InstanceCommands),

    /// Query instances with property filters
    Query(QueryArgs),

    /// Show store status dashboard
    Status(StatusArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}
