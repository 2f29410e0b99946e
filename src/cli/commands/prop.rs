//! `taskdesk prop` command - Property management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;
use crate::core::kind::{DataKind, Visibility};
use crate::store::PropertyDraft;

#[derive(Subcommand, Debug)]
pub enum PropCommands {
    /// Declare a new property on a task
    New(NewArgs),

    /// List a task's properties
    List(ListArgs),

    /// Show a property's details
    Show(ShowArgs),

    /// Change a property's data kind, migrating stored values
    Retype(RetypeArgs),

    /// Delete a property and every value stored under it
    Rm(RmArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Task ID
    pub task: String,

    /// Property name (unique per task, case-insensitive)
    pub name: String,

    /// Data kind (text, integer, real, boolean, text_list)
    #[arg(long, short = 'k')]
    pub kind: DataKind,

    /// Reject instances that leave this property empty
    #[arg(long)]
    pub required: bool,

    /// Enforce value uniqueness across the task's live instances
    #[arg(long)]
    pub identifiable: bool,

    /// Visibility scope (public, internal, hidden)
    #[arg(long, default_value = "public")]
    pub visibility: Visibility,

    /// Display hint, stored as JSON and passed through untouched
    #[arg(long)]
    pub display: Option<String>,

    /// Categories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Task ID
    pub task: String,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Task ID
    pub task: String,

    /// Property ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct RetypeArgs {
    /// Task ID
    pub task: String,

    /// Property ID
    pub id: String,

    /// New data kind
    pub kind: DataKind,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    /// Task ID
    pub task: String,

    /// Property ID
    pub id: String,

    /// Delete even if the property is still an index member
    #[arg(long)]
    pub force: bool,
}

pub fn run(cmd: PropCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        PropCommands::New(args) => run_new(args, global),
        PropCommands::List(args) => run_list(args, global),
        PropCommands::Show(args) => run_show(args, global),
        PropCommands::Retype(args) => run_retype(args, global),
        PropCommands::Rm(args) => run_rm(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;

    let display = match &args.display {
        Some(raw) => Some(
            serde_json::from_str(raw)
                .map_err(|e| miette::miette!("--display must be valid JSON: {}", e))?,
        ),
        None => None,
    };

    let mut draft = PropertyDraft::new(&args.name, args.kind)
        .required(args.required)
        .identifiable(args.identifiable);
    draft.visibility = args.visibility;
    draft.display = display;
    draft.categories = args.categories;

    let property = store.add_property(&task_id, draft, &config.author())?;

    if global.quiet {
        println!("{}", property.id);
    } else {
        println!(
            "{} Created property {} ({}, {})",
            style("✓").green(),
            style(&property.id).cyan(),
            property.name,
            property.kind
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let properties = store.properties(&task_id)?;

    let format = pick_format(global, &config);
    if properties.is_empty() {
        match format {
            OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
            _ => {
                println!("No properties found.");
                println!();
                println!(
                    "Create one with: {}",
                    style("taskdesk prop new <task> <name> --kind text").yellow()
                );
            }
        }
        return Ok(());
    }

    let format = match format {
        OutputFormat::Auto => OutputFormat::Tsv,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&properties).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&properties).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            println!("id,name,kind,required,identifiable,visibility,categories");
            for p in &properties {
                println!(
                    "{},{},{},{},{},{},{}",
                    p.id,
                    escape_csv(&p.name),
                    p.kind,
                    p.required,
                    p.identifiable,
                    p.visibility,
                    escape_csv(&p.categories.join(";"))
                );
            }
        }
        OutputFormat::Tsv => {
            println!(
                "{:<16} {:<24} {:<10} {:<20}",
                style("ID").bold(),
                style("NAME").bold(),
                style("KIND").bold(),
                style("FLAGS").bold()
            );
            println!("{}", "-".repeat(72));
            for p in &properties {
                println!(
                    "{:<16} {:<24} {:<10} {:<20}",
                    format_short_id(&p.id),
                    truncate_str(&p.name, 22),
                    p.kind,
                    flags(p)
                );
            }
            println!();
            println!("{} propert(ies) found", style(properties.len()).cyan());
        }
        OutputFormat::Id => {
            for p in &properties {
                println!("{}", p.id);
            }
        }
        OutputFormat::Md => {
            println!("| ID | Name | Kind | Flags |");
            println!("|---|---|---|---|");
            for p in &properties {
                println!(
                    "| {} | {} | {} | {} |",
                    format_short_id(&p.id),
                    p.name,
                    p.kind,
                    flags(p)
                );
            }
        }
        OutputFormat::Auto => unreachable!(),
    }

    Ok(())
}

fn flags(p: &crate::store::Property) -> String {
    let mut parts = Vec::new();
    if p.required {
        parts.push("required");
    }
    if p.identifiable {
        parts.push("identifiable");
    }
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(",")
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let prop_id = parse_id(&args.id, EntityPrefix::Prop)?;
    let property = store.property(&task_id, &prop_id)?;

    match pick_format(global, &config) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&property).into_diagnostic()?
            );
        }
        OutputFormat::Id => println!("{}", property.id),
        _ => print!("{}", serde_yml::to_string(&property).into_diagnostic()?),
    }
    Ok(())
}

fn run_retype(args: RetypeArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let prop_id = parse_id(&args.id, EntityPrefix::Prop)?;

    let before = store.property(&task_id, &prop_id)?;
    let property = store.retype_property(&task_id, &prop_id, args.kind, &config.author())?;

    if !global.quiet {
        println!(
            "{} Retyped property {} ({} -> {})",
            style("✓").green(),
            style(&property.name).cyan(),
            before.kind,
            property.kind
        );
    }
    Ok(())
}

fn run_rm(args: RmArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, _config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let prop_id = parse_id(&args.id, EntityPrefix::Prop)?;
    let property = store.property(&task_id, &prop_id)?;

    // Check for index memberships before tearing values down
    if !args.force {
        let referencing: Vec<String> = store
            .indexes(&task_id)?
            .into_iter()
            .filter(|idx| idx.properties.iter().any(|p| p.id == prop_id))
            .map(|idx| idx.name)
            .collect();

        if !referencing.is_empty() {
            return Err(miette::miette!(
                "Property '{}' is a member of {} index(es): {}\nUse --force to delete anyway; indexes left without members go with it.",
                property.name,
                referencing.len(),
                referencing.join(", ")
            ));
        }
    }

    store.delete_property(&task_id, &prop_id)?;

    if !global.quiet {
        println!(
            "{} Deleted property {} and its stored values",
            style("✓").green(),
            style(&property.name).cyan()
        );
    }
    Ok(())
}
