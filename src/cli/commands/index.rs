//! `taskdesk index` command - Index management
//!
//! Indexes are declared per task over one or more properties. Besides
//! the usual create/edit/delete verbs, `apply` consumes a declarative
//! YAML file and reconciles the task's whole index set against it.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;
use crate::store::{IndexDeclaration, TaskIndex, TaskStore};

#[derive(Subcommand, Debug)]
pub enum IndexCommands {
    /// Create an index over one or more properties
    New(NewArgs),

    /// List a task's indexes
    List(ListArgs),

    /// Show an index with its member properties
    Show(ShowArgs),

    /// Rename an index and/or swap its member set
    Edit(EditArgs),

    /// Delete an index (property values stay put)
    Rm(RmArgs),

    /// Reconcile the task's indexes against a YAML declaration file
    Apply(ApplyArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Task ID
    pub task: String,

    /// Index name (unique per task)
    pub name: String,

    /// Member property names (repeatable)
    #[arg(long = "prop", short = 'p', required = true)]
    pub properties: Vec<String>,
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

    /// Index ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Task ID
    pub task: String,

    /// Index ID
    pub id: String,

    /// New index name
    #[arg(long)]
    pub name: Option<String>,

    /// Replacement member property names (repeatable; omits keep the current set)
    #[arg(long = "prop", short = 'p')]
    pub properties: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    /// Task ID
    pub task: String,

    /// Index ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Task ID
    pub task: String,

    /// YAML file with the desired index declarations
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Apply without asking for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(cmd: IndexCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        IndexCommands::New(args) => run_new(args, global),
        IndexCommands::List(args) => run_list(args, global),
        IndexCommands::Show(args) => run_show(args, global),
        IndexCommands::Edit(args) => run_edit(args, global),
        IndexCommands::Rm(args) => run_rm(args, global),
        IndexCommands::Apply(args) => run_apply(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let index = store.create_index(&task_id, &args.name, &args.properties, &config.author())?;

    if global.quiet {
        println!("{}", index.id);
    } else {
        println!(
            "{} Created index {} ({}) over {}",
            style("✓").green(),
            style(&index.id).cyan(),
            index.name,
            member_names(&index).join(", ")
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let indexes = store.indexes(&task_id)?;

    let format = pick_format(global, &config);
    if indexes.is_empty() {
        match format {
            OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
            _ => {
                println!("No indexes found.");
                println!();
                println!(
                    "Create one with: {}",
                    style("taskdesk index new <task> <name> --prop <property>").yellow()
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
                serde_json::to_string_pretty(&indexes).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&indexes).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            println!("id,name,properties");
            for idx in &indexes {
                println!(
                    "{},{},{}",
                    idx.id,
                    escape_csv(&idx.name),
                    escape_csv(&member_names(idx).join(";"))
                );
            }
        }
        OutputFormat::Tsv => {
            println!(
                "{:<16} {:<24} {:<32}",
                style("ID").bold(),
                style("NAME").bold(),
                style("PROPERTIES").bold()
            );
            println!("{}", "-".repeat(74));
            for idx in &indexes {
                println!(
                    "{:<16} {:<24} {:<32}",
                    format_short_id(&idx.id),
                    truncate_str(&idx.name, 22),
                    truncate_str(&member_names(idx).join(", "), 30)
                );
            }
            println!();
            println!("{} index(es) found", style(indexes.len()).cyan());
        }
        OutputFormat::Id => {
            for idx in &indexes {
                println!("{}", idx.id);
            }
        }
        OutputFormat::Md => {
            println!("| ID | Name | Properties |");
            println!("|---|---|---|");
            for idx in &indexes {
                println!(
                    "| {} | {} | {} |",
                    format_short_id(&idx.id),
                    idx.name,
                    member_names(idx).join(", ")
                );
            }
        }
        OutputFormat::Auto => unreachable!(),
    }

    Ok(())
}

fn member_names(index: &TaskIndex) -> Vec<String> {
    index.properties.iter().map(|p| p.name.clone()).collect()
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let index_id = parse_id(&args.id, EntityPrefix::Idx)?;
    let index = store.index(&task_id, &index_id)?;

    match pick_format(global, &config) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&index).into_diagnostic()?
            );
        }
        OutputFormat::Id => println!("{}", index.id),
        _ => print!("{}", serde_yml::to_string(&index).into_diagnostic()?),
    }
    Ok(())
}

fn run_edit(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let index_id = parse_id(&args.id, EntityPrefix::Idx)?;

    if args.name.is_none() && args.properties.is_empty() {
        return Err(miette::miette!(
            "Nothing to change. Pass --name and/or --prop."
        ));
    }

    let new_properties = if args.properties.is_empty() {
        None
    } else {
        Some(args.properties.as_slice())
    };
    let index = store.patch_index(
        &task_id,
        &index_id,
        args.name.as_deref(),
        new_properties,
        &config.author(),
    )?;

    if !global.quiet {
        println!(
            "{} Updated index {} over {}",
            style("✓").green(),
            style(&index.name).cyan(),
            member_names(&index).join(", ")
        );
    }
    Ok(())
}

fn run_rm(args: RmArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, _config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let index_id = parse_id(&args.id, EntityPrefix::Idx)?;
    let index = store.index(&task_id, &index_id)?;

    store.delete_index(&task_id, &index_id)?;

    if !global.quiet {
        println!(
            "{} Deleted index {}",
            style("✓").green(),
            style(&index.name).cyan()
        );
    }
    Ok(())
}

fn run_apply(args: ApplyArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;

    let contents = std::fs::read_to_string(&args.file).into_diagnostic()?;
    let declarations: Vec<IndexDeclaration> = serde_yml::from_str(&contents)
        .map_err(|e| miette::miette!("{}: {}", args.file.display(), e))?;

    let (created, updated, removed) = plan(&store, &task_id, &declarations)?;
    if created.is_empty() && updated.is_empty() && removed.is_empty() {
        println!("Indexes already match the declarations; nothing to do.");
        return Ok(());
    }

    print_plan(&created, &updated, &removed);

    if args.dry_run {
        println!();
        println!("No changes made (dry run).");
        return Ok(());
    }

    if !args.yes && !global.quiet {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Apply these changes?")
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let outcome = store.save_indexes(&task_id, &declarations, &config.author())?;

    if !global.quiet {
        println!(
            "{} Applied: {} created, {} updated, {} removed",
            style("✓").green(),
            outcome.created.len(),
            outcome.updated.len(),
            outcome.removed.len()
        );
    }
    Ok(())
}

/// Preview of what save_indexes will do, computed the same way: exact
/// name matching, members compared as the ordered, deduplicated,
/// case-insensitively resolved id list.
fn plan(
    store: &TaskStore,
    task_id: &crate::core::identity::EntityId,
    declarations: &[IndexDeclaration],
) -> Result<(Vec<String>, Vec<String>, Vec<String>)> {
    let current = store.indexes(task_id)?;
    let properties = store.properties(task_id)?;

    let resolve = |names: &[String]| -> Vec<Option<String>> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for raw in names {
            let name = raw.trim();
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            ids.push(
                properties
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
                    .map(|p| p.id.to_string()),
            );
        }
        ids
    };

    let mut created = Vec::new();
    let mut updated = Vec::new();
    for declaration in declarations {
        let name = declaration.name.trim();
        match current.iter().find(|idx| idx.name == name) {
            None => created.push(name.to_string()),
            Some(existing) => {
                let have: Vec<Option<String>> = existing
                    .properties
                    .iter()
                    .map(|p| Some(p.id.to_string()))
                    .collect();
                if have != resolve(&declaration.properties) {
                    updated.push(name.to_string());
                }
            }
        }
    }

    let removed = current
        .iter()
        .filter(|idx| !declarations.iter().any(|d| d.name.trim() == idx.name))
        .map(|idx| idx.name.clone())
        .collect();

    Ok((created, updated, removed))
}

fn print_plan(created: &[String], updated: &[String], removed: &[String]) {
    if !created.is_empty() {
        println!("{} create: {}", style("+").green(), created.join(", "));
    }
    if !updated.is_empty() {
        println!("{} update: {}", style("~").yellow(), updated.join(", "));
    }
    if !removed.is_empty() {
        println!("{} remove: {}", style("-").red(), removed.join(", "));
    }
}
