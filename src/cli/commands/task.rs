//! `taskdesk task` command - Task management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task under a tenant
    New(NewArgs),

    /// List tasks
    List(ListArgs),

    /// Show a task's details
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Tenant the task belongs to
    pub tenant: String,

    /// Task name (unique per tenant)
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by tenant
    #[arg(long, short = 't')]
    pub tenant: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Task ID
    pub id: String,
}

pub fn run(cmd: TaskCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TaskCommands::New(args) => run_new(args, global),
        TaskCommands::List(args) => run_list(args, global),
        TaskCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task = store.create_task(&args.tenant, &args.name, &config.author())?;

    if global.quiet {
        println!("{}", task.id);
    } else {
        println!(
            "{} Created task {} ({}/{})",
            style("✓").green(),
            style(&task.id).cyan(),
            task.tenant,
            task.name
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let mut tasks = store.tasks()?;
    if let Some(tenant) = &args.tenant {
        tasks.retain(|t| t.tenant == *tenant);
    }

    let format = pick_format(global, &config);
    if tasks.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Yaml => println!("[]"),
            _ => {
                println!("No tasks found.");
                println!();
                println!(
                    "Create one with: {}",
                    style("taskdesk task new <tenant> <name>").yellow()
                );
            }
        }
        return Ok(());
    }

    let format = match format {
        OutputFormat::Auto => OutputFormat::Tsv, // Default to TSV for list
        f => f,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&tasks).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&tasks).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Csv => {
            println!("id,tenant,name,created_by,created_at");
            for task in &tasks {
                println!(
                    "{},{},{},{},{}",
                    task.id,
                    escape_csv(&task.tenant),
                    escape_csv(&task.name),
                    escape_csv(&task.created_by),
                    task.created_at.format("%Y-%m-%dT%H:%M:%SZ")
                );
            }
        }
        OutputFormat::Tsv => {
            println!(
                "{:<16} {:<16} {:<28} {:<12}",
                style("ID").bold(),
                style("TENANT").bold(),
                style("NAME").bold(),
                style("AUTHOR").bold()
            );
            println!("{}", "-".repeat(74));

            for task in &tasks {
                println!(
                    "{:<16} {:<16} {:<28} {:<12}",
                    format_short_id(&task.id),
                    truncate_str(&task.tenant, 14),
                    truncate_str(&task.name, 26),
                    truncate_str(&task.created_by, 12)
                );
            }

            println!();
            println!("{} task(s) found", style(tasks.len()).cyan());
        }
        OutputFormat::Id => {
            for task in &tasks {
                println!("{}", task.id);
            }
        }
        OutputFormat::Md => {
            println!("| ID | Tenant | Name | Author |");
            println!("|---|---|---|---|");
            for task in &tasks {
                println!(
                    "| {} | {} | {} | {} |",
                    format_short_id(&task.id),
                    task.tenant,
                    task.name,
                    task.created_by
                );
            }
        }
        OutputFormat::Auto => unreachable!(), // Already handled above
    }

    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let id = parse_id(&args.id, EntityPrefix::Task)?;
    let task = store.task(&id)?;

    match pick_format(global, &config) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&task).into_diagnostic()?
            );
        }
        OutputFormat::Id => println!("{}", task.id),
        // Auto defaults to YAML for show
        _ => print!("{}", serde_yml::to_string(&task).into_diagnostic()?),
    }
    Ok(())
}
