//! `taskdesk type` command - Task type management
//!
//! Task types are placement targets: an instance may point at one
//! type of its task, and the reference is checked at write time.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;

#[derive(Subcommand, Debug)]
pub enum TypeCommands {
    /// Create a new type on a task
    New(NewArgs),

    /// List a task's types
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Task ID
    pub task: String,

    /// Type name (unique per task)
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Task ID
    pub task: String,
}

pub fn run(cmd: TypeCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TypeCommands::New(args) => run_new(args, global),
        TypeCommands::List(args) => run_list(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let created = store.create_type(&task_id, &args.name, &config.author())?;

    if global.quiet {
        println!("{}", created.id);
    } else {
        println!(
            "{} Created type {} ({})",
            style("✓").green(),
            style(&created.id).cyan(),
            created.name
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let types = store.types(&task_id)?;

    let format = pick_format(global, &config);
    if types.is_empty() {
        match format {
            OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
            _ => println!("No types found."),
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
                serde_json::to_string_pretty(&types).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&types).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            println!("id,name,created_by,created_at");
            for t in &types {
                println!(
                    "{},{},{},{}",
                    t.id,
                    escape_csv(&t.name),
                    escape_csv(&t.created_by),
                    t.created_at.format("%Y-%m-%dT%H:%M:%SZ")
                );
            }
        }
        OutputFormat::Tsv => {
            println!(
                "{:<16} {:<28} {:<12}",
                style("ID").bold(),
                style("NAME").bold(),
                style("AUTHOR").bold()
            );
            println!("{}", "-".repeat(58));
            for t in &types {
                println!(
                    "{:<16} {:<28} {:<12}",
                    format_short_id(&t.id),
                    truncate_str(&t.name, 26),
                    truncate_str(&t.created_by, 12)
                );
            }
            println!();
            println!("{} type(s) found", style(types.len()).cyan());
        }
        OutputFormat::Id => {
            for t in &types {
                println!("{}", t.id);
            }
        }
        OutputFormat::Md => {
            println!("| ID | Name | Author |");
            println!("|---|---|---|");
            for t in &types {
                println!(
                    "| {} | {} | {} |",
                    format_short_id(&t.id),
                    t.name,
                    t.created_by
                );
            }
        }
        OutputFormat::Auto => unreachable!(),
    }

    Ok(())
}
