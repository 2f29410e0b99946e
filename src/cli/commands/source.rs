//! `taskdesk source` command - Source management
//!
//! Sources mirror types: a second placement axis instances may point
//! at, checked at write time.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Create a new source on a task
    New(NewArgs),

    /// List a task's sources
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Task ID
    pub task: String,

    /// Source name (unique per task)
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Task ID
    pub task: String,
}

pub fn run(cmd: SourceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SourceCommands::New(args) => run_new(args, global),
        SourceCommands::List(args) => run_list(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let created = store.create_source(&task_id, &args.name, &config.author())?;

    if global.quiet {
        println!("{}", created.id);
    } else {
        println!(
            "{} Created source {} ({})",
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
    let sources = store.sources(&task_id)?;

    let format = pick_format(global, &config);
    if sources.is_empty() {
        match format {
            OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
            _ => println!("No sources found."),
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
                serde_json::to_string_pretty(&sources).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&sources).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            println!("id,name,created_by,created_at");
            for s in &sources {
                println!(
                    "{},{},{},{}",
                    s.id,
                    escape_csv(&s.name),
                    escape_csv(&s.created_by),
                    s.created_at.format("%Y-%m-%dT%H:%M:%SZ")
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
            for s in &sources {
                println!(
                    "{:<16} {:<28} {:<12}",
                    format_short_id(&s.id),
                    truncate_str(&s.name, 26),
                    truncate_str(&s.created_by, 12)
                );
            }
            println!();
            println!("{} source(s) found", style(sources.len()).cyan());
        }
        OutputFormat::Id => {
            for s in &sources {
                println!("{}", s.id);
            }
        }
        OutputFormat::Md => {
            println!("| ID | Name | Author |");
            println!("|---|---|---|");
            for s in &sources {
                println!(
                    "| {} | {} | {} |",
                    format_short_id(&s.id),
                    s.name,
                    s.created_by
                );
            }
        }
        OutputFormat::Auto => unreachable!(),
    }

    Ok(())
}
