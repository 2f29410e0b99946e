//! `taskdesk instance` command - Instance management
//!
//! Values arrive as `property=value` pairs and are parsed against the
//! property's declared kind before the store sees them, so type errors
//! surface with the offending argument rather than deep in a
//! transaction.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use csv::ReaderBuilder;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{open_store, parse_id, pick_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;
use crate::core::kind::{DataKind, PropertyValue};
use crate::store::{InstanceDraft, Property};

#[derive(Subcommand, Debug)]
pub enum InstanceCommands {
    /// Create a new instance under a task
    New(NewArgs),

    /// Show an instance with its typed values
    Show(ShowArgs),

    /// Change or clear an instance's property values
    Patch(PatchArgs),

    /// Soft-delete an instance into the recycle store
    Rm(RmArgs),

    /// Restore a soft-deleted instance
    Recover(RecoverArgs),

    /// Import instances from a CSV file (headers are property names)
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Task ID
    pub task: String,

    /// Type placement (TYPE-… id of this task)
    #[arg(long = "type", short = 't')]
    pub type_id: Option<String>,

    /// Source placement (SRC-… id of this task)
    #[arg(long = "source", short = 's')]
    pub source_id: Option<String>,

    /// Property value as property=value (repeatable)
    #[arg(long = "set", value_name = "PROP=VALUE")]
    pub set: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Task ID
    pub task: String,

    /// Instance ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct PatchArgs {
    /// Task ID
    pub task: String,

    /// Instance ID
    pub id: String,

    /// Property value as property=value (repeatable)
    #[arg(long = "set", value_name = "PROP=VALUE")]
    pub set: Vec<String>,

    /// Property to clear (repeatable)
    #[arg(long = "clear", value_name = "PROP")]
    pub clear: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    /// Task ID
    pub task: String,

    /// Instance ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct RecoverArgs {
    /// Task ID
    pub task: String,

    /// Instance ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Task ID
    pub task: String,

    /// CSV file with a header row of property names
    pub file: PathBuf,

    /// Type placement applied to every row
    #[arg(long = "type", short = 't')]
    pub type_id: Option<String>,

    /// Source placement applied to every row
    #[arg(long = "source", short = 's')]
    pub source_id: Option<String>,

    /// Parse and report without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep going after a bad row instead of stopping
    #[arg(long)]
    pub skip_errors: bool,
}

pub fn run(cmd: InstanceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        InstanceCommands::New(args) => run_new(args, global),
        InstanceCommands::Show(args) => run_show(args, global),
        InstanceCommands::Patch(args) => run_patch(args, global),
        InstanceCommands::Rm(args) => run_rm(args, global),
        InstanceCommands::Recover(args) => run_recover(args, global),
        InstanceCommands::Import(args) => run_import(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let properties = store.properties(&task_id)?;

    let mut draft = InstanceDraft::new();
    if let Some(raw) = &args.type_id {
        draft.type_id = Some(parse_id(raw, EntityPrefix::Type)?);
    }
    if let Some(raw) = &args.source_id {
        draft.source_id = Some(parse_id(raw, EntityPrefix::Src)?);
    }
    for pair in &args.set {
        let (name, raw_value) = split_set(pair)?;
        let property = declared(&properties, name)?;
        let value = parse_value(raw_value, property.kind)?;
        draft.values.insert(property.name.clone(), value);
    }

    let record = store.create_instance(&task_id, draft, &config.author())?;

    if global.quiet {
        println!("{}", record.id);
    } else {
        println!(
            "{} Created instance {}",
            style("✓").green(),
            style(&record.id).cyan()
        );
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let instance_id = parse_id(&args.id, EntityPrefix::Inst)?;
    let record = store.instance(&task_id, &instance_id)?;

    match pick_format(global, &config) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&record).into_diagnostic()?
            );
        }
        OutputFormat::Id => println!("{}", record.id),
        _ => print!("{}", serde_yml::to_string(&record).into_diagnostic()?),
    }
    Ok(())
}

fn run_patch(args: PatchArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let instance_id = parse_id(&args.id, EntityPrefix::Inst)?;
    let properties = store.properties(&task_id)?;

    let mut changes: BTreeMap<String, Option<PropertyValue>> = BTreeMap::new();
    for pair in &args.set {
        let (name, raw_value) = split_set(pair)?;
        let property = declared(&properties, name)?;
        changes.insert(
            property.name.clone(),
            Some(parse_value(raw_value, property.kind)?),
        );
    }
    for name in &args.clear {
        let property = declared(&properties, name)?;
        changes.insert(property.name.clone(), None);
    }

    if changes.is_empty() {
        return Err(miette::miette!(
            "Nothing to change. Pass --set and/or --clear."
        ));
    }

    let record = store.patch_instance(&task_id, &instance_id, changes, &config.author())?;

    if global.quiet {
        println!("{}", record.id);
    } else {
        println!(
            "{} Updated instance {}",
            style("✓").green(),
            style(&record.id).cyan()
        );
    }
    Ok(())
}

fn run_rm(args: RmArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let instance_id = parse_id(&args.id, EntityPrefix::Inst)?;

    store.delete_instance(&task_id, &instance_id, &config.author())?;

    if !global.quiet {
        println!(
            "{} Recycled instance {} (restore with {})",
            style("✓").green(),
            style(&instance_id).cyan(),
            style("taskdesk instance recover").yellow()
        );
    }
    Ok(())
}

fn run_recover(args: RecoverArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let instance_id = parse_id(&args.id, EntityPrefix::Inst)?;

    let record = store.recover_instance(&task_id, &instance_id, &config.author())?;

    if global.quiet {
        println!("{}", record.id);
    } else {
        println!(
            "{} Recovered instance {}",
            style("✓").green(),
            style(&record.id).cyan()
        );
    }
    Ok(())
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let (mut store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;
    let properties = store.properties(&task_id)?;
    let author = config.author();

    let type_id = match &args.type_id {
        Some(raw) => Some(parse_id(raw, EntityPrefix::Type)?),
        None => None,
    };
    let source_id = match &args.source_id {
        Some(raw) => Some(parse_id(raw, EntityPrefix::Src)?),
        None => None,
    };

    let file = File::open(&args.file).into_diagnostic()?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    // Resolve every header against the declared properties up front so
    // a typo fails before the first row is written
    let headers = rdr.headers().into_diagnostic()?.clone();
    let mut columns: Vec<(usize, Property)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        let name = header.trim();
        if name.is_empty() {
            continue;
        }
        columns.push((idx, declared(&properties, name)?.clone()));
    }

    let mut imported = 0usize;
    let mut errors = 0usize;

    for (row_idx, result) in rdr.records().enumerate() {
        let row_num = row_idx + 2; // +2 for 1-indexed and header row

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!(
                    "{} Row {}: CSV parse error: {}",
                    style("✗").red(),
                    row_num,
                    e
                );
                errors += 1;
                if !args.skip_errors {
                    return Err(miette::miette!("CSV parse error at row {}: {}", row_num, e));
                }
                continue;
            }
        };

        let mut draft = InstanceDraft::new();
        draft.type_id = type_id.clone();
        draft.source_id = source_id.clone();

        // Blank cells mean "value absent", matching the store's view
        // of missing properties
        let mut row_err: Option<miette::Report> = None;
        for (idx, property) in &columns {
            let Some(raw) = record.get(*idx) else { continue };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match parse_value(raw, property.kind) {
                Ok(value) => {
                    draft.values.insert(property.name.clone(), value);
                }
                Err(e) => {
                    row_err = Some(e);
                    break;
                }
            }
        }

        let outcome = match row_err {
            Some(e) => Err(e),
            None if args.dry_run => Ok(None),
            None => store
                .create_instance(&task_id, draft, &author)
                .map(Some)
                .map_err(miette::Report::from),
        };

        match outcome {
            Ok(created) => {
                imported += 1;
                if global.verbose {
                    if let Some(record) = created {
                        println!("{} Row {}: {}", style("✓").green(), row_num, record.id);
                    }
                }
            }
            Err(e) => {
                eprintln!("{} Row {}: {}", style("✗").red(), row_num, e);
                errors += 1;
                if !args.skip_errors {
                    return Err(e);
                }
            }
        }
    }

    println!();
    if args.dry_run {
        println!(
            "{} {} row(s) parsed, {} error(s) (dry run, nothing written)",
            style("✓").green(),
            imported,
            errors
        );
    } else {
        println!(
            "{} Imported {} instance(s), {} error(s)",
            style("✓").green(),
            imported,
            errors
        );
    }
    Ok(())
}

/// Split a `property=value` argument
fn split_set(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(miette::miette!("expected property=value, got '{}'", raw)),
    }
}

/// Find a declared property by name, case-insensitive
fn declared<'a>(properties: &'a [Property], name: &str) -> Result<&'a Property> {
    properties
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let declared: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
            miette::miette!(
                "unknown property: '{}' (declared: {})",
                name,
                if declared.is_empty() {
                    "none".to_string()
                } else {
                    declared.join(", ")
                }
            )
        })
}

/// Parse a raw CLI value against the property's declared kind
fn parse_value(raw: &str, kind: DataKind) -> Result<PropertyValue> {
    match kind {
        DataKind::Text => Ok(PropertyValue::Text(raw.to_string())),
        DataKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(PropertyValue::Integer)
            .map_err(|_| miette::miette!("'{}' is not an integer", raw)),
        DataKind::Real => raw
            .trim()
            .parse::<f64>()
            .map(PropertyValue::Real)
            .map_err(|_| miette::miette!("'{}' is not a number", raw)),
        DataKind::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(PropertyValue::Boolean(true)),
            "false" | "0" | "no" => Ok(PropertyValue::Boolean(false)),
            other => Err(miette::miette!("'{}' is not a boolean", other)),
        },
        DataKind::TextList => {
            // JSON array or comma-separated shorthand
            if raw.trim_start().starts_with('[') {
                let items: Vec<String> = serde_json::from_str(raw)
                    .map_err(|e| miette::miette!("invalid list '{}': {}", raw, e))?;
                Ok(PropertyValue::TextList(items))
            } else {
                Ok(PropertyValue::TextList(
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                ))
            }
        }
    }
}
