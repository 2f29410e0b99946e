//! `taskdesk query` command - Filtered instance queries
//!
//! Terms are `property=token` pairs. A bare token is a substring
//! match; wrap it in `eq(...)` for equality. Tokens on the same
//! property OR together, distinct properties AND together.

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{
    escape_csv, format_short_id, open_store, parse_id, pick_format, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::filter::{InstanceFilter, SortOrder};
use crate::core::identity::EntityPrefix;
use crate::store::{InstanceRecord, Property};

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Task ID
    pub task: String,

    /// Filter term as property=token, e.g. status=open or
    /// status=eq(open) (repeatable)
    #[arg(long = "where", short = 'w', value_name = "PROP=TOKEN")]
    pub terms: Vec<String>,

    /// Page size (default 50)
    #[arg(long, short = 'n')]
    pub limit: Option<i64>,

    /// Rows to skip before the page starts
    #[arg(long, default_value_t = 0)]
    pub offset: i64,

    /// Sort by creation time (desc, asc)
    #[arg(long, default_value = "desc")]
    pub order: SortOrder,

    /// Print the matching row count only
    #[arg(long)]
    pub count: bool,
}

pub fn run(args: QueryArgs, global: &GlobalOpts) -> Result<()> {
    let (store, config) = open_store(global)?;
    let task_id = parse_id(&args.task, EntityPrefix::Task)?;

    let mut filter = InstanceFilter::new();
    for term in &args.terms {
        filter
            .parse_term(term)
            .map_err(|e| miette::miette!("{}", e))?;
    }
    filter.limit = args.limit;
    filter.offset = args.offset;
    filter.order = args.order;

    if args.count {
        println!("{}", store.count_instances(&task_id, &filter)?);
        return Ok(());
    }

    let properties = store.properties(&task_id)?;
    let page = store.query_instances(&task_id, &filter)?;

    let format = pick_format(global, &config);
    if page.instances.is_empty() {
        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&page).into_diagnostic()?
                );
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yml::to_string(&page).into_diagnostic()?);
            }
            _ => println!("No matching instances ({} total in task).", page.total),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&page).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&page).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            let mut header = vec!["id".to_string(), "created_at".to_string()];
            header.extend(properties.iter().map(|p| p.name.clone()));
            println!("{}", header.join(","));
            for record in &page.instances {
                let mut row = vec![
                    record.id.to_string(),
                    record.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                ];
                row.extend(properties.iter().map(|p| escape_csv(&rendered(record, p))));
                println!("{}", row.join(","));
            }
        }
        OutputFormat::Tsv => {
            // Real tab separation, for awk/cut pipelines
            for record in &page.instances {
                let mut row = vec![record.id.to_string()];
                row.extend(properties.iter().map(|p| rendered(record, p)));
                println!("{}", row.join("\t"));
            }
        }
        OutputFormat::Id => {
            for record in &page.instances {
                println!("{}", record.id);
            }
        }
        OutputFormat::Md => {
            println!("{}", table(&page.instances, &properties, true));
        }
        OutputFormat::Auto => {
            println!("{}", table(&page.instances, &properties, false));
            println!();
            println!(
                "{} of {} instance(s) (offset {})",
                style(page.instances.len()).cyan(),
                style(page.total).cyan(),
                page.offset
            );
        }
    }

    Ok(())
}

fn rendered(record: &InstanceRecord, property: &Property) -> String {
    record
        .value(&property.name)
        .map(|v| v.render())
        .unwrap_or_else(|| "-".to_string())
}

fn table(records: &[InstanceRecord], properties: &[Property], markdown: bool) -> String {
    let mut builder = Builder::default();

    let mut header = vec!["ID".to_string(), "CREATED".to_string()];
    header.extend(properties.iter().map(|p| p.name.to_uppercase()));
    builder.push_record(header);

    for record in records {
        let mut row = vec![
            format_short_id(&record.id),
            record.created_at.format("%Y-%m-%d").to_string(),
        ];
        row.extend(
            properties
                .iter()
                .map(|p| truncate_str(&rendered(record, p), 24)),
        );
        builder.push_record(row);
    }

    if markdown {
        builder.build().with(Style::markdown()).to_string()
    } else {
        builder.build().with(Style::psql()).to_string()
    }
}
