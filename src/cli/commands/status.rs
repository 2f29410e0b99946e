//! `taskdesk status` command - Store status dashboard

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::pick_format;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::filter::InstanceFilter;
use crate::core::{Config, Workspace};
use crate::store::TaskStore;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Break instance counts down per task
    #[arg(long)]
    pub per_task: bool,
}

pub fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = match &global.workspace {
        Some(root) => Workspace::discover_from(root).map_err(|e| miette::miette!("{}", e))?,
        None => Workspace::discover().map_err(|e| miette::miette!("{}", e))?,
    };
    let config = Config::load(Some(&workspace));
    let db_path = config.database_path(&workspace);
    let store = TaskStore::open_at(&db_path)?;
    let stats = store.stats()?;

    match pick_format(global, &config) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&stats).into_diagnostic()?);
        }
        _ => {
            // Human-readable dashboard
            let width = 60;

            println!("{}", style("taskdesk Status").bold().underlined());
            println!("{}", "═".repeat(width));
            println!();
            println!("Workspace:  {}", style(workspace.root().display()).cyan());
            println!(
                "Database:   {} (schema v{})",
                style(db_path.display()).dim(),
                stats.schema_version
            );
            println!();

            println!("{}", style("Catalog").bold());
            println!("{:-<60}", "");
            println!("  Tasks:          {}", stats.tasks);
            println!("  Properties:     {}", stats.properties);
            println!("  Indexes:        {}", stats.indexes);
            println!("  Index members:  {}", stats.index_members);
            println!();

            println!("{}", style("Data").bold());
            println!("{:-<60}", "");
            println!("  Live instances:      {}", stats.instances);
            println!("  Recycled instances:  {}", stats.recycled_instances);
            println!("  List values:         {}", stats.list_values);
            println!("  Index values:        {}", stats.index_values);

            if args.per_task {
                println!();
                println!("{}", style("Per task").bold());
                println!("{:-<60}", "");
                print!("{}", per_task_table(&store)?);
            }

            println!();
            println!("{}", "═".repeat(width));
        }
    }
    Ok(())
}

fn per_task_table(store: &TaskStore) -> Result<String> {
    let mut builder = Builder::default();
    builder.push_record(["TENANT", "TASK", "PROPERTIES", "INDEXES", "INSTANCES"]);

    let everything = InstanceFilter::new();
    for task in store.tasks()? {
        let properties = store.properties(&task.id)?.len();
        let indexes = store.indexes(&task.id)?.len();
        let instances = store.count_instances(&task.id, &everything)?;
        builder.push_record([
            task.tenant.clone(),
            task.name.clone(),
            properties.to_string(),
            indexes.to_string(),
            instances.to_string(),
        ]);
    }

    Ok(builder.build().with(Style::psql()).to_string() + "\n")
}
