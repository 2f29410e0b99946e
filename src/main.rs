use clap::Parser;
use miette::Result;
use taskdesk::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    // This is standard practice for CLI tools that output to stdout.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    // Logs go to stderr so piped stdout stays clean
    let filter = if global.verbose {
        tracing_subscriber::EnvFilter::new("taskdesk=debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init(args) => taskdesk::cli::commands::init::run(args),
        Commands::Task(cmd) => taskdesk::cli::commands::task::run(cmd, &global),
        Commands::Type(cmd) => taskdesk::cli::commands::typ::run(cmd, &global),
        Commands::Source(cmd) => taskdesk::cli::commands::source::run(cmd, &global),
        Commands::Prop(cmd) => taskdesk::cli::commands::prop::run(cmd, &global),
        Commands::Index(cmd) => taskdesk::cli::commands::index::run(cmd, &global),
        Commands::Instance(cmd) => taskdesk::cli::commands::instance::run(cmd, &global),
        Commands::Query(args) => taskdesk::cli::commands::query::run(args, &global),
        Commands::Status(args) => taskdesk::cli::commands::status::run(args, &global),
        Commands::Completions(args) => taskdesk::cli::commands::completions::run(args),
    }
}
