// src/main.rs

use anyhow::Result;
use clap::Parser;
use conflux::cli::{Cli, Commands};
use conflux::commands;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let project = cli.project.as_str();

    match cli.command {
        Some(Commands::Init) => commands::cmd_init(project),
        Some(Commands::Lock { force }) => commands::cmd_lock(project, force),
        Some(Commands::Add {
            requirement,
            no_lock,
        }) => commands::cmd_add(project, &requirement, no_lock),
        Some(Commands::Remove { name, no_lock }) => commands::cmd_remove(project, &name, no_lock),
        Some(Commands::Update { names }) => commands::cmd_update(project, &names),
        Some(Commands::Install { dry_run }) => commands::cmd_install(project, dry_run),
        Some(Commands::Search { requirement }) => commands::cmd_search(project, &requirement),
        Some(Commands::Info) => commands::cmd_info(project),
        None => {
            println!("Conflux v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'conflux --help' for usage information");
            Ok(())
        }
    }
}
