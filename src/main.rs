// src/main.rs

mod cli;
mod commands;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;

    match cli.command {
        Commands::List => commands::cmd_list(&global),
        Commands::Active => commands::cmd_active(&global),
        Commands::Fetch {
            ids,
            repository_url,
        } => commands::cmd_fetch(&global, &ids, repository_url.as_deref()),
        Commands::Activate { ids, recover } => {
            if recover {
                commands::cmd_recover(&global)
            } else {
                commands::cmd_activate(&global, &ids)
            }
        }
        Commands::Add { tarballs } => commands::cmd_add(&global, &tarballs),
        Commands::Remove { ids } => commands::cmd_remove(&global, &ids),
        Commands::Setup { repository_url } => {
            commands::cmd_setup(&global, repository_url.as_deref())
        }
        Commands::Bootstrap {
            build_root,
            roles,
            packages,
            output,
        } => commands::cmd_bootstrap(&build_root, &roles, &packages, &output),
        Commands::Build { dir, add } => commands::cmd_build(&global, &dir, add),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pkgpanda",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
