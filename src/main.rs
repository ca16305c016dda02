//! Crowbar CLI - role and repository registries for bare-metal cluster orchestration.

use clap::Parser;
use crowbar::cli::{Cli, Commands, ConfigCommands, RepoCommands, RoleCommands};
use crowbar::commands::{self, Output};
use crowbar::config::ResolvedSettings;
use crowbar::repository::{ActiveRepositories, RepoFilter};
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging(cli.verbose);

    let result = ResolvedSettings::resolve(cli.config.as_deref())
        .and_then(|settings| run_command(cli.command, &settings, human));

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Log to stderr so JSON on stdout stays parseable. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("crowbar={}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run_command(
    command: Commands,
    settings: &ResolvedSettings,
    human: bool,
) -> Result<(), crowbar::Error> {
    match command {
        Commands::Role { command } => {
            let roles = settings.roles()?;
            match command {
                RoleCommands::Show { name } => {
                    let catalog = settings.barclamps()?;
                    output(&commands::role_show(&roles, &catalog, &name)?, human)
                }
                RoleCommands::List { query } => {
                    output(&commands::role_list(&roles, query.as_deref())?, human)
                }
                RoleCommands::Active { barclamp, instance } => output(
                    &commands::role_active(&roles, barclamp.as_deref(), instance.as_deref())?,
                    human,
                ),
                RoleCommands::Save { file } => output(&commands::role_save(&roles, &file)?, human),
                RoleCommands::Destroy { name } => {
                    output(&commands::role_destroy(&roles, &name)?, human)
                }
                RoleCommands::Export { name, dir } => {
                    output(&commands::role_export(&roles, &name, &dir)?, human)
                }
            }
        }
        Commands::Repo { command } => {
            let registry = settings.repositories()?;
            let active = ActiveRepositories::load(settings.backend()?.as_ref());
            match command {
                RepoCommands::List { platform, name } => {
                    let filter = RepoFilter { platform, name };
                    output(&commands::repo_list(&registry, &active, &filter)?, human)
                }
                RepoCommands::Check { platform, id } => output(
                    &commands::repo_check(&registry, &active, &platform, &id)?,
                    human,
                ),
                RepoCommands::Feature { feature, platform } => output(
                    &commands::repo_feature(&registry, &active, &feature, platform.as_deref())?,
                    human,
                ),
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(settings), human),
        },
    }
    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
