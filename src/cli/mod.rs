//! CLI argument definitions for Crowbar.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// `--version` output: package version, commit, build time and bundled catalog digest.
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CROWBAR_GIT_COMMIT"),
    ", built ",
    env!("CROWBAR_BUILD_TIMESTAMP"),
    ", catalog ",
    env!("CROWBAR_CATALOG_DIGEST"),
    ")"
);

/// Crowbar - role and repository registries for bare-metal cluster orchestration.
#[derive(Parser, Debug)]
#[command(name = "crowbar")]
#[command(author, version, long_version = LONG_VERSION, about = "Inspect and update Crowbar roles and software repositories", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Settings file to use instead of ~/.config/crowbar/config.toml.
    /// Can also be set via CROWBAR_CONFIG environment variable.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins if set.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Role records shared between barclamps
    Role {
        #[command(subcommand)]
        command: RoleCommands,
    },

    /// Software repositories nodes install from
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Settings inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Role subcommands
#[derive(Subcommand, Debug)]
pub enum RoleCommands {
    /// Show a role by name
    Show {
        /// Role name (e.g., nova-config-default)
        name: String,
    },

    /// List roles, optionally filtered by a search query
    List {
        /// Search query: whitespace-separated `field:pattern` terms, `*` and `?` wildcards
        #[arg(short, long)]
        query: Option<String>,
    },

    /// List active proposals (roles named `<barclamp>-config-<instance>`)
    Active {
        /// Only proposals of this barclamp
        #[arg(short, long)]
        barclamp: Option<String>,

        /// Only this instance (requires --barclamp)
        #[arg(short, long, requires = "barclamp")]
        instance: Option<String>,
    },

    /// Save a role from a JSON document, bumping its revision
    Save {
        /// JSON file holding the role (`-` for stdin)
        file: PathBuf,
    },

    /// Delete a role
    Destroy {
        /// Role name
        name: String,
    },

    /// Write a role to `role-<name>.json`
    Export {
        /// Role name
        name: String,

        /// Target directory (defaults to the current directory)
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Repository subcommands
#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// List repositories with their availability
    List {
        /// Only repositories of this platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Only repositories with this name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run every validation check on one repository
    Check {
        /// Platform (e.g., suse-12.0)
        platform: String,

        /// Repository id (e.g., SLES12-Pool)
        id: String,
    },

    /// Report whether a feature's repositories are all active
    Feature {
        /// Feature name (e.g., ha)
        feature: String,

        /// Only this platform (defaults to any platform)
        #[arg(short, long)]
        platform: Option<String>,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each value came from
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["crowbar", "role", "show", "x", "-H", "-vv"]).unwrap();
        assert!(cli.human_readable);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Role {
                command: RoleCommands::Show { .. }
            }
        ));
    }

    #[test]
    fn test_instance_requires_barclamp() {
        assert!(Cli::try_parse_from(["crowbar", "role", "active", "--instance", "default"]).is_err());
        assert!(
            Cli::try_parse_from(["crowbar", "role", "active", "-b", "nova", "-i", "default"])
                .is_ok()
        );
    }
}
