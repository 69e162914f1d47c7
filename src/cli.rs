// src/cli.rs
//! CLI definitions for pkgpanda
//!
//! Commands are implemented in the `commands` module. Global flags override
//! values from the configuration file.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgpanda")]
#[command(author = "Pkgpanda Contributors")]
#[command(version)]
#[command(about = "Host-local package manager with crash-safe atomic activation", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Install root holding the active packages
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Machine configuration directory (roles, setup flags)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Local package repository
    #[arg(long, global = true)]
    pub repository: Option<PathBuf>,

    /// Keep the systemd wants directory inside the install root
    #[arg(long, global = true)]
    pub rooted_systemd: bool,

    /// Do not stop or start systemd units
    #[arg(long, global = true)]
    pub no_systemd: bool,

    /// Queue systemd jobs without waiting for them
    #[arg(long, global = true)]
    pub no_block_systemd: bool,

    /// Configuration file (default: /etc/pkgpanda/pkgpanda.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List packages in the local repository
    List,

    /// List the active packages
    Active,

    /// Download packages from a remote repository into the local one
    Fetch {
        /// Package ids (name--version)
        #[arg(required = true)]
        ids: Vec<String>,

        /// Base URL of the remote repository
        #[arg(long)]
        repository_url: Option<String>,
    },

    /// Make exactly the given packages active
    Activate {
        /// Package ids (name--version)
        #[arg(required_unless_present = "recover", conflicts_with = "recover")]
        ids: Vec<String>,

        /// Finish an activation interrupted by a crash
        #[arg(long)]
        recover: bool,
    },

    /// Add package tarballs (<name>--<version>.tar.xz) to the repository
    Add {
        #[arg(required = true)]
        tarballs: Vec<PathBuf>,
    },

    /// Remove packages from the repository
    Remove {
        /// Package ids (name--version); active packages are refused
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// First activation on a host from its machine configuration
    Setup {
        /// Remote repository to fetch the active list and packages from
        #[arg(long)]
        repository_url: Option<String>,
    },

    /// Assemble a bootstrap tarball of a complete install
    Bootstrap {
        /// Scratch directory the install tree is built under
        #[arg(long)]
        build_root: PathBuf,

        /// Roles to mark in the tree (may be repeated)
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Package tarballs to install
        #[arg(required = true)]
        packages: Vec<PathBuf>,

        /// Output tarball
        #[arg(long, default_value = "bootstrap.tar.xz")]
        output: PathBuf,
    },

    /// Build the package described by a directory
    Build {
        /// Directory holding buildinfo.json and the build script
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Add the built package to the repository
        #[arg(long)]
        add: bool,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pkgpanda",
            "activate",
            "mesos--0.22.0",
            "--root",
            "/srv/panda",
            "--no-systemd",
        ])
        .unwrap();
        assert_eq!(cli.global.root, Some(PathBuf::from("/srv/panda")));
        assert!(cli.global.no_systemd);
        match cli.command {
            Commands::Activate { ids, recover } => {
                assert_eq!(ids, ["mesos--0.22.0"]);
                assert!(!recover);
            }
            _ => panic!("expected activate"),
        }
    }

    #[test]
    fn test_activate_requires_ids_or_recover() {
        assert!(Cli::try_parse_from(["pkgpanda", "activate"]).is_err());
        assert!(Cli::try_parse_from(["pkgpanda", "activate", "--recover"]).is_ok());
        assert!(Cli::try_parse_from(["pkgpanda", "activate", "a--1", "--recover"]).is_err());
    }
}
