// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Flag shared by every command
fn global_flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .global(true)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn global_path(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .global(true)
        .value_name("PATH")
        .help(help)
}

fn ids_arg() -> Arg {
    Arg::new("ids")
        .num_args(1..)
        .value_name("ID")
        .help("Package ids (name--version)")
}

fn build_cli() -> Command {
    Command::new("pkgpanda")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pkgpanda Contributors")
        .about("Host-local package manager with crash-safe atomic activation")
        .subcommand_required(true)
        .arg(global_path("root", "Install root holding the active packages (default: /opt/mesosphere)"))
        .arg(global_path(
            "config-dir",
            "Machine configuration directory: roles, setup flags (default: /etc/mesosphere)",
        ))
        .arg(global_path("repository", "Local package repository (default: /opt/mesosphere/packages)"))
        .arg(global_flag(
            "rooted-systemd",
            "Use <root>/dcos.target.wants rather than /etc/systemd/system/dcos.target.wants",
        ))
        .arg(global_flag("no-systemd", "Do not stop or start systemd units"))
        .arg(global_flag("no-block-systemd", "Queue systemd jobs without waiting for them"))
        .arg(global_path(
            "config",
            "Configuration file (default: /etc/pkgpanda/pkgpanda.toml if present)",
        ))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .subcommand(Command::new("list").about("List packages in the local repository"))
        .subcommand(Command::new("active").about("List the active packages"))
        .subcommand(
            Command::new("fetch")
                .about("Download packages from a remote repository into the local one")
                .arg(ids_arg().required(true))
                .arg(Arg::new("repository-url").long("repository-url").help("Base URL of the remote repository")),
        )
        .subcommand(
            Command::new("activate")
                .about("Make exactly the given packages active")
                .arg(ids_arg())
                .arg(
                    Arg::new("recover")
                        .long("recover")
                        .action(ArgAction::SetTrue)
                        .help("Finish an activation interrupted by a crash"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Add package tarballs (<name>--<version>.tar.xz) to the repository")
                .arg(Arg::new("tarballs").num_args(1..).required(true).value_name("TARBALL")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove packages from the repository; active packages are refused")
                .arg(ids_arg().required(true)),
        )
        .subcommand(
            Command::new("setup")
                .about("First activation on a host from its machine configuration")
                .arg(Arg::new("repository-url").long("repository-url").help("Remote repository to fetch from")),
        )
        .subcommand(
            Command::new("bootstrap")
                .about("Assemble a bootstrap tarball of a complete install")
                .arg(Arg::new("build-root").long("build-root").required(true).help("Scratch directory"))
                .arg(Arg::new("role").long("role").action(ArgAction::Append).help("Role to mark"))
                .arg(Arg::new("output").long("output").default_value("bootstrap.tar.xz"))
                .arg(Arg::new("packages").num_args(1..).required(true).value_name("TARBALL")),
        )
        .subcommand(
            Command::new("build")
                .about("Build the package described by a directory")
                .arg(Arg::new("dir").default_value(".").help("Directory holding buildinfo.json and build"))
                .arg(
                    Arg::new("add")
                        .long("add")
                        .action(ArgAction::SetTrue)
                        .help("Add the built package to the repository"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pkgpanda.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
