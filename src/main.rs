// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! nh CLI - Nix helper

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use nh::age::UnknownAgePolicy;
use nh::commands;
use nh::commands::gcr_clean::GcrCleanArgs;
use nh::commands::rebuild::{RebuildAction, RebuildArgs};
use nh::commands::search::SearchArgs;
use nh::commands::update::UpdateArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nh")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NH_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GcrCleanCli {
    /// Remove roots registered before this time (e.g. "7 days ago", "2024-01-31")
    #[arg(long)]
    age: Option<String>,

    /// Report what would be removed without removing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Directory to scan (defaults to the home directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Only inspect direct children of the root
    #[arg(long)]
    shallow: bool,

    /// What to do with roots that have no registration record
    #[arg(long, value_enum)]
    unknown: Option<UnknownAgePolicy>,
}

impl GcrCleanCli {
    fn with_json(self, json: bool) -> GcrCleanArgs {
        GcrCleanArgs {
            age: self.age,
            dry_run: self.dry_run,
            root: self.root,
            shallow: self.shallow,
            unknown: self.unknown,
            json,
        }
    }
}

#[derive(clap::Args)]
struct UpdateCli {
    /// Nix file or directory
    #[arg(env = "FLAKE")]
    path: PathBuf,

    /// Recurse through a directory
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Print commands and exit
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Only update this flake input
    #[arg(short, long)]
    input: Option<String>,
}

impl From<UpdateCli> for UpdateArgs {
    fn from(cli: UpdateCli) -> Self {
        Self {
            path: cli.path,
            recursive: cli.recursive,
            dry_run: cli.dry_run,
            input: cli.input,
        }
    }
}

#[derive(clap::Args)]
struct RebuildCli {
    /// Flake directory (or flake.nix) to build
    #[arg(env = "FLAKE")]
    flake: PathBuf,

    /// Print commands and exit
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Host attribute to build instead of the machine hostname
    #[arg(short = 'H', long)]
    hostname: Option<String>,

    /// Update flake inputs before building
    #[arg(short, long)]
    update: bool,

    /// Ask for confirmation before activating
    #[arg(short, long)]
    ask: bool,

    /// Extra arguments forwarded to nix build
    #[arg(last = true)]
    extra_args: Vec<String>,
}

impl From<RebuildCli> for RebuildArgs {
    fn from(cli: RebuildCli) -> Self {
        Self {
            flake: cli.flake,
            dry_run: cli.dry_run,
            hostname: cli.hostname,
            update: cli.update,
            ask: cli.ask,
            extra_args: cli.extra_args,
        }
    }
}

#[derive(clap::Args)]
struct SearchCli {
    /// Filter instead of opening the picker
    query: Option<String>,

    /// Flake to search in
    #[arg(long)]
    flake: Option<String>,

    /// Maximum number of results
    #[arg(long)]
    max_results: Option<usize>,

    /// Rebuild the cached package list
    #[arg(long)]
    refresh: bool,
}

impl SearchCli {
    fn with_json(self, json: bool) -> SearchArgs {
        SearchArgs {
            query: self.query,
            flake: self.flake,
            max_results: self.max_results,
            refresh: self.refresh,
            json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find gcroots under a directory and remove those older than a cutoff
    GcrClean(GcrCleanCli),

    /// Update a flake or any nix file using remote fetchers
    Update(UpdateCli),

    /// Build and activate, and make it the boot default
    Switch(RebuildCli),

    /// Build and make it the boot default
    Boot(RebuildCli),

    /// Build and activate
    Test(RebuildCli),

    /// Build only, showing the diff against the running system
    Build(RebuildCli),

    /// Search packages, interactively when no query is given
    Search(SearchCli),

    /// Load a flake into nix repl
    Repl {
        /// Flake directory or file
        #[arg(env = "FLAKE")]
        path: PathBuf,
    },

    /// Show the effective configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = nh::config::load(cli.config.as_deref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    // Execute command
    match cli.command {
        Commands::GcrClean(args) => commands::gcr_clean::run(&config, args.with_json(cli.json)),
        Commands::Update(args) => commands::update::run(&config, args.into()),
        Commands::Switch(args) => {
            commands::rebuild::run(&config, RebuildAction::Switch, args.into())
        }
        Commands::Boot(args) => commands::rebuild::run(&config, RebuildAction::Boot, args.into()),
        Commands::Test(args) => commands::rebuild::run(&config, RebuildAction::Test, args.into()),
        Commands::Build(args) => {
            commands::rebuild::run(&config, RebuildAction::Build, args.into())
        }
        Commands::Search(args) => commands::search::run(&config, args.with_json(cli.json)),
        Commands::Repl { path } => commands::repl::run(&path),
        Commands::Config => commands::config::run(&config),
        Commands::Completions { shell } => commands::completions::run(shell, &mut Cli::command()),
    }
}
