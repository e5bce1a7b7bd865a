//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod cache;
mod index;
mod run;
mod sequences;

use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::assets::{Activity, PetState};
use crate::config::{load_config, merge_cli_overrides, CliOverrides, ConfigError, DeskpetConfig};
use crate::sheet::LoadStrategy;

pub use run::{parse_script, ScriptedEvent};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Deskpet - sprite-sheet pipeline and animation engine for desktop pets
#[derive(Parser)]
#[command(name = "deskpet")]
#[command(about = "Deskpet - index pet animations, pack sprite sheets and play them")]
#[command(version)]
pub struct Cli {
    /// Path to deskpet.toml (default: discovered from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Application root holding the asset pack
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover and list indexed animation folders
    Index {
        /// Only list this activity
        #[arg(long, value_enum)]
        activity: Option<Activity>,

        /// Only list this pet state
        #[arg(long, value_enum)]
        state: Option<PetState>,
    },
    /// Pack sprite sheet caches for every animation folder
    Cache {
        /// Cell size frames are rescaled to
        #[arg(long)]
        cell_size: Option<u32>,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Rebuild every atlas
        #[arg(long)]
        force: bool,
    },
    /// List animation sequences with their frame count and duration
    Sequences {
        /// Only list sequences whose name matches this glob
        #[arg(long)]
        name: Option<String>,
    },
    /// Export a sequence as an animated GIF
    Preview {
        /// Glob matching the sequence name; the first match is exported
        name: String,

        /// Output file
        #[arg(short, long, default_value = "preview.gif")]
        output: PathBuf,

        /// Frame size in pixels
        #[arg(long, default_value = "200")]
        size: u32,
    },
    /// Run the pet headless for a while
    Run {
        /// Time to run before shutting down, after loading
        #[arg(long, default_value = "5000")]
        duration_ms: u64,

        /// Scripted interactions, e.g. "touch-head@500,drag@1200,drop@2500"
        #[arg(long)]
        script: Option<String>,

        /// Write every rendered frame as PNG into this directory
        #[arg(long)]
        dump_dir: Option<PathBuf>,

        /// Frame size in pixels
        #[arg(long, default_value = "200")]
        size: u32,

        /// How atlases are loaded
        #[arg(long, value_enum)]
        load_strategy: Option<LoadStrategy>,
    },
}

/// Initialize logging; `verbose` lowers the default filter to debug.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    // A second initialization (e.g. in tests) keeps the first logger.
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level)).try_init();
}

/// Load the configuration and apply command-line overrides.
fn load_settings(cli: &Cli, mut overrides: CliOverrides) -> Result<DeskpetConfig, ExitCode> {
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(ConfigError::Validation(errors)) => {
            for error in errors {
                eprintln!("Error: {}", error);
            }
            return Err(ExitCode::from(EXIT_INVALID_ARGS));
        }
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return Err(ExitCode::from(EXIT_ERROR));
        }
    };
    overrides.root = cli.root.clone();
    overrides.cache_dir = cli.cache_dir.clone();
    merge_cli_overrides(&mut config, &overrides);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in errors {
            eprintln!("Error: {}", error);
        }
        return Err(ExitCode::from(EXIT_INVALID_ARGS));
    }
    Ok(config)
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let overrides = match &cli.command {
        Commands::Cache { cell_size, jobs, .. } => CliOverrides {
            cell_size: *cell_size,
            jobs: *jobs,
            ..Default::default()
        },
        Commands::Run { load_strategy, .. } => CliOverrides {
            load_strategy: *load_strategy,
            ..Default::default()
        },
        _ => CliOverrides::default(),
    };
    let config = match load_settings(&cli, overrides) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match cli.command {
        Commands::Index { activity, state } => index::run_index(&config, activity, state),
        Commands::Cache { force, .. } => cache::run_cache(&config, force),
        Commands::Sequences { name } => sequences::run_sequences(&config, name.as_deref()),
        Commands::Preview { name, output, size } => {
            sequences::run_preview(&config, &name, &output, size)
        }
        Commands::Run {
            duration_ms,
            script,
            dump_dir,
            size,
            ..
        } => run::run_pet(&config, duration_ms, script.as_deref(), dump_dir.as_deref(), size),
    }
}
