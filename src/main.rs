//! # mend CLI
//!
//! The `mend` binary repairs known defects in installed or generated
//! source files before a native build step runs.
//!
//! ## Usage
//!
//! ```bash
//! mend --config ./mend.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mend apply` | Locate, rewrite, back up, commit and verify every target |
//! | `mend verify` | Read-only marker check over every candidate |
//! | `mend locate` | Show every probed path and the candidates found |
//! | `mend inspect` | Print the head of each candidate with its marker status |
//! | `mend balance <FILE>` | Close unbalanced `{` in one file |
//! | `mend targets` | Table of configured targets and their state |
//!
//! ## Exit codes
//!
//! `0` for success and for every recoverable condition (nothing found, no
//! network, marker missing, isolated write failures); `2` when a required
//! known-good source is unavailable, or `verify --strict` finds no marker;
//! `1` for unreadable or invalid configuration.

use clap::{Parser, Subcommand};
use mend::config::{self, Config};
use mend::narrate::NarrateMode;
use mend::patch::{self, ApplyOptions};
use mend::{inspect, targets};
use std::path::PathBuf;
use std::process::ExitCode;

/// mend: best-effort, idempotent source patching for build pipelines.
#[derive(Parser)]
#[command(
    name = "mend",
    about = "Best-effort, idempotent source patching and verification",
    version,
    long_about = "mend locates files inside installed packages and source trees, applies \
    idempotent textual rewrites from a declarative rule table, backs up originals once, \
    and verifies the result through post-condition markers. Failures are recorded in a \
    diagnostics directory instead of failing the build."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./mend.toml")]
    config: PathBuf,

    /// How to narrate decisions: human lines, JSON events, or nothing.
    #[arg(long, global = true, value_enum, default_value = "human")]
    narrate: NarrateMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for every (or the selected) target.
    Apply {
        /// Only process this target. Repeatable.
        #[arg(long = "target")]
        targets: Vec<String>,

        /// Rewrite in memory and report, without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Extra override path, probed before all other strategies. Repeatable.
        #[arg(long = "path")]
        paths: Vec<PathBuf>,
    },

    /// Check every candidate for a marker without modifying anything.
    Verify {
        #[arg(long = "target")]
        targets: Vec<String>,

        /// Exit 2 when a target has no marker anywhere.
        #[arg(long)]
        strict: bool,
    },

    /// Show where each target was looked for and what was found.
    Locate {
        #[arg(long = "target")]
        targets: Vec<String>,
    },

    /// Print the first lines of every candidate with checksum and marker status.
    Inspect {
        #[arg(long = "target")]
        targets: Vec<String>,

        /// Number of lines to print per file.
        #[arg(long, default_value = "40")]
        lines: usize,
    },

    /// Append closing braces to a file with unmatched `{`.
    ///
    /// Comments and string literals are ignored when counting. The original
    /// is backed up to `<FILE>.bak` before the first write.
    Balance {
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,
    },

    /// List configured targets, their candidates and patch state.
    Targets,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let narrator = cli.narrate.narrator();

    let cfg = match cli.command {
        // Works without a config file; one is only used for the diagnostics dir.
        Commands::Balance { .. } => {
            config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal())
        }
        _ => config::load_config(&cli.config)?,
    };

    let code = match cli.command {
        Commands::Apply {
            targets,
            dry_run,
            paths,
        } => {
            let options = ApplyOptions {
                targets,
                dry_run,
                paths,
            };
            let report = patch::run_apply(&cfg, &options, narrator.as_ref())?;
            report.status.exit_code()
        }
        Commands::Verify { targets, strict } => {
            let report = patch::run_verify(&cfg, &targets, narrator.as_ref())?;
            if strict && report.unverified().next().is_some() {
                2
            } else {
                report.status.exit_code()
            }
        }
        Commands::Locate { targets } => {
            patch::run_locate(&cfg, &targets, narrator.as_ref())?;
            0
        }
        Commands::Inspect { targets, lines } => {
            inspect::run_inspect(&cfg, &targets, lines)?;
            0
        }
        Commands::Targets => {
            targets::list_targets(&cfg)?;
            0
        }
        Commands::Balance { file, dry_run } => {
            patch::run_balance(&cfg, &file, dry_run, narrator.as_ref())?;
            0
        }
    };

    Ok(ExitCode::from(code))
}
