//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's
//! derive macros. It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Zeroseg -- zero-trust network microsegmentation.
///
/// Use `zeroseg <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "zeroseg", version, about, long_about = None)]
pub struct Cli {
    /// Path to the zeroseg.toml configuration file.
    #[arg(short, long, default_value = "zeroseg.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, validate, compile, and enforce network policies.
    Enforce(EnforceArgs),

    /// Load and validate policies without enforcing them.
    Validate(ValidateArgs),
}

// ---- enforce ----

/// Enforce every policy document in a file.
#[derive(Args, Debug)]
pub struct EnforceArgs {
    /// Path to the policy YAML file.
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Override the cgroup path to attach to (kernel backend only).
    #[arg(long)]
    pub cgroup: Option<PathBuf>,

    /// Use the permissive filter variant (staged rollout/testing only).
    #[arg(long)]
    pub permissive: bool,

    /// Path to a static service inventory file for label resolution (TOML).
    #[arg(long)]
    pub inventory: Option<PathBuf>,
}

// ---- validate ----

/// Validate policy documents without enforcing them.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the policy YAML file.
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}
