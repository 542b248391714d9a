#![warn(missing_docs)]
//! cli argument parser module

use std::path::PathBuf;

use clap::Parser;

/// Structure containing all the flags and arguments that can be passed to
/// binary from a shell.
#[derive(Debug, Parser)]
#[clap(version, author, about)]
pub struct Cli {
    /// Specify the configuration file to use, all settings default if not
    /// given
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Dump the default configuration to stdout and exit
    #[arg(long)]
    pub dump_default: bool,

    /// Maximum number of sweeps, overrides the configuration file
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Seed for the dropout random number generator, overrides the
    /// configuration file
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use a huber loss for the height measurements, with the transition
    /// measured in standard deviations
    #[arg(long, value_name = "TRANSITION")]
    pub huber: Option<f64>,

    /// Also print the standard deviation of every fitted height
    #[arg(long)]
    pub covariances: bool,

    /// Print the verbose summary of the factorgraph after solving
    #[arg(short, long)]
    pub verbose: bool,
}
