//! Fit a piecewise linear function to noisy height measurements with gaussian
//! belief propagation, and print the fitted heights.

pub mod cli;
pub mod line;
pub mod logger;
pub mod models;

use clap::Parser;
use gbp_config::Config;
use gbp_solver::loss::HuberLoss;

use crate::line::{LineFitting, MEASUREMENTS};

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    if cli.dump_default {
        println!("{}", toml::to_string_pretty(&Config::default())?);
        return Ok(());
    }

    logger::init_logger(tracing::Level::INFO);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("reading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(iterations) = cli.iterations {
        config.solve.max_iterations = iterations;
    }
    if let Some(seed) = cli.seed {
        config.gbp.seed = Some(seed);
    }

    let huber = cli
        .huber
        .map(|transition| {
            HuberLoss::new(transition)
                .ok_or_else(|| anyhow::anyhow!("huber transition must be positive, got {transition}"))
        })
        .transpose()?;

    let problem = LineFitting {
        huber,
        ..Default::default()
    };
    let mut graph = problem.build(&MEASUREMENTS)?;
    let report = graph.solve(&config.gbp, &config.solve)?;

    if report.converged() {
        tracing::info!(
            "converged after {} iterations, energy: {:.5}",
            report.iterations,
            report.energy
        );
    } else {
        tracing::warn!(
            "not converged after {} iterations, energy: {:.5}",
            report.iterations,
            report.energy
        );
    }

    println!("{}", graph.summary(cli.verbose));

    let fitted = LineFitting::fitted(&graph)?;
    for (x, (height, std)) in problem.anchors.iter().zip(fitted) {
        if cli.covariances {
            println!("x = {x:>6.3}    height = {height:>7.4} ± {std:.4}");
        } else {
            println!("x = {x:>6.3}    height = {height:>7.4}");
        }
    }

    Ok(())
}
