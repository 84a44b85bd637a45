mod config;
mod driver;
mod error;
mod gridworld;
mod solver;

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use config::Config;
use error::Result;
use gridworld::TransitionModel;
use solver::InitialPolicy;

/// Solves grid world MDPs with value iteration and policy iteration.
#[derive(Debug, Parser)]
struct Args {
    /// TOML file describing the grid, rewards and solver settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Discount factor in (0, 1)
    #[arg(long)]
    discount: Option<f64>,

    /// Always take the intended move instead of slipping sideways
    #[arg(long)]
    deterministic: bool,

    /// Back up states from the previous sweep instead of in place
    #[arg(long)]
    synchronous: bool,

    /// Convergence threshold on the largest value change per sweep
    #[arg(long)]
    theta: Option<f64>,

    /// Seed of the random initial policy of policy iteration
    #[arg(long)]
    seed: Option<u64>,

    /// Rewards to place in the override cell, one scenario each
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    rewards: Vec<f64>,

    /// Plot the plot cell's value against the override rewards
    #[arg(long)]
    plot: bool,

    /// Incremental verbosity (`-v`, `-vv`, `-vvv`)
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(discount) = self.discount {
            config.discount = discount;
        }
        if self.deterministic {
            config.transitions = TransitionModel::Deterministic;
        }
        if self.synchronous {
            config.solver.synchronous = true;
        }
        if let Some(theta) = self.theta {
            config.solver.theta = theta;
        }
        if let Some(seed) = self.seed {
            config.solver.initial_policy = InitialPolicy::Random { seed };
        }
        if !self.rewards.is_empty() {
            config.override_values = self.rewards.clone();
        }
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Info);
        }
        2 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    let reports = driver::run_scenarios(&config)?;
    for report in &reports {
        driver::print_report(report);
    }

    if args.plot {
        println!("{}", driver::plot_cell_values(&reports, config.plot_cell)?);
    }

    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "gridworld_dp",
            "--deterministic",
            "--synchronous",
            "--discount",
            "0.9",
            "--seed",
            "3",
            "--rewards=-3,0,2.5",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.transitions, TransitionModel::Deterministic);
        assert!(config.solver.synchronous);
        assert_eq!(config.discount, 0.9);
        assert_eq!(config.solver.initial_policy, InitialPolicy::Random { seed: 3 });
        assert_eq!(config.override_values, vec![-3.0, 0.0, 2.5]);
    }

    #[test]
    fn no_flags_keep_defaults() {
        let args = Args::parse_from(["gridworld_dp"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config, Config::default());
    }
}
