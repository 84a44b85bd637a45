use log::{debug, info};
use plotlib::{
    page::Page,
    repr::Plot,
    style::{PointMarker, PointStyle},
    view::ContinuousView,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gridworld::*;
use crate::solver::*;

#[derive(Clone, Debug)]
pub struct ScenarioReport {
    // Reward placed in the override cell, if any.
    pub reward_override: Option<f64>,
    pub model: GridModel,
    pub value_iteration: Solution,
    pub policy_iteration: Solution,
}

pub fn run_scenario(config: &Config, reward_override: Option<f64>) -> Result<ScenarioReport> {
    let model = config.model(reward_override)?;
    debug!(
        "solving {}x{} grid, discount {}, {:?}",
        config.grid_size(),
        config.grid_size(),
        model.discount(),
        model.transitions()
    );

    let value_iteration = value_iteration(&model, &config.solver)?;
    let policy_iteration = policy_iteration(&model, &config.solver)?;
    info!(
        "r = {:?}: value iteration took {} sweeps, policy iteration {} rounds ({} sweeps)",
        reward_override,
        value_iteration.sweeps,
        policy_iteration.rounds,
        policy_iteration.sweeps
    );

    debug!(
        "r = {:?}: policies {:?} / {:?}",
        reward_override,
        policy_tokens(&value_iteration.policy),
        policy_tokens(&policy_iteration.policy)
    );

    Ok(ScenarioReport {
        reward_override,
        model,
        value_iteration,
        policy_iteration,
    })
}

// Solves every scenario of the configuration with both algorithms.
pub fn run_scenarios(config: &Config) -> Result<Vec<ScenarioReport>> {
    config
        .scenarios()
        .into_iter()
        .map(|reward_override| run_scenario(config, reward_override))
        .collect()
}

fn print_solution(title: &str, solution: &Solution, model: &GridModel) {
    println!("{}", title);
    println!("Values:");
    print_grid_state_values(&solution.values);
    println!("Policy:");
    print_grid_policy(&solution.policy, model);
}

pub fn print_report(report: &ScenarioReport) {
    let label = match report.reward_override {
        Some(reward) => format!(" for r = {}", reward),
        None => String::new(),
    };

    print_solution(
        &format!(
            "Value Iteration{} ({} sweeps):",
            label, report.value_iteration.sweeps
        ),
        &report.value_iteration,
        &report.model,
    );
    println!("{}", "-".repeat(20));
    print_solution(
        &format!(
            "Policy Iteration{} ({} rounds):",
            label, report.policy_iteration.rounds
        ),
        &report.policy_iteration,
        &report.model,
    );
    println!("{}", "=".repeat(20));
}

// Smallest and largest value, widened when they coincide so the axis is not empty.
fn padded_range<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo < hi {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

// Renders the optimal value of `cell` against the override reward as a text plot.
pub fn plot_cell_values(reports: &[ScenarioReport], cell: State) -> Result<String> {
    let mut values = Vec::new();
    for report in reports {
        if !report.model.is_valid(cell) {
            return Err(Error::OutOfBounds {
                row: cell.row,
                col: cell.col,
                size: report.model.size(),
            });
        }
        if let Some(reward) = report.reward_override {
            values.push((reward, report.value_iteration.values[cell.index()]));
        }
    }

    if values.is_empty() {
        return Err(Error::Render(
            "no reward overrides to plot against".to_string(),
        ));
    }

    let (x_min, x_max) = padded_range(values.iter().map(|(x, _)| *x));
    let (y_min, y_max) = padded_range(values.iter().map(|(_, y)| *y));

    let s1 = Plot::new(values).point_style(PointStyle::new().marker(PointMarker::Circle));
    let v = ContinuousView::new()
        .add(s1)
        .x_range(x_min, x_max)
        .y_range(y_min, y_max)
        .x_label("Reward")
        .y_label(format!("Value at {}", cell));
    Page::single(&v)
        .dimensions(100, 50)
        .to_text()
        .map_err(|e| Error::Render(e.to_string()))
}
