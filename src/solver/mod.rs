pub mod policy_iteration;
pub mod value_iteration;

use log::{debug, trace, warn};
use rand::prelude::*;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gridworld::*;

pub use policy_iteration::{policy_evaluation, policy_improvement, policy_iteration};
pub use value_iteration::value_iteration;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialPolicy {
    // Uniformly random action per cell, reproducible through the seed.
    Random { seed: u64 },
    // The same action in every cell.
    Fixed { action: Action },
    // One row of action tokens per grid row.
    Explicit { rows: Vec<String> },
}

impl Default for InitialPolicy {
    fn default() -> InitialPolicy {
        InitialPolicy::Random { seed: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    // Sweeps stop once the largest change of any state value drops below theta.
    pub theta: f64,
    // Caps a single value iteration or policy evaluation run.
    pub max_sweeps: usize,
    // Caps the number of evaluate/improve rounds of policy iteration.
    pub max_policy_iterations: usize,
    // Back up every state from the previous sweep's values instead of updating in place.
    pub synchronous: bool,
    // Action values closer than this are considered equal and the first action in
    // the fixed order wins. Only meant to absorb float noise.
    pub tie_tolerance: f64,
    pub initial_policy: InitialPolicy,
}

impl Default for SolverSettings {
    fn default() -> SolverSettings {
        SolverSettings {
            theta: 1e-6,
            max_sweeps: 100_000,
            max_policy_iterations: 1_000,
            synchronous: false,
            tie_tolerance: 1e-12,
            initial_policy: InitialPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub values: ValueFunction,
    pub policy: Policy,
    // Total number of Bellman sweeps performed.
    pub sweeps: usize,
    // Evaluate/improve rounds; zero for value iteration.
    pub rounds: usize,
}

// Returns the greedy action in `state` together with the best action value.
// The first action in `Action::ALL` whose value is within `tie_tolerance` of the
// best one is chosen, so equally good actions resolve deterministically.
fn greedy_action(
    model: &GridModel,
    state: State,
    values: &ValueFunction,
    tie_tolerance: f64,
) -> Result<(Action, f64)> {
    let mut action_values = [0.0; 4];
    for (action_value, action) in action_values.iter_mut().zip(Action::ALL.iter()) {
        *action_value = model.expected_value(state, *action, values)?;
    }

    // NaN values are skipped by f64::max.
    let best_value = action_values
        .iter()
        .fold(f64::NEG_INFINITY, |a, b| a.max(*b));

    Action::ALL
        .iter()
        .zip(action_values.iter())
        .find(|(_, value)| **value >= best_value - tie_tolerance)
        .map(|(action, _)| (*action, best_value))
        .ok_or(Error::NoActionFound {
            row: state.row,
            col: state.col,
        })
}

// Repeats Bellman sweeps over all non-terminal states in row-major order until
// the largest change in state values drops below `settings.theta`.
// `backup` computes the new value of a state from the given value function.
// Returns the number of sweeps performed.
fn sweep_until_stable<F>(
    model: &GridModel,
    settings: &SolverSettings,
    algorithm: &'static str,
    values: &mut ValueFunction,
    mut backup: F,
) -> Result<usize>
where
    F: FnMut(State, &ValueFunction) -> Result<f64>,
{
    for sweep in 1..=settings.max_sweeps {
        // Synchronous sweeps read from a frozen copy of the previous sweep.
        let snapshot = if settings.synchronous {
            Some(values.clone())
        } else {
            None
        };

        let mut max_delta: f64 = 0.0;
        for state in model.states() {
            if model.is_terminal(state) {
                continue;
            }

            let new_value = match &snapshot {
                Some(prev_values) => backup(state, prev_values)?,
                None => backup(state, values)?,
            };

            let idx = state.index();
            let delta = (values[idx] - new_value).abs();
            // A NaN delta never converges.
            if delta.is_nan() || delta > max_delta {
                max_delta = delta;
            }
            values[idx] = new_value;
        }

        trace!("{}: sweep {} max delta {}", algorithm, sweep, max_delta);
        if max_delta < settings.theta {
            debug!("{}: converged after {} sweeps", algorithm, sweep);
            return Ok(sweep);
        }
    }

    warn!(
        "{}: no convergence within {} sweeps",
        algorithm, settings.max_sweeps
    );
    Err(Error::NonConvergence {
        algorithm,
        iterations: settings.max_sweeps,
    })
}

fn initial_policy(model: &GridModel, initial: &InitialPolicy) -> Result<Policy> {
    let size = model.size();
    match initial {
        InitialPolicy::Random { seed } => {
            let rng = &mut StdRng::seed_from_u64(*seed);
            let mut policy = Policy::from_element(size, size, Action::Up);
            for state in model.states() {
                policy[state.index()] = *Action::ALL.choose(rng).ok_or(Error::NoActionFound {
                    row: state.row,
                    col: state.col,
                })?;
            }
            Ok(policy)
        }
        InitialPolicy::Fixed { action } => Ok(Policy::from_element(size, size, *action)),
        InitialPolicy::Explicit { rows } => parse_policy(rows, size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(transitions: TransitionModel) -> GridModel {
        GridModel::from_rows(
            &[
                vec![100.0, -1.0, 10.0],
                vec![-1.0, -1.0, -1.0],
                vec![-1.0, -1.0, -1.0],
            ],
            0.99,
            transitions,
        )
        .unwrap()
    }

    #[test]
    fn greedy_action_prefers_first_of_equal_actions() {
        let grid = model(TransitionModel::Deterministic);
        let values = grid.initial_values();
        // Up and Left both bounce back into the corner.
        let (action, value) = greedy_action(&grid, State::new(0, 0), &values, 0.0).unwrap();
        assert_eq!(action, Action::Up);
        assert_eq!(value, 100.0);

        // From (0, 2) Up and Right bounce; Left reaches -1.
        let (action, value) = greedy_action(&grid, State::new(0, 2), &values, 0.0).unwrap();
        assert_eq!(action, Action::Up);
        assert_eq!(value, 10.0);
    }

    #[test]
    fn greedy_action_takes_marginally_better_action() {
        let grid = model(TransitionModel::Deterministic);
        let mut values = grid.initial_values();
        // Make Right from (1, 1) marginally better than Up.
        values[(0, 1)] = 1.0;
        values[(1, 2)] = 1.0 + 1e-6;
        let tie_tolerance = SolverSettings::default().tie_tolerance;
        let (action, _) = greedy_action(&grid, State::new(1, 1), &values, tie_tolerance).unwrap();
        assert_eq!(action, Action::Right);

        // A wide tolerance turns the difference into a tie.
        let (action, _) = greedy_action(&grid, State::new(1, 1), &values, 1e-3).unwrap();
        assert_eq!(action, Action::Up);
    }

    #[test]
    fn greedy_action_fails_without_comparable_values() {
        let grid = GridModel::from_rows(&[vec![f64::NAN]], 0.9, TransitionModel::Deterministic)
            .unwrap();
        let values = grid.initial_values();
        assert!(matches!(
            greedy_action(&grid, State::new(0, 0), &values, 1e-3),
            Err(Error::NoActionFound { row: 0, col: 0 })
        ));
    }

    #[test]
    fn random_initial_policy_is_reproducible() {
        let grid = model(TransitionModel::default());
        let first = initial_policy(&grid, &InitialPolicy::Random { seed: 42 }).unwrap();
        let second = initial_policy(&grid, &InitialPolicy::Random { seed: 42 }).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.shape(), (3, 3));
    }

    #[test]
    fn fixed_and_explicit_initial_policies() {
        let grid = model(TransitionModel::default());
        let fixed = initial_policy(
            &grid,
            &InitialPolicy::Fixed {
                action: Action::Left,
            },
        )
        .unwrap();
        assert!(fixed.iter().all(|a| *a == Action::Left));

        let rows = vec!["RRU".to_string(), "UUU".to_string(), "UUU".to_string()];
        let explicit = initial_policy(&grid, &InitialPolicy::Explicit { rows }).unwrap();
        assert_eq!(explicit[(0, 0)], Action::Right);
        assert_eq!(explicit[(1, 1)], Action::Up);

        let short = vec!["RRU".to_string()];
        assert!(matches!(
            initial_policy(&grid, &InitialPolicy::Explicit { rows: short }),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn sweep_cap_reports_non_convergence() {
        let grid = model(TransitionModel::default());
        let settings = SolverSettings {
            max_sweeps: 3,
            ..SolverSettings::default()
        };
        let mut values = grid.initial_values();
        let result = sweep_until_stable(&grid, &settings, "test", &mut values, |state, v| {
            greedy_action(&grid, state, v, 0.0).map(|(_, value)| value)
        });
        assert!(matches!(
            result,
            Err(Error::NonConvergence {
                algorithm: "test",
                iterations: 3
            })
        ));
    }
}
