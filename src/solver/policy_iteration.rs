use log::{debug, trace, warn};

use super::*;

fn check_policy_shape(model: &GridModel, policy: &Policy) -> Result<()> {
    let size = model.size();
    if policy.shape() != (size, size) {
        return Err(Error::InvalidModel(format!(
            "policy is {}x{}, expected {}x{}",
            policy.nrows(),
            policy.ncols(),
            size,
            size
        )));
    }
    Ok(())
}

// Computes the state values of following `policy` with the Bellman expectation backup
//   V(s) ← ∑ p(s'|s, π(s))∙[R(s') + γ∙V(s')]
// and returns them with the number of sweeps it took.
pub fn policy_evaluation(
    model: &GridModel,
    policy: &Policy,
    settings: &SolverSettings,
) -> Result<(ValueFunction, usize)> {
    check_policy_shape(model, policy)?;

    let mut values = model.initial_values();
    let sweeps = sweep_until_stable(
        model,
        settings,
        "policy evaluation",
        &mut values,
        |state, current_values| {
            model.expected_value(state, policy[state.index()], current_values)
        },
    )?;

    Ok((values, sweeps))
}

// Makes a policy greedy with respect to the state values.
pub fn policy_improvement(
    model: &GridModel,
    values: &ValueFunction,
    settings: &SolverSettings,
) -> Result<Policy> {
    let size = model.size();
    let mut policy = Policy::from_element(size, size, Action::Up);
    for state in model.states() {
        policy[state.index()] = greedy_action(model, state, values, settings.tie_tolerance)?.0;
    }
    Ok(policy)
}

// Largest error a converged evaluation may leave in the difference of two action values.
fn evaluation_margin(model: &GridModel, settings: &SolverSettings) -> f64 {
    let discount = model.discount();
    let bound = 2.0 * settings.theta * discount / (1.0 - discount);
    bound.max(settings.tie_tolerance)
}

// Greedy improvement that keeps the current action of a state unless another
// action is better by more than `margin`.
fn improve_policy(
    model: &GridModel,
    values: &ValueFunction,
    policy: &Policy,
    margin: f64,
    settings: &SolverSettings,
) -> Result<Policy> {
    let mut improved = policy.clone();
    for state in model.states() {
        let idx = state.index();
        let (best_action, best_value) =
            greedy_action(model, state, values, settings.tie_tolerance)?;
        let current_value = model.expected_value(state, policy[idx], values)?;
        // A NaN current value always gives way to a comparable best action.
        let gain = best_value - current_value;
        if gain > margin || gain.is_nan() {
            improved[idx] = best_action;
        }
    }
    Ok(improved)
}

// Alternates policy evaluation and greedy improvement until the policy stops changing.
// The returned policy is greedy with respect to the returned values.
pub fn policy_iteration(model: &GridModel, settings: &SolverSettings) -> Result<Solution> {
    let mut policy = initial_policy(model, &settings.initial_policy)?;
    let margin = evaluation_margin(model, settings);
    let mut sweeps = 0;

    for round in 1..=settings.max_policy_iterations {
        let (values, evaluation_sweeps) = policy_evaluation(model, &policy, settings)?;
        sweeps += evaluation_sweeps;

        let new_policy = improve_policy(model, &values, &policy, margin, settings)?;
        if new_policy == policy {
            debug!(
                "policy iteration: policy stable after {} rounds ({} sweeps)",
                round, sweeps
            );
            let policy = policy_improvement(model, &values, settings)?;
            return Ok(Solution {
                values,
                policy,
                sweeps,
                rounds: round,
            });
        }

        trace!(
            "policy iteration: round {} changed {} states",
            round,
            policy
                .iter()
                .zip(new_policy.iter())
                .filter(|(a, b)| a != b)
                .count()
        );
        policy = new_policy;
    }

    warn!(
        "policy iteration: policy still changing after {} rounds",
        settings.max_policy_iterations
    );
    Err(Error::NonConvergence {
        algorithm: "policy iteration",
        iterations: settings.max_policy_iterations,
    })
}
