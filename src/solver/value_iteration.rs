use log::debug;

use super::*;

// Solves the model by repeatedly applying the Bellman optimality backup
//   V(s) ← max_a ∑ p(s'|s, a)∙[R(s') + γ∙V(s')]
// until the state values stop changing. The policy records the greedy action of
// the last backup of each state.
pub fn value_iteration(model: &GridModel, settings: &SolverSettings) -> Result<Solution> {
    let size = model.size();
    let mut values = model.initial_values();
    let mut policy = Policy::from_element(size, size, Action::Up);

    let sweeps = sweep_until_stable(
        model,
        settings,
        "value iteration",
        &mut values,
        |state, current_values| {
            let (action, value) =
                greedy_action(model, state, current_values, settings.tie_tolerance)?;
            policy[state.index()] = action;
            Ok(value)
        },
    )?;

    // Terminal cells are never backed up.
    for state in model.states().filter(|s| model.is_terminal(*s)) {
        policy[state.index()] = greedy_action(model, state, &values, settings.tie_tolerance)?.0;
    }

    debug!(
        "value iteration: {}x{} grid solved in {} sweeps",
        size, size, sweeps
    );

    Ok(Solution {
        values,
        policy,
        sweeps,
        rounds: 0,
    })
}
