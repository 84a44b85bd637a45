use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use prettytable::{Cell, Row, Table};
use serde::Deserialize;

use crate::error::{Error, Result};

const UP: &str = "↑";
const DOWN: &str = "↓";
const LEFT: &str = "←";
const RIGHT: &str = "→";

// Estimated expected discounted return per cell.
pub type ValueFunction = DMatrix<f64>;

// Exactly one action per cell.
pub type Policy = DMatrix<Action>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize)]
#[serde(from = "(i32, i32)")]
pub struct State {
    pub row: i32,
    pub col: i32,
}

impl State {
    pub fn new(row: i32, col: i32) -> State {
        State { row, col }
    }

    fn shifted(self, (d_row, d_col): (i32, i32)) -> State {
        State::new(self.row + d_row, self.col + d_col)
    }

    // Matrix index of the state. Only meaningful for states inside the grid.
    pub fn index(self) -> (usize, usize) {
        (self.row as usize, self.col as usize)
    }
}

impl From<(i32, i32)> for State {
    fn from((row, col): (i32, i32)) -> State {
        State::new(row, col)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize)]
#[serde(try_from = "String")]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    // Fixed enumeration order, also used to break ties between equally good actions.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    // Orthogonal moves the agent may slip into, in the order they are enumerated.
    fn slips(self) -> [(i32, i32); 2] {
        match self {
            Action::Up => [(0, -1), (0, 1)],
            Action::Down => [(0, 1), (0, -1)],
            Action::Left | Action::Right => [(1, 0), (-1, 0)],
        }
    }

    pub fn token(self) -> char {
        match self {
            Action::Up => 'U',
            Action::Down => 'D',
            Action::Left => 'L',
            Action::Right => 'R',
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Action::Up => UP,
            Action::Down => DOWN,
            Action::Left => LEFT,
            Action::Right => RIGHT,
        }
    }
}

impl TryFrom<char> for Action {
    type Error = Error;

    fn try_from(token: char) -> Result<Action> {
        match token {
            'U' => Ok(Action::Up),
            'D' => Ok(Action::Down),
            'L' => Ok(Action::Left),
            'R' => Ok(Action::Right),
            other => Err(Error::InvalidAction(other.to_string())),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Action> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(token), None) => Action::try_from(token),
            _ => Err(Error::InvalidAction(s.to_string())),
        }
    }
}

impl TryFrom<String> for Action {
    type Error = Error;

    fn try_from(s: String) -> Result<Action> {
        s.parse()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionModel {
    // The intended move always happens.
    Deterministic,
    // The intended move happens with probability `intended`, the rest is split
    // evenly between the two orthogonal moves.
    Slip { intended: f64 },
}

impl Default for TransitionModel {
    fn default() -> TransitionModel {
        TransitionModel::Slip { intended: 0.8 }
    }
}

impl TransitionModel {
    fn outcomes(self, action: Action) -> Vec<((i32, i32), f64)> {
        match self {
            TransitionModel::Deterministic => vec![(action.delta(), 1.0)],
            TransitionModel::Slip { intended } => {
                let slip = (1.0 - intended) / 2.0;
                let [first, second] = action.slips();
                vec![(action.delta(), intended), (first, slip), (second, slip)]
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridModel {
    size: usize,
    rewards: DMatrix<f64>,
    terminal: DMatrix<bool>,
    discount: f64,
    transitions: TransitionModel,
}

impl GridModel {
    pub fn new(
        size: usize,
        rewards: DMatrix<f64>,
        discount: f64,
        transitions: TransitionModel,
    ) -> Result<GridModel> {
        if size == 0 {
            return Err(Error::InvalidModel("grid size must be positive".to_string()));
        }
        if rewards.shape() != (size, size) {
            return Err(Error::InvalidModel(format!(
                "reward matrix is {}x{}, expected {}x{}",
                rewards.nrows(),
                rewards.ncols(),
                size,
                size
            )));
        }
        if !(discount > 0.0 && discount < 1.0) {
            return Err(Error::InvalidModel(format!(
                "discount factor must lie in (0, 1), got {}",
                discount
            )));
        }
        if let TransitionModel::Slip { intended } = transitions {
            if !(0.0..=1.0).contains(&intended) {
                return Err(Error::InvalidModel(format!(
                    "intended move probability must lie in [0, 1], got {}",
                    intended
                )));
            }
        }

        Ok(GridModel {
            size,
            rewards,
            terminal: DMatrix::from_element(size, size, false),
            discount,
            transitions,
        })
    }

    pub fn from_rows(
        rows: &[Vec<f64>],
        discount: f64,
        transitions: TransitionModel,
    ) -> Result<GridModel> {
        let size = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != size) {
            return Err(Error::InvalidModel(format!(
                "reward row has {} entries, expected {}",
                row.len(),
                size
            )));
        }
        let rewards = DMatrix::from_fn(size, size, |r, c| rows[r][c]);
        GridModel::new(size, rewards, discount, transitions)
    }

    // Marks cells as terminal: their value is fixed at their own reward and
    // arriving at them ends the episode.
    pub fn with_terminals(mut self, cells: &[State]) -> Result<GridModel> {
        for &cell in cells {
            self.check_valid(cell)?;
            self.terminal[cell.index()] = true;
        }
        Ok(self)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn transitions(&self) -> TransitionModel {
        self.transitions
    }

    pub fn rewards(&self) -> &DMatrix<f64> {
        &self.rewards
    }

    pub fn is_valid(&self, state: State) -> bool {
        state.row >= 0
            && state.col >= 0
            && (state.row as usize) < self.size
            && (state.col as usize) < self.size
    }

    fn check_valid(&self, state: State) -> Result<()> {
        if self.is_valid(state) {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                row: state.row,
                col: state.col,
                size: self.size,
            })
        }
    }

    pub fn is_terminal(&self, state: State) -> bool {
        self.is_valid(state) && self.terminal[state.index()]
    }

    // All states in row-major order.
    pub fn states(&self) -> impl Iterator<Item = State> {
        let size = self.size as i32;
        (0..size).flat_map(move |row| (0..size).map(move |col| State::new(row, col)))
    }

    // Value function every algorithm starts from: zeros, except terminal cells
    // which hold their own reward.
    pub fn initial_values(&self) -> ValueFunction {
        DMatrix::from_fn(self.size, self.size, |r, c| {
            if self.terminal[(r, c)] {
                self.rewards[(r, c)]
            } else {
                0.0
            }
        })
    }

    // Possible destinations of taking `action` in `state` with their probabilities.
    // Moves off the grid bounce back into `state`; outcomes landing on the same
    // cell are merged.
    pub fn next_states(&self, state: State, action: Action) -> Result<Vec<(State, f64)>> {
        self.check_valid(state)?;

        let mut next_states: Vec<(State, f64)> = Vec::with_capacity(3);
        for (delta, probability) in self.transitions.outcomes(action) {
            if probability == 0.0 {
                continue;
            }

            let mut next_state = state.shifted(delta);
            if !self.is_valid(next_state) {
                next_state = state;
            }

            match next_states.iter_mut().find(|(s, _)| *s == next_state) {
                Some((_, p)) => *p += probability,
                None => next_states.push((next_state, probability)),
            }
        }

        Ok(next_states)
    }

    // Expected return of taking `action` in `state`:
    //   ∑ p(s') ∙ [R(s') + γ∙V(s')],
    // the reward being collected on arrival. Terminal destinations contribute
    // their reward only.
    pub fn expected_value(
        &self,
        state: State,
        action: Action,
        values: &ValueFunction,
    ) -> Result<f64> {
        if values.shape() != (self.size, self.size) {
            return Err(Error::InvalidModel(format!(
                "value function is {}x{}, expected {}x{}",
                values.nrows(),
                values.ncols(),
                self.size,
                self.size
            )));
        }

        Ok(self
            .next_states(state, action)?
            .iter()
            .map(|(next_state, probability)| {
                let idx = next_state.index();
                let continuation = if self.terminal[idx] {
                    0.0
                } else {
                    self.discount * values[idx]
                };
                probability * (self.rewards[idx] + continuation)
            })
            .sum())
    }
}

// Parses one row of action tokens per grid row, e.g. ["RRU", "UUU", "UUL"].
// Whitespace between tokens is ignored.
pub fn parse_policy(rows: &[String], size: usize) -> Result<Policy> {
    if rows.len() != size {
        return Err(Error::InvalidModel(format!(
            "policy has {} rows, expected {}",
            rows.len(),
            size
        )));
    }

    let mut policy = Policy::from_element(size, size, Action::Up);
    for (r, row) in rows.iter().enumerate() {
        let actions = row
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(Action::try_from)
            .collect::<Result<Vec<Action>>>()?;
        if actions.len() != size {
            return Err(Error::InvalidModel(format!(
                "policy row {} has {} actions, expected {}",
                r,
                actions.len(),
                size
            )));
        }
        for (c, action) in actions.into_iter().enumerate() {
            policy[(r, c)] = action;
        }
    }

    Ok(policy)
}

// Token rows of a policy, the inverse of `parse_policy`.
pub fn policy_tokens(policy: &Policy) -> Vec<String> {
    (0..policy.nrows())
        .map(|r| (0..policy.ncols()).map(|c| policy[(r, c)].token()).collect())
        .collect()
}

pub fn grid_state_values_table(values: &ValueFunction) -> Table {
    let mut table = Table::new();
    for r in 0..values.nrows() {
        let mut cells = Vec::new();
        for c in 0..values.ncols() {
            cells.push(Cell::new(format!("{:.2}", values[(r, c)]).as_ref()));
        }
        table.add_row(Row::new(cells));
    }
    table
}

pub fn grid_policy_table(policy: &Policy, model: &GridModel) -> Table {
    let mut table = Table::new();
    for state_row in 0..policy.nrows() {
        let mut cells = Vec::new();
        for state_col in 0..policy.ncols() {
            let state = State::new(state_row as i32, state_col as i32);
            // Terminal cells have no meaningful action.
            let symbol = if model.is_terminal(state) {
                " "
            } else {
                policy[state.index()].arrow()
            };
            cells.push(Cell::new(symbol));
        }
        table.add_row(Row::new(cells));
    }
    table
}

pub fn print_grid_state_values(values: &ValueFunction) {
    grid_state_values_table(values).printstd();
}

pub fn print_grid_policy(policy: &Policy, model: &GridModel) {
    grid_policy_table(policy, model).printstd();
}
