use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gridworld::*;
use crate::solver::SolverSettings;

// Describes a family of grid worlds that differ only in the reward of
// `override_cell`, and how to solve them.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub discount: f64,
    // Square matrix of per-cell rewards, row by row.
    pub rewards: Vec<Vec<f64>>,
    pub override_cell: State,
    // One scenario per value. Empty means a single scenario with `rewards` as is.
    pub override_values: Vec<f64>,
    pub terminals: Vec<State>,
    pub transitions: TransitionModel,
    // Cell whose value is plotted against the override values.
    pub plot_cell: State,
    pub solver: SolverSettings,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            discount: 0.99,
            rewards: vec![
                vec![0.0, -1.0, 10.0],
                vec![-1.0, -1.0, -1.0],
                vec![-1.0, -1.0, -1.0],
            ],
            override_cell: State::new(0, 0),
            override_values: vec![100.0, 3.0, 0.0, -3.0],
            terminals: Vec::new(),
            transitions: TransitionModel::default(),
            plot_cell: State::new(2, 0),
            solver: SolverSettings::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml(&text)
    }

    pub fn grid_size(&self) -> usize {
        self.rewards.len()
    }

    pub fn scenarios(&self) -> Vec<Option<f64>> {
        if self.override_values.is_empty() {
            vec![None]
        } else {
            self.override_values.iter().map(|r| Some(*r)).collect()
        }
    }

    // Builds the grid model with the reward of `override_cell` replaced.
    pub fn model(&self, reward_override: Option<f64>) -> Result<GridModel> {
        let mut model = GridModel::from_rows(&self.rewards, self.discount, self.transitions)?;
        if let Some(reward) = reward_override {
            let cell = self.override_cell;
            if !model.is_valid(cell) {
                return Err(Error::OutOfBounds {
                    row: cell.row,
                    col: cell.col,
                    size: model.size(),
                });
            }
            let mut rewards = model.rewards().clone();
            rewards[cell.index()] = reward;
            model = GridModel::new(model.size(), rewards, self.discount, self.transitions)?;
        }
        model.with_terminals(&self.terminals)
    }
}
