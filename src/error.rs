use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Action token outside of {U, D, L, R}.
    #[error("invalid action '{0}', expected one of U, D, L, R")]
    InvalidAction(String),

    #[error("state ({row}, {col}) is outside of the {size}x{size} grid")]
    OutOfBounds { row: i32, col: i32, size: usize },

    // Every state has at least the "stay" transition for every action, so this only
    // happens when the backed-up values are not comparable (NaN rewards).
    #[error("no action found for state ({row}, {col})")]
    NoActionFound { row: i32, col: i32 },

    #[error("{algorithm} did not converge within {iterations} iterations")]
    NonConvergence {
        algorithm: &'static str,
        iterations: usize,
    },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to render plot: {0}")]
    Render(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
