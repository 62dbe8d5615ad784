// src/error.rs
//
// Error type for environment construction, stepping and history export.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{ConfigError, EnvMode};

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("action must have length num_agents_max ({expected}); got {got}")]
    ActionLength { expected: usize, got: usize },

    #[error("action value at index {index} is not finite: {value}")]
    NonFiniteAction { index: usize, value: f64 },

    #[error("expected one action per env ({expected}); got {got}")]
    BatchSize { expected: usize, got: usize },

    #[error("missing action for agent '{0}'")]
    MissingAgentAction(String),

    #[error("unknown agent name '{0}'")]
    UnknownAgent(String),

    #[error("operation requires env_mode {expected:?}")]
    WrongMode { expected: EnvMode },

    #[error("star topology requires at least 2 active agents; got {0}")]
    StarTopologyTooSmall(usize),

    #[error("invalid custom reset: {0}")]
    InvalidCustomReset(String),

    #[error("{0} history was not recorded (enable it in the env config)")]
    MissingHistory(&'static str),

    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}
