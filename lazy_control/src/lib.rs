//! Lazy flocking control: a multi-agent RL environment in which a policy
//! decides how lazy each agent is, i.e. how much of its flocking control
//! input it ignores.
//!
//! # Layout
//!
//! - **config**: YAML configuration (`control` + `env` sections), validation
//!   and environment-variable overrides
//! - **geometry** / **grid** / **state**: arena wrapping, dense matrices,
//!   absolute and pairwise relative agent state
//! - **topology**: fully connected, range-limited and custom (line, ring,
//!   star) communication networks
//! - **control**: Vicsek and augmented Cucker-Smale (ACS) controllers,
//!   laziness and integration
//! - **metrics**: alignment, spatial / velocity entropy, episode histories
//! - **rl**: observations, actions, rewards, `FlockingEnv`, policies, runner
//!   and telemetry
//! - **model**: multi-head attention on burn for learned policies
//!
//! The binary (`src/main.rs`) runs policy rollouts from the command line.

pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod metrics;
pub mod model;
pub mod rl;
pub mod state;
pub mod topology;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    ActionType, Config, ConfigError, ControlConfig, CustomTopology, EnvConfig, EnvMode,
    NumAgentsPool, TaskType,
};
pub use error::EnvError;
pub use geometry::Arena;
pub use grid::Grid;
pub use metrics::EpisodeHistory;
pub use model::{ModelBackend, ModelError, MultiHeadAttention, MultiHeadAttentionConfig};
pub use state::{AgentState, FlockState, RelativeState};
pub use topology::{NetworkTopology, NetworkUpdate, TopologyMode};

pub use rl::{
    AttentionLazinessPolicy, ConstantLazinessPolicy, EpisodeConfig, EpisodeRunner,
    EpisodeSummary, FlockingEnv, FullyActivePolicy, LazyTelemetry, MultiAgentStepResult,
    Observation, Policy, StepInfo, StepResult, TerminationReason, VecEnv, OBS_VERSION,
};
