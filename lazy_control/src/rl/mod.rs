// src/rl/mod.rs
//
// Reinforcement-learning surface of the lazy flocking environment.
//
// Key components:
// - Observation: joint (single_env) and per-agent (multi_env) observations
// - Action handling: validation, clipping, name <-> slot conversion
// - Rewards: base task rewards, ACS training reward, EnvExtension hooks
// - FlockingEnv / VecEnv: Gym-style environments
// - InitialStateSampler: seeded initial conditions
// - Policy: laziness policies (fully active, constant, attention)
// - EpisodeRunner: policy rollouts with summaries
// - LazyTelemetry: JSONL episode / step logging

pub mod action;
pub mod flocking_env;
pub mod init_sampler;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod runner;
pub mod telemetry;

// Re-exports for convenience
pub use action::{multi_to_single, single_to_multi, validate_action, vicsek_action};
pub use flocking_env::{
    FlockingEnv, MultiAgentStepResult, StepInfo, StepResult, TerminationReason, VecEnv,
    ALL_DONE_KEY,
};
pub use init_sampler::{InitialFlock, InitialStateSampler};
pub use observation::{
    agent_name, multi_agent_observation, AgentObservation, MultiAgentObservation, Observation,
    OBS_VERSION,
};
pub use policy::{
    AttentionLazinessPolicy, AttentionPolicyConfig, AttentionPolicyNet, ConstantLazinessPolicy,
    FullyActivePolicy, Policy, ATTENTION_POLICY_VERSION, CONSTANT_POLICY_VERSION, FULLY_ACTIVE_POLICY_VERSION,
};
pub use reward::{
    acs_training_reward, base_rewards, scalar_reward, EnvExtension, RewardContext,
    StandardExtension,
};
pub use runner::{EpisodeConfig, EpisodeRunner, EpisodeSummary};
pub use telemetry::{EpisodeMarker, EpisodeMarkerType, LazyTelemetry, StepRecord};
