// src/rl/reward.rs
//
// Per-agent rewards and the env customization hooks.
//
// Base rewards (padding slots get 0):
//   vicsek: r_i = alignment of the pre-step state
//   acs:    r_i = -(dt * V * |u_i| + rho * dt)
// Scalar (single_env) reward = sum_i r_i / num_agents.
//
// Training reward (is_training && acs), replacing the scalar reward:
//   w_pos * -(1/3600) (H_p - (p_goal - 2.5))^2
// + w_vel * -(1/220)  (H_v - (v_goal - 0.05))^2
// - w_ctrl * control_cost
// where control_cost = sum_i r_i / num_agents + rho * dt, i.e. the base
// reward without its cruise term (-dt * V * mean_i |u_i|, never positive).

use crate::config::{Config, ControlConfig, TaskType};
use crate::state::FlockState;

use super::flocking_env::StepInfo;

const POS_ERROR_SCALE: f64 = 1.0 / 3600.0;
const VEL_ERROR_SCALE: f64 = 1.0 / 220.0;
const POS_TARGET_MARGIN: f64 = 2.5;
const VEL_TARGET_MARGIN: f64 = 0.05;

/// Per-slot base rewards.
pub fn base_rewards(
    task: TaskType,
    state: &FlockState,
    alignment: f64,
    control_inputs: &[f64],
    control: &ControlConfig,
    dt: f64,
) -> Vec<f64> {
    state
        .padding_mask
        .iter()
        .zip(control_inputs)
        .map(|(&active, &u)| {
            if !active {
                return 0.0;
            }
            match task {
                TaskType::Vicsek => alignment,
                TaskType::Acs => -(dt * control.speed * u.abs() + control.rho * dt),
            }
        })
        .collect()
}

/// Sum of per-slot rewards divided by the active agent count.
pub fn scalar_reward(rewards: &[f64], num_agents: usize) -> f64 {
    if num_agents == 0 {
        return 0.0;
    }
    rewards.iter().sum::<f64>() / num_agents as f64
}

/// Everything a reward hook may look at for one transition.
#[derive(Debug, Clone, Copy)]
pub struct RewardContext<'a> {
    pub config: &'a Config,
    /// State before the step.
    pub state: &'a FlockState,
    /// State after the step.
    pub next_state: &'a FlockState,
    /// Applied (post-laziness) heading-rate commands.
    pub control_inputs: &'a [f64],
    /// Base per-slot rewards.
    pub rewards: &'a [f64],
    pub num_agents: usize,
    pub time_step: usize,
    pub alignment: f64,
    pub spatial_entropy: f64,
    pub velocity_entropy: f64,
    pub done: bool,
}

impl RewardContext<'_> {
    /// Base scalar reward with the cruise cost removed: -dt * V * mean |u|
    /// over active agents.
    pub fn control_cost(&self) -> f64 {
        scalar_reward(self.rewards, self.num_agents) + self.config.control.rho * self.config.env.dt
    }
}

/// Shaped ACS training reward.
pub fn acs_training_reward(ctx: &RewardContext<'_>) -> f64 {
    let env = &ctx.config.env;
    let p_goal = env.entropy_p_goal_or(ctx.config.control.r0);

    let pos_error = (ctx.spatial_entropy - (p_goal - POS_TARGET_MARGIN)).powi(2);
    let vel_error = (ctx.velocity_entropy - (env.entropy_v_goal - VEL_TARGET_MARGIN)).powi(2);

    env.acs_train_w_pos * -(POS_ERROR_SCALE * pos_error)
        + env.acs_train_w_vel * -(VEL_ERROR_SCALE * vel_error)
        - env.acs_train_w_ctrl * ctx.control_cost()
}

/// Customization hooks applied by the env on every step.
pub trait EnvExtension: Send + Sync {
    /// Map raw model output to a laziness vector. Identity by default.
    fn interpret_action(&self, model_output: &[f64]) -> Vec<f64> {
        model_output.to_vec()
    }

    /// Replace the scalar reward. None keeps the base reward.
    fn custom_reward(&self, _ctx: &RewardContext<'_>) -> Option<f64> {
        None
    }

    /// Add fields to the step info.
    fn extend_info(&self, _info: &mut StepInfo, _ctx: &RewardContext<'_>) {}
}

/// Default hooks: the ACS training reward when `is_training` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardExtension;

impl EnvExtension for StandardExtension {
    fn custom_reward(&self, ctx: &RewardContext<'_>) -> Option<f64> {
        (ctx.config.env.is_training && ctx.config.env.task_type == TaskType::Acs)
            .then(|| acs_training_reward(ctx))
    }
}
