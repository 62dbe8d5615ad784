// src/rl/flocking_env.rs
//
// Gym-style lazy flocking environment.
//
// This module provides:
// - FlockingEnv: single environment (reset, custom_reset, step, step_multi)
// - VecEnv: independent environments stepped in lockstep
// - Deterministic execution given seeds
//
// One step:
//   interpret action -> validate -> flocking control (vicsek | acs)
//   -> apply laziness -> integrate -> network update -> relative state
//   -> rewards (pre-step state) -> observation -> termination
//   -> custom reward -> info -> histories -> advance time

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, EnvMode, TaskType};
use crate::control::{acs_control, apply_laziness, integrate, vicsek_control};
use crate::error::EnvError;
use crate::geometry::Arena;
use crate::grid::Grid;
use crate::metrics::{
    alignment, entropies, trailing_window, window_max, window_range, EpisodeHistory,
};
use crate::state::{AgentState, FlockState, RelativeState};
use crate::topology::{NetworkTopology, NetworkUpdate, TopologyMode};

use super::action::{multi_to_single, single_to_multi, validate_action, vicsek_action};
use super::init_sampler::InitialStateSampler;
use super::observation::{agent_name, multi_agent_observation, MultiAgentObservation, Observation};
use super::reward::{base_rewards, scalar_reward, EnvExtension, RewardContext, StandardExtension};

/// Key of the episode-level flag in multi-agent done maps.
pub const ALL_DONE_KEY: &str = "__all__";

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Flocking goal reached and held over the stability window.
    TaskComplete,
    /// `max_time_steps` reached.
    MaxTimeSteps,
    /// An agent lost every neighbor (range-limited networks only).
    CommunicationLost,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::TaskComplete => "task_complete",
            TerminationReason::MaxTimeSteps => "max_time_steps",
            TerminationReason::CommunicationLost => "communication_lost",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional information returned from a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Index of the step just taken.
    pub time_step: usize,
    /// Post-step spatial entropy (acs only).
    pub spatial_entropy: Option<f64>,
    /// Post-step velocity entropy (acs only).
    pub velocity_entropy: Option<f64>,
    /// Pre-step alignment (vicsek only).
    pub alignment: Option<f64>,
    /// Base scalar reward before any custom reward replaced it.
    pub original_reward: f64,
    /// Agents isolated after this step (range-limited networks only).
    pub comm_loss_agents: Option<Vec<bool>>,
    /// Termination reason if done.
    pub termination_reason: Option<TerminationReason>,
    /// Fields added by an `EnvExtension`.
    pub extra: BTreeMap<String, f64>,
}

/// Result of a single-env step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Result of a multi-env step; maps are keyed by agent name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAgentStepResult {
    pub observations: MultiAgentObservation,
    pub rewards: BTreeMap<String, f64>,
    /// Per agent (padding slots are always done) plus `"__all__"`.
    pub dones: BTreeMap<String, bool>,
    pub info: StepInfo,
}

struct Transition {
    rewards: Vec<f64>,
    reward: f64,
    custom: bool,
    done: bool,
    info: StepInfo,
}

/// Gym-style lazy flocking environment.
///
/// All state transitions are deterministic given the seed.
pub struct FlockingEnv {
    config: Config,
    arena: Arena,
    topology: NetworkTopology,
    sampler: InitialStateSampler,
    extension: Box<dyn EnvExtension>,
    state: FlockState,
    rel_state: RelativeState,
    history: EpisodeHistory,
    last_observation: Observation,
    time_step: usize,
    num_agents: usize,
    done: bool,
    termination_reason: Option<TerminationReason>,
    has_lost_comm: bool,
    lost_comm_step: Option<usize>,
    seed: u64,
}

impl FlockingEnv {
    /// Create an environment and run the first reset.
    ///
    /// Seed precedence: argument, then `env.seed` from the config, then a
    /// random seed.
    pub fn new(config: Config, seed: Option<u64>) -> Result<Self, EnvError> {
        config.validate()?;
        let seed = seed
            .or(config.env.seed)
            .unwrap_or_else(|| rand::thread_rng().gen());

        let n_max = config.num_agents_max();
        let arena = Arena::new(
            config.control.initial_position_bound,
            config.env.periodic_boundary,
        );
        let state = FlockState {
            agents: vec![AgentState::default(); n_max],
            neighbor_masks: Grid::filled(n_max, n_max, false),
            padding_mask: vec![false; n_max],
        };
        let rel_state = RelativeState::compute(&state.agents, &state.padding_mask, &arena);
        let last_observation =
            Observation::from_state(&state, &rel_state, &arena, config.env.obs_dim, 0);

        let mut env = Self {
            topology: NetworkTopology::new(TopologyMode::from_env_config(&config.env)),
            sampler: InitialStateSampler::new(&config, seed),
            extension: Box::new(StandardExtension),
            history: EpisodeHistory::new(config.env.max_time_steps, false, false),
            config,
            arena,
            state,
            rel_state,
            last_observation,
            time_step: 0,
            num_agents: 0,
            done: false,
            termination_reason: None,
            has_lost_comm: false,
            lost_comm_step: None,
            seed,
        };
        env.reset(Some(seed))?;
        Ok(env)
    }

    /// Replace the customization hooks.
    pub fn with_extension(mut self, extension: Box<dyn EnvExtension>) -> Self {
        self.extension = extension;
        self
    }

    /// Reset the environment with an optional seed.
    ///
    /// Without a seed, the next seed is drawn from the current rng stream.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError> {
        let seed = seed.unwrap_or_else(|| self.sampler.next_seed());
        self.seed = seed;
        self.sampler.reseed(seed);

        let flock = self.sampler.sample();
        debug!(seed, num_agents = flock.num_agents, "episode reset");
        self.start_episode(flock.agents, flock.padding_mask, flock.num_agents)
    }

    /// Reset to caller-provided initial conditions.
    ///
    /// `positions`, `velocities` and `headings` describe the active agents
    /// (slots 0..n). Velocities are used as given. `comm_range` replaces the
    /// configured communication range for this and later episodes.
    pub fn custom_reset(
        &mut self,
        positions: &[[f64; 2]],
        velocities: &[[f64; 2]],
        headings: &[f64],
        num_agents_max: Option<usize>,
        comm_range: Option<f64>,
    ) -> Result<Observation, EnvError> {
        let n = positions.len();
        let n_max = self.num_agents_max();
        if velocities.len() != n || headings.len() != n {
            return Err(EnvError::InvalidCustomReset(format!(
                "positions ({n}), velocities ({}) and headings ({}) must have the same length",
                velocities.len(),
                headings.len()
            )));
        }
        if let Some(m) = num_agents_max {
            if m != n_max {
                return Err(EnvError::InvalidCustomReset(format!(
                    "num_agents_max must equal the configured maximum ({n_max}); got {m}"
                )));
            }
        }
        let n_min = self.config.num_agents_min();
        if n < n_min || n > n_max {
            return Err(EnvError::InvalidCustomReset(format!(
                "number of agents must be in [{n_min}, {n_max}]; got {n}"
            )));
        }

        let mut candidate = self.config.clone();
        candidate.env.comm_range = comm_range;
        candidate.validate()?;
        self.config = candidate;
        self.topology
            .set_mode(TopologyMode::from_env_config(&self.config.env));

        let mut agents = vec![AgentState::default(); n_max];
        for (k, slot) in agents.iter_mut().take(n).enumerate() {
            *slot = AgentState {
                x: positions[k][0],
                y: positions[k][1],
                vx: velocities[k][0],
                vy: velocities[k][1],
                theta: headings[k],
            };
        }
        let padding_mask = (0..n_max).map(|i| i < n).collect();
        debug!(num_agents = n, ?comm_range, "custom reset");
        self.start_episode(agents, padding_mask, n)
    }

    fn start_episode(
        &mut self,
        agents: Vec<AgentState>,
        padding_mask: Vec<bool>,
        num_agents: usize,
    ) -> Result<Observation, EnvError> {
        let network = self
            .topology
            .init(&agents, &padding_mask, &self.arena, self.sampler.rng_mut())?;

        self.state = FlockState {
            agents,
            neighbor_masks: network.neighbor_masks,
            padding_mask,
        };
        self.rel_state =
            RelativeState::compute(&self.state.agents, &self.state.padding_mask, &self.arena);
        self.num_agents = num_agents;
        self.time_step = 0;
        self.done = false;
        self.termination_reason = None;
        self.has_lost_comm = false;
        self.lost_comm_step = None;

        let env = &self.config.env;
        self.history = EpisodeHistory::new(env.max_time_steps, env.get_state_hist, env.get_action_hist);
        if env.get_state_hist {
            self.history.initial_state = Some(self.state.clone());
        }

        self.last_observation = self.observe(&self.state, &self.rel_state, 0);
        Ok(self.last_observation.clone())
    }

    fn observe(&self, state: &FlockState, rel: &RelativeState, time_step: usize) -> Observation {
        Observation::from_state(state, rel, &self.arena, self.config.env.obs_dim, time_step)
    }

    /// Take a step (single_env). `action` is the model output, one laziness
    /// value per slot.
    pub fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
        if self.config.env.env_mode != EnvMode::SingleEnv {
            return Err(EnvError::WrongMode {
                expected: EnvMode::SingleEnv,
            });
        }
        if self.done {
            return Ok(StepResult {
                observation: self.last_observation.clone(),
                reward: 0.0,
                done: true,
                info: self.terminal_info(),
            });
        }

        let interpreted = self.extension.interpret_action(action);
        let t = self.transition(&interpreted)?;
        Ok(StepResult {
            observation: self.last_observation.clone(),
            reward: t.reward,
            done: t.done,
            info: t.info,
        })
    }

    /// Take a step (multi_env). Each active agent submits its own laziness.
    pub fn step_multi(
        &mut self,
        actions: &BTreeMap<String, f64>,
    ) -> Result<MultiAgentStepResult, EnvError> {
        if self.config.env.env_mode != EnvMode::MultiEnv {
            return Err(EnvError::WrongMode {
                expected: EnvMode::MultiEnv,
            });
        }
        let prefix = self.config.env.agent_name_prefix.clone();
        if self.done {
            return Ok(MultiAgentStepResult {
                observations: multi_agent_observation(&self.state, &prefix),
                rewards: single_to_multi(&vec![0.0; self.num_agents_max()], &prefix),
                dones: self.multi_dones(true),
                info: self.terminal_info(),
            });
        }

        let joint = multi_to_single(actions, &prefix, &self.state.padding_mask)?;
        let interpreted = self.extension.interpret_action(&joint);
        let t = self.transition(&interpreted)?;

        let per_agent: Vec<f64> = if t.custom {
            self.state
                .padding_mask
                .iter()
                .map(|&m| if m { t.reward } else { 0.0 })
                .collect()
        } else {
            t.rewards
        };
        Ok(MultiAgentStepResult {
            observations: multi_agent_observation(&self.state, &prefix),
            rewards: single_to_multi(&per_agent, &prefix),
            dones: self.multi_dones(t.done),
            info: t.info,
        })
    }

    fn multi_dones(&self, done: bool) -> BTreeMap<String, bool> {
        let prefix = &self.config.env.agent_name_prefix;
        let mut dones: BTreeMap<String, bool> = self
            .state
            .padding_mask
            .iter()
            .enumerate()
            .map(|(i, &m)| (agent_name(prefix, i), if m { done } else { true }))
            .collect();
        dones.insert(ALL_DONE_KEY.to_string(), done);
        dones
    }

    fn terminal_info(&self) -> StepInfo {
        StepInfo {
            time_step: self.time_step.saturating_sub(1),
            termination_reason: self.termination_reason,
            ..StepInfo::default()
        }
    }

    fn transition(&mut self, action: &[f64]) -> Result<Transition, EnvError> {
        let env = self.config.env.clone();
        let control = &self.config.control;
        let t = self.time_step;
        let n_max = self.num_agents_max();

        let joint_action = validate_action(action, n_max, env.action_type)?;

        // s' = T(s, a)
        let raw_u = match env.task_type {
            TaskType::Vicsek => vicsek_control(
                &self.rel_state,
                &self.state.neighbor_masks,
                &self.state.padding_mask,
                env.dt,
                control.max_turn_rate,
            ),
            TaskType::Acs => acs_control(
                &self.state,
                &self.rel_state,
                &self.state.neighbor_masks,
                control,
            ),
        };
        let u = apply_laziness(&raw_u, &joint_action);
        let next_agents = integrate(
            &self.state.agents,
            &self.state.padding_mask,
            &u,
            env.dt,
            control.speed,
            &self.arena,
        );
        let network: NetworkUpdate =
            self.topology
                .update(&next_agents, &self.state.padding_mask, &self.arena);
        let any_comm_loss = network.any_comm_loss();
        let next_state = FlockState {
            agents: next_agents,
            neighbor_masks: network.neighbor_masks,
            padding_mask: self.state.padding_mask.clone(),
        };
        let next_rel =
            RelativeState::compute(&next_state.agents, &next_state.padding_mask, &self.arena);

        // r = R(s, a, s')
        let align = match env.task_type {
            TaskType::Vicsek => {
                let a = alignment(&self.state.agents, &self.state.padding_mask, control.speed);
                self.history.alignment[t] = a;
                a
            }
            TaskType::Acs => 0.0,
        };
        let rewards = base_rewards(env.task_type, &self.state, align, &u, control, env.dt);
        let base_reward = scalar_reward(&rewards, self.num_agents);

        // o = H(s')
        let observation = self.observe(&next_state, &next_rel, t + 1);

        // termination
        let mut reason = None;
        let (mut sp, mut ve) = (0.0, 0.0);
        match env.task_type {
            TaskType::Vicsek => {
                if align > env.alignment_goal && !env.use_fixed_episode_length {
                    if let Some(w) = trailing_window(&self.history.alignment, t, env.alignment_window_length) {
                        if window_range(w) < env.alignment_rate_goal {
                            reason = Some(TerminationReason::TaskComplete);
                        }
                    }
                }
            }
            TaskType::Acs => {
                (sp, ve) = entropies(&next_state);
                self.history.spatial_entropy[t] = sp;
                self.history.velocity_entropy[t] = ve;
                let p_goal = env.entropy_p_goal_or(control.r0);
                if sp < p_goal && ve < env.entropy_v_goal && !env.use_fixed_episode_length {
                    let win = env.entropy_rate_window_length;
                    let sp_w = trailing_window(&self.history.spatial_entropy, t, win);
                    let ve_w = trailing_window(&self.history.velocity_entropy, t, win);
                    if let (Some(sp_w), Some(ve_w)) = (sp_w, ve_w) {
                        if window_range(sp_w) < env.entropy_p_rate_goal
                            && window_max(ve_w) < env.entropy_v_rate_goal
                        {
                            reason = Some(TerminationReason::TaskComplete);
                        }
                    }
                }
            }
        }
        if reason.is_none() && t + 1 >= env.max_time_steps {
            reason = Some(TerminationReason::MaxTimeSteps);
        }
        if env.comm_range.is_some() && any_comm_loss && reason.is_none() {
            if !self.has_lost_comm {
                warn!(time_step = t, "agent lost communication with every neighbor");
            }
            self.lost_comm_step = Some(t);
            self.has_lost_comm = true;
            if !env.ignore_comm_lost_agents {
                reason = Some(TerminationReason::CommunicationLost);
            }
        }
        let done = reason.is_some();

        let ctx = RewardContext {
            config: &self.config,
            state: &self.state,
            next_state: &next_state,
            control_inputs: &u,
            rewards: &rewards,
            num_agents: self.num_agents,
            time_step: t,
            alignment: align,
            spatial_entropy: sp,
            velocity_entropy: ve,
            done,
        };
        let custom = self.extension.custom_reward(&ctx);
        let reward = custom.unwrap_or(base_reward);

        let mut info = StepInfo {
            time_step: t,
            spatial_entropy: (env.task_type == TaskType::Acs).then_some(sp),
            velocity_entropy: (env.task_type == TaskType::Acs).then_some(ve),
            alignment: (env.task_type == TaskType::Vicsek).then_some(align),
            original_reward: base_reward,
            comm_loss_agents: network.comm_loss_agents,
            termination_reason: reason,
            extra: BTreeMap::new(),
        };
        self.extension.extend_info(&mut info, &ctx);

        self.history.record_step(&next_state, &joint_action);

        self.state = next_state;
        self.rel_state = next_rel;
        self.last_observation = observation;
        self.time_step += 1;
        self.done = done;
        self.termination_reason = reason;
        if let Some(r) = reason {
            debug!(time_step = t, reason = %r, "episode done");
        }

        Ok(Transition {
            rewards,
            reward,
            custom: custom.is_some(),
            done,
            info,
        })
    }

    /// Observation of the current state (the one returned by the last
    /// reset/step).
    pub fn observation(&self) -> &Observation {
        &self.last_observation
    }

    /// Per-agent observations of the current state.
    pub fn multi_observation(&self) -> MultiAgentObservation {
        multi_agent_observation(&self.state, &self.config.env.agent_name_prefix)
    }

    /// Reference 0/1 "listen to all neighbors" matrix for the current state.
    pub fn vicsek_action(&self) -> Grid<u8> {
        vicsek_action(&self.state)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn state(&self) -> &FlockState {
        &self.state
    }

    pub fn relative_state(&self) -> &RelativeState {
        &self.rel_state
    }

    pub fn history(&self) -> &EpisodeHistory {
        &self.history
    }

    pub fn time_step(&self) -> usize {
        self.time_step
    }

    /// Active agents this episode.
    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn num_agents_max(&self) -> usize {
        self.state.num_agents_max()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn has_lost_comm(&self) -> bool {
        self.has_lost_comm
    }

    /// Latest step at which an agent had no neighbor.
    pub fn lost_comm_step(&self) -> Option<usize> {
        self.lost_comm_step
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Vectorised environments for parallel rollouts.
pub struct VecEnv {
    envs: Vec<FlockingEnv>,
}

impl VecEnv {
    /// `n` envs seeded `base_seed, base_seed + 1, ...` (random base if None).
    pub fn new(n: usize, config: Config, base_seed: Option<u64>) -> Result<Self, EnvError> {
        let base = base_seed
            .or(config.env.seed)
            .unwrap_or_else(|| rand::thread_rng().gen());
        let envs = (0..n)
            .map(|i| FlockingEnv::new(config.clone(), Some(base.wrapping_add(i as u64))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments, optionally with one seed per env.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Result<Vec<Observation>, EnvError> {
        if let Some(s) = seeds {
            if s.len() != self.envs.len() {
                return Err(EnvError::BatchSize {
                    expected: self.envs.len(),
                    got: s.len(),
                });
            }
        }
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| env.reset(seeds.map(|s| s[i])))
            .collect()
    }

    /// Step all environments, one joint action per env.
    pub fn step(&mut self, actions: &[Vec<f64>]) -> Result<Vec<StepResult>, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }
        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(env, a)| env.step(a))
            .collect()
    }

    pub fn envs(&self) -> &[FlockingEnv] {
        &self.envs
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(|e| e.seed()).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }
}
