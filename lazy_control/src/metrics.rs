// src/metrics.rs
//
// Flock-level metrics and per-episode histories.
//
// - alignment: |mean velocity| / speed over all num_agents_max slots, padding
//   slots counting as zero velocity, in [0, 1]
// - spatial entropy: sqrt(var(x) + var(y)) over active agents
// - velocity entropy: sqrt(var(vx) + var(vy)) over active agents
//
// Variances are population variances. Histories are preallocated to
// `max_time_steps` and indexed by time step; the termination checks read
// trailing windows from them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::grid::Grid;
use crate::state::{active_indices, AgentState, FlockState};

/// |mean velocity| / speed, averaged over every slot with padding slots at
/// zero velocity. A padded flock therefore never reaches 1.
pub fn alignment(agents: &[AgentState], padding_mask: &[bool], speed: f64) -> f64 {
    let (mut sx, mut sy) = (0.0, 0.0);
    for (a, _) in agents.iter().zip(padding_mask).filter(|(_, &m)| m) {
        sx += a.vx;
        sy += a.vy;
    }
    let n = padding_mask.len();
    if n == 0 || speed <= 0.0 {
        return 0.0;
    }
    let n = n as f64;
    (sx / n).hypot(sy / n) / speed
}

fn dispersion(points: impl Iterator<Item = [f64; 2]>) -> f64 {
    let pts: Vec<[f64; 2]> = points.collect();
    if pts.is_empty() {
        return 0.0;
    }
    let n = pts.len() as f64;
    let mx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let my = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let var: f64 = pts
        .iter()
        .map(|p| (p[0] - mx).powi(2) + (p[1] - my).powi(2))
        .sum::<f64>()
        / n;
    var.sqrt()
}

pub fn spatial_entropy(state: &FlockState) -> f64 {
    dispersion(state.active_agents().map(AgentState::position))
}

pub fn velocity_entropy(state: &FlockState) -> f64 {
    dispersion(state.active_agents().map(AgentState::velocity))
}

/// (spatial, velocity)
pub fn entropies(state: &FlockState) -> (f64, f64) {
    (spatial_entropy(state), velocity_entropy(state))
}

/// Trailing window `series[step + 1 - len ..= step]`, or None if the episode
/// is still shorter than the window.
pub fn trailing_window(series: &[f64], step: usize, len: usize) -> Option<&[f64]> {
    if len == 0 || step + 1 < len || step >= series.len() {
        return None;
    }
    Some(&series[step + 1 - len..=step])
}

/// max - min of a window.
pub fn window_range(window: &[f64]) -> f64 {
    window_max(window) - window_min(window)
}

pub fn window_max(window: &[f64]) -> f64 {
    window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn window_min(window: &[f64]) -> f64 {
    window.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Rebuild a continuous path from positions wrapped into a periodic square
/// of side `side`. A jump longer than `side / 2` on an axis is treated as a
/// boundary crossing and every later sample is shifted by one period.
pub fn unwrap_periodic_trajectory(positions: &[[f64; 2]], side: f64) -> Vec<[f64; 2]> {
    let half = side / 2.0;
    let mut out = Vec::with_capacity(positions.len());
    let mut offset = [0.0f64; 2];
    for (t, p) in positions.iter().enumerate() {
        if t > 0 {
            let prev = positions[t - 1];
            for axis in 0..2 {
                let d = p[axis] - prev[axis];
                if d.abs() > half {
                    offset[axis] += if d > 0.0 { -side } else { side };
                }
            }
        }
        out.push([p[0] + offset[0], p[1] + offset[1]]);
    }
    out
}

#[derive(Debug, Serialize)]
struct MetricsRow {
    step: usize,
    alignment: f64,
    spatial_entropy: f64,
    velocity_entropy: f64,
}

#[derive(Debug, Serialize)]
struct TrajectoryRow {
    step: usize,
    agent: usize,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    theta: f64,
    x_unwrapped: f64,
    y_unwrapped: f64,
}

/// Everything recorded over one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeHistory {
    pub alignment: Vec<f64>,
    pub spatial_entropy: Vec<f64>,
    pub velocity_entropy: Vec<f64>,
    /// Post-step agent states, one entry per step (when enabled).
    pub agent_states: Option<Vec<Vec<AgentState>>>,
    pub neighbor_masks: Option<Vec<Grid<bool>>>,
    /// Applied laziness vectors, one per step (when enabled).
    pub actions: Option<Vec<Vec<f64>>>,
    pub initial_state: Option<FlockState>,
    /// Number of steps recorded so far.
    pub steps: usize,
}

impl EpisodeHistory {
    pub fn new(max_time_steps: usize, record_states: bool, record_actions: bool) -> Self {
        Self {
            alignment: vec![0.0; max_time_steps],
            spatial_entropy: vec![0.0; max_time_steps],
            velocity_entropy: vec![0.0; max_time_steps],
            agent_states: record_states.then(|| Vec::with_capacity(max_time_steps)),
            neighbor_masks: record_states.then(|| Vec::with_capacity(max_time_steps)),
            actions: record_actions.then(|| Vec::with_capacity(max_time_steps)),
            initial_state: None,
            steps: 0,
        }
    }

    /// Append the post-step state and applied action.
    pub fn record_step(&mut self, next: &FlockState, action: &[f64]) {
        if let Some(states) = self.agent_states.as_mut() {
            states.push(next.agents.clone());
        }
        if let Some(masks) = self.neighbor_masks.as_mut() {
            masks.push(next.neighbor_masks.clone());
        }
        if let Some(actions) = self.actions.as_mut() {
            actions.push(action.to_vec());
        }
        self.steps += 1;
    }

    /// Per-step metrics as CSV (`step, alignment, spatial_entropy, velocity_entropy`).
    pub fn write_metrics_csv(&self, path: &Path) -> Result<(), EnvError> {
        ensure_parent(path)?;
        let mut wtr = csv::Writer::from_path(path)?;
        for step in 0..self.steps.min(self.alignment.len()) {
            wtr.serialize(MetricsRow {
                step,
                alignment: self.alignment[step],
                spatial_entropy: self.spatial_entropy[step],
                velocity_entropy: self.velocity_entropy[step],
            })?;
        }
        wtr.flush().map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Long-format trajectories of the active agents. With a periodic side,
    /// also writes the unwrapped (continuous) positions; otherwise the
    /// unwrapped columns repeat x and y.
    pub fn write_trajectory_csv(
        &self,
        path: &Path,
        padding_mask: &[bool],
        periodic_side: Option<f64>,
    ) -> Result<(), EnvError> {
        let states = self
            .agent_states
            .as_ref()
            .ok_or(EnvError::MissingHistory("agent state"))?;
        let unwrapped = self.trajectories(padding_mask, periodic_side)?;

        let active = active_indices(padding_mask);

        ensure_parent(path)?;
        let mut wtr = csv::Writer::from_path(path)?;
        for (step, agents) in states.iter().enumerate() {
            for (&agent, path_k) in active.iter().zip(&unwrapped) {
                let s = &agents[agent];
                let [xu, yu] = path_k[step];
                wtr.serialize(TrajectoryRow {
                    step,
                    agent,
                    x: s.x,
                    y: s.y,
                    vx: s.vx,
                    vy: s.vy,
                    theta: s.theta,
                    x_unwrapped: xu,
                    y_unwrapped: yu,
                })?;
            }
        }
        wtr.flush().map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Position paths of the active agents (slot order), unwrapped when a
    /// periodic side is given.
    pub fn trajectories(
        &self,
        padding_mask: &[bool],
        periodic_side: Option<f64>,
    ) -> Result<Vec<Vec<[f64; 2]>>, EnvError> {
        let states = self
            .agent_states
            .as_ref()
            .ok_or(EnvError::MissingHistory("agent state"))?;
        Ok(active_indices(padding_mask)
            .into_iter()
            .map(|i| {
                let raw: Vec<[f64; 2]> = states.iter().map(|s| s[i].position()).collect();
                match periodic_side {
                    Some(side) => unwrap_periodic_trajectory(&raw, side),
                    None => raw,
                }
            })
            .collect())
    }
}

fn ensure_parent(path: &Path) -> Result<(), EnvError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| EnvError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}
