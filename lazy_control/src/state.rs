// src/state.rs
//
// Flock state containers.
//
// All per-agent arrays are padded to `num_agents_max` slots; `padding_mask[i]`
// is true for active agents. Inactive slots hold zeros and never contribute to
// control, rewards or metrics.

use serde::{Deserialize, Serialize};

use crate::geometry::Arena;
use crate::grid::Grid;

/// Absolute kinematic state of one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Heading (rad). Not wrapped; headings integrate freely.
    pub theta: f64,
}

impl AgentState {
    /// Agent at (x, y) moving at `speed` along `theta`.
    pub fn moving(x: f64, y: f64, theta: f64, speed: f64) -> Self {
        Self {
            x,
            y,
            vx: speed * theta.cos(),
            vy: speed * theta.sin(),
            theta,
        }
    }

    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn velocity(&self) -> [f64; 2] {
        [self.vx, self.vy]
    }

    /// `[x, y, vx, vy, theta]`
    pub fn to_array(&self) -> [f64; 5] {
        [self.x, self.y, self.vx, self.vy, self.theta]
    }
}

/// Absolute state of the whole flock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockState {
    pub agents: Vec<AgentState>,
    /// (n_max, n_max); self-loops included for active agents.
    pub neighbor_masks: Grid<bool>,
    pub padding_mask: Vec<bool>,
}

impl FlockState {
    pub fn num_agents_max(&self) -> usize {
        self.agents.len()
    }

    pub fn num_active(&self) -> usize {
        self.padding_mask.iter().filter(|&&m| m).count()
    }

    pub fn active_indices(&self) -> Vec<usize> {
        active_indices(&self.padding_mask)
    }

    /// Active agents only, in slot order.
    pub fn active_agents(&self) -> impl Iterator<Item = &AgentState> {
        self.agents
            .iter()
            .zip(self.padding_mask.iter())
            .filter_map(|(a, &m)| m.then_some(a))
    }
}

/// Indices of the true entries of a padding mask.
pub fn active_indices(padding_mask: &[bool]) -> Vec<usize> {
    padding_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Padding mask with the first `num_agents` of `num_agents_max` slots active.
pub fn leading_padding_mask(num_agents: usize, num_agents_max: usize) -> Vec<bool> {
    (0..num_agents_max).map(|i| i < num_agents).collect()
}

/// Pairwise relative quantities, `rel[i][j] = data_j - data_i`.
///
/// Entries involving an inactive agent are zero. The communication network
/// is not applied here; every active pair is filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeState {
    pub positions: Grid<[f64; 2]>,
    pub velocities: Grid<[f64; 2]>,
    /// Signed heading difference theta_j - theta_i (not wrapped).
    pub headings: Grid<f64>,
    pub distances: Grid<f64>,
}

impl RelativeState {
    pub fn compute(agents: &[AgentState], padding_mask: &[bool], arena: &Arena) -> Self {
        let n = agents.len();
        let mut positions = Grid::new(n, n);
        let mut velocities = Grid::new(n, n);
        let mut headings = Grid::new(n, n);
        let mut distances = Grid::new(n, n);

        let active = active_indices(padding_mask);
        for &i in &active {
            let a = &agents[i];
            for &j in &active {
                let b = &agents[j];
                let (p, d) = arena.displacement(b.x - a.x, b.y - a.y);
                positions.set(i, j, p);
                distances.set(i, j, d);
                velocities.set(i, j, [b.vx - a.vx, b.vy - a.vy]);
                headings.set(i, j, b.theta - a.theta);
            }
        }

        Self {
            positions,
            velocities,
            headings,
            distances,
        }
    }
}
