// src/rl/observation.rs
//
// Observation schema for laziness policies.
//
// single_env: one joint observation for the whole flock.
//   local_agent_infos[i][j] (n_max x n_max x obs_dim), for active pairs:
//     bounded arena:  [dx/(L/2), dy/(L/2), cos(dth), sin(dth)]           (obs_dim 4)
//     periodic arena: [cos x', sin x', cos y', sin y', cos(dth), sin(dth)] (obs_dim 6)
//   and zeros for any pair involving a padding slot.
//
// multi_env: one observation per agent name (`agent_name_prefix + index`),
// carrying the agent's absolute state, its neighbor-mask row and the padding
// mask.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{map_periodic_to_continuous, Arena};
use crate::grid::Grid;
use crate::state::{active_indices, FlockState, RelativeState};

/// Current observation schema version.
pub const OBS_VERSION: u32 = 1;

/// Name of agent `index` in multi-agent dictionaries.
pub fn agent_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{index}")
}

/// Joint observation (single_env).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub obs_version: u32,
    pub time_step: usize,
    pub num_agents_max: usize,
    pub obs_dim: usize,
    /// Row-major (n_max, n_max, obs_dim).
    pub local_agent_infos: Vec<f64>,
    pub neighbor_masks: Grid<bool>,
    pub padding_mask: Vec<bool>,
    pub is_from_my_env: bool,
}

impl Observation {
    pub fn from_state(
        state: &FlockState,
        rel: &RelativeState,
        arena: &Arena,
        obs_dim: usize,
        time_step: usize,
    ) -> Self {
        let n = state.num_agents_max();
        let half = arena.side / 2.0;
        let mut infos = vec![0.0; n * n * obs_dim];

        let active = active_indices(&state.padding_mask);
        for &i in &active {
            for &j in &active {
                let [dx, dy] = *rel.positions.get(i, j);
                let (s, c) = rel.headings.get(i, j).sin_cos();
                let base = (i * n + j) * obs_dim;
                let cell = &mut infos[base..base + obs_dim];
                if arena.periodic {
                    let e = map_periodic_to_continuous(dx, dy, arena.side, arena.side);
                    cell[..4].copy_from_slice(&e);
                    cell[4] = c;
                    cell[5] = s;
                } else {
                    cell[0] = dx / half;
                    cell[1] = dy / half;
                    cell[2] = c;
                    cell[3] = s;
                }
            }
        }

        Self {
            obs_version: OBS_VERSION,
            time_step,
            num_agents_max: n,
            obs_dim,
            local_agent_infos: infos,
            neighbor_masks: state.neighbor_masks.clone(),
            padding_mask: state.padding_mask.clone(),
            is_from_my_env: true,
        }
    }

    /// Feature vector of pair (i, j).
    pub fn entry(&self, i: usize, j: usize) -> &[f64] {
        let base = (i * self.num_agents_max + j) * self.obs_dim;
        &self.local_agent_infos[base..base + self.obs_dim]
    }

    /// (n_max, n_max, obs_dim)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_agents_max, self.num_agents_max, self.obs_dim)
    }

    pub fn num_active(&self) -> usize {
        self.padding_mask.iter().filter(|&&m| m).count()
    }

    /// Flat vector for MLP-style consumers:
    /// infos, then neighbor masks (0/1), then padding mask (0/1).
    pub fn flatten(&self) -> Vec<f64> {
        let as_f = |b: &bool| if *b { 1.0 } else { 0.0 };
        self.local_agent_infos
            .iter()
            .copied()
            .chain(self.neighbor_masks.iter().map(as_f))
            .chain(self.padding_mask.iter().map(as_f))
            .collect()
    }

    /// Length of `flatten()` for a given size.
    pub fn flat_len(num_agents_max: usize, obs_dim: usize) -> usize {
        num_agents_max * num_agents_max * obs_dim + num_agents_max * num_agents_max + num_agents_max
    }

    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Per-agent observation (multi_env).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentObservation {
    /// Absolute `[x, y, vx, vy, theta]`.
    pub centralized_agent_info: [f64; 5],
    pub neighbor_mask: Vec<bool>,
    pub padding_mask: Vec<bool>,
}

/// Per-agent observations keyed by agent name.
pub type MultiAgentObservation = BTreeMap<String, AgentObservation>;

/// Build per-agent observations for every slot (padding slots included).
pub fn multi_agent_observation(state: &FlockState, prefix: &str) -> MultiAgentObservation {
    (0..state.num_agents_max())
        .map(|i| {
            (
                agent_name(prefix, i),
                AgentObservation {
                    centralized_agent_info: state.agents[i].to_array(),
                    neighbor_mask: state.neighbor_masks.row(i).to_vec(),
                    padding_mask: state.padding_mask.clone(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{leading_padding_mask, AgentState};

    fn two_agent_state() -> FlockState {
        FlockState {
            agents: vec![
                AgentState::moving(0.0, 0.0, 0.0, 15.0),
                AgentState::moving(125.0, -62.5, std::f64::consts::FRAC_PI_2, 15.0),
                AgentState::default(),
            ],
            neighbor_masks: Grid::filled(3, 3, true),
            padding_mask: leading_padding_mask(2, 3),
        }
    }

    #[test]
    fn test_bounded_observation_entries() {
        let s = two_agent_state();
        let arena = Arena::new(250.0, false);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &arena);
        let obs = Observation::from_state(&s, &rel, &arena, 4, 0);
        assert_eq!(obs.shape(), (3, 3, 4));
        let e = obs.entry(0, 1);
        assert!((e[0] - 1.0).abs() < 1e-12);
        assert!((e[1] + 0.5).abs() < 1e-12);
        assert!(e[2].abs() < 1e-12);
        assert!((e[3] - 1.0).abs() < 1e-12);
        // self entry: zero displacement, zero heading difference
        assert_eq!(obs.entry(1, 1), &[0.0, 0.0, 1.0, 0.0]);
        assert!(obs.entry(0, 2).iter().all(|&v| v == 0.0));
        assert!(obs.is_from_my_env);
    }

    #[test]
    fn test_periodic_observation_width() {
        let s = two_agent_state();
        let arena = Arena::new(250.0, true);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &arena);
        let obs = Observation::from_state(&s, &rel, &arena, 6, 0);
        assert_eq!(obs.entry(0, 0), &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert!(obs.entry(2, 2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_flatten_length() {
        let s = two_agent_state();
        let arena = Arena::new(250.0, false);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &arena);
        let obs = Observation::from_state(&s, &rel, &arena, 4, 3);
        assert_eq!(obs.flatten().len(), Observation::flat_len(3, 4));
        assert_eq!(obs.flatten().last(), Some(&0.0));
    }

    #[test]
    fn test_multi_agent_observation_keys() {
        let s = two_agent_state();
        let multi = multi_agent_observation(&s, "agent_");
        assert_eq!(multi.len(), 3);
        let a1 = &multi["agent_1"];
        assert_eq!(a1.centralized_agent_info[0], 125.0);
        assert_eq!(a1.neighbor_mask, vec![true, true, true]);
        assert_eq!(a1.padding_mask, vec![true, true, false]);
    }

    #[test]
    fn test_canonical_json_is_stable() {
        let s = two_agent_state();
        let arena = Arena::new(250.0, false);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &arena);
        let obs = Observation::from_state(&s, &rel, &arena, 4, 0);
        let a = obs.to_canonical_json().unwrap();
        let b = obs.clone().to_canonical_json().unwrap();
        assert_eq!(a, b);
        let back: Observation = serde_json::from_slice(&a).unwrap();
        assert_eq!(back.padding_mask, obs.padding_mask);
        assert_eq!(back.local_agent_infos.len(), obs.local_agent_infos.len());
    }
}
