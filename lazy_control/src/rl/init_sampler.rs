// src/rl/init_sampler.rs
//
// Seeded sampler for episode initial conditions.
//
// Per episode:
// - agent count drawn uniformly from the configured pool
// - positions uniform in [-L/2, L/2]^2
// - headings uniform in [-pi, pi), velocities V * [cos, sin]
// - padding slots left at zero
//
// The same rng also drives the random draws of fixed custom topologies, so a
// seed fully determines an episode.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::state::{leading_padding_mask, AgentState};

/// An initial flock draw, padded to `num_agents_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialFlock {
    pub num_agents: usize,
    pub agents: Vec<AgentState>,
    pub padding_mask: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct InitialStateSampler {
    pool: Vec<usize>,
    num_agents_max: usize,
    position_bound: f64,
    speed: f64,
    rng: ChaCha8Rng,
}

impl InitialStateSampler {
    pub fn new(config: &Config, seed: u64) -> Self {
        Self {
            pool: config.env.num_agents_pool.candidates(),
            num_agents_max: config.num_agents_max(),
            position_bound: config.control.initial_position_bound,
            speed: config.control.speed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Reseed the sampler.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Shared rng (topology draws).
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Draw a fresh u64 (used to pick a seed when none is given).
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    fn sample_range(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    pub fn sample_num_agents(&mut self) -> usize {
        match self.pool.len() {
            0 => self.num_agents_max,
            1 => self.pool[0],
            n => self.pool[self.rng.gen_range(0..n)],
        }
    }

    pub fn sample(&mut self) -> InitialFlock {
        let num_agents = self.sample_num_agents();
        let half = self.position_bound / 2.0;

        let mut agents = vec![AgentState::default(); self.num_agents_max];
        let mut positions = Vec::with_capacity(num_agents);
        for _ in 0..num_agents {
            let x = self.sample_range(-half, half);
            let y = self.sample_range(-half, half);
            positions.push((x, y));
        }
        for (slot, (x, y)) in agents.iter_mut().zip(positions) {
            let theta = self.sample_range(-PI, PI);
            *slot = AgentState::moving(x, y, theta, self.speed);
        }

        InitialFlock {
            num_agents,
            agents,
            padding_mask: leading_padding_mask(num_agents, self.num_agents_max),
        }
    }
}
