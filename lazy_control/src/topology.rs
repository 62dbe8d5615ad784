// src/topology.rs
//
// Communication network between agents.
//
// Three regimes, chosen from the env config:
// - range-limited: neighbors within `comm_range`, recomputed every step
// - fully connected: every slot sees every slot (padding filtered downstream)
// - fixed custom graph (line / ring / star): drawn once per episode from the
//   env rng, then frozen
//
// Masks always include self-loops for active agents.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{CustomTopology, EnvConfig};
use crate::error::EnvError;
use crate::geometry::Arena;
use crate::grid::Grid;
use crate::state::{active_indices, AgentState};

/// Output of a network update.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkUpdate {
    pub neighbor_masks: Grid<bool>,
    /// Only reported by the range-limited regime: active agents whose only
    /// neighbor is themselves.
    pub comm_loss_agents: Option<Vec<bool>>,
}

impl NetworkUpdate {
    pub fn any_comm_loss(&self) -> bool {
        self.comm_loss_agents
            .as_ref()
            .is_some_and(|v| v.iter().any(|&b| b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopologyMode {
    FullyConnected,
    CommRange(f64),
    Custom(CustomTopology),
}

impl TopologyMode {
    pub fn from_env_config(env: &EnvConfig) -> Self {
        match (env.comm_range, env.enable_custom_topology, env.custom_topology) {
            (Some(r), _, _) => TopologyMode::CommRange(r),
            (None, true, Some(kind)) => TopologyMode::Custom(kind),
            _ => TopologyMode::FullyConnected,
        }
    }
}

/// Network topology for one env instance.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    mode: TopologyMode,
    fixed: Option<Grid<bool>>,
}

impl NetworkTopology {
    pub fn new(mode: TopologyMode) -> Self {
        Self { mode, fixed: None }
    }

    pub fn mode(&self) -> TopologyMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TopologyMode) {
        self.mode = mode;
        self.fixed = None;
    }

    /// Episode start: draws the fixed graph (if any) and returns the masks.
    pub fn init<R: Rng>(
        &mut self,
        agents: &[AgentState],
        padding_mask: &[bool],
        arena: &Arena,
        rng: &mut R,
    ) -> Result<NetworkUpdate, EnvError> {
        self.fixed = match self.mode {
            TopologyMode::Custom(CustomTopology::Line) => {
                Some(line_topology(padding_mask, false, rng))
            }
            TopologyMode::Custom(CustomTopology::Ring) => {
                Some(line_topology(padding_mask, true, rng))
            }
            TopologyMode::Custom(CustomTopology::Star) => Some(star_topology(padding_mask, rng)?),
            _ => None,
        };
        Ok(self.update(agents, padding_mask, arena))
    }

    /// Per-step update after agents moved.
    pub fn update(&self, agents: &[AgentState], padding_mask: &[bool], arena: &Arena) -> NetworkUpdate {
        let n = agents.len();
        match (self.mode, &self.fixed) {
            (TopologyMode::CommRange(r), _) => range_topology(agents, padding_mask, arena, r),
            (TopologyMode::Custom(_), Some(masks)) => NetworkUpdate {
                neighbor_masks: masks.clone(),
                comm_loss_agents: None,
            },
            // Custom graph without init: fall back to full connectivity.
            _ => NetworkUpdate {
                neighbor_masks: Grid::filled(n, n, true),
                comm_loss_agents: None,
            },
        }
    }
}

/// Neighbors within `comm_range` (inclusive), self-loops included.
pub fn range_topology(
    agents: &[AgentState],
    padding_mask: &[bool],
    arena: &Arena,
    comm_range: f64,
) -> NetworkUpdate {
    let n = agents.len();
    let active = active_indices(padding_mask);
    let mut masks = Grid::filled(n, n, false);
    for &i in &active {
        for &j in &active {
            let (_, d) = arena.displacement(agents[j].x - agents[i].x, agents[j].y - agents[i].y);
            masks.set(i, j, d <= comm_range);
        }
    }
    let comm_loss = (0..n)
        .map(|i| padding_mask[i] && masks.row_count(i) == 1)
        .collect();
    NetworkUpdate {
        neighbor_masks: masks,
        comm_loss_agents: Some(comm_loss),
    }
}

/// Random path through the active agents; closed into a cycle when `ring`.
pub fn line_topology<R: Rng>(padding_mask: &[bool], ring: bool, rng: &mut R) -> Grid<bool> {
    let n = padding_mask.len();
    let active = active_indices(padding_mask);
    let mut masks = Grid::filled(n, n, false);
    for &i in &active {
        masks.set(i, i, true);
    }

    let mut order = active.clone();
    order.shuffle(rng);
    for pair in order.windows(2) {
        masks.set(pair[0], pair[1], true);
        masks.set(pair[1], pair[0], true);
    }
    if ring {
        if let (Some(&first), Some(&last)) = (order.first(), order.last()) {
            masks.set(first, last, true);
            masks.set(last, first, true);
        }
    }
    masks
}

/// One random hub connected to every other active agent.
pub fn star_topology<R: Rng>(padding_mask: &[bool], rng: &mut R) -> Result<Grid<bool>, EnvError> {
    let n = padding_mask.len();
    let active = active_indices(padding_mask);
    if active.len() < 2 {
        return Err(EnvError::StarTopologyTooSmall(active.len()));
    }
    let center = active[rng.gen_range(0..active.len())];

    let mut masks = Grid::filled(n, n, false);
    for &i in &active {
        masks.set(i, i, true);
        masks.set(center, i, true);
        masks.set(i, center, true);
    }
    Ok(masks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn line_of_agents(xs: &[f64]) -> Vec<AgentState> {
        xs.iter().map(|&x| AgentState::moving(x, 0.0, 0.0, 1.0)).collect()
    }

    #[test]
    fn test_range_topology_self_loops_and_comm_loss() {
        let agents = line_of_agents(&[0.0, 50.0, 200.0, 0.0]);
        let mask = vec![true, true, true, false];
        let up = range_topology(&agents, &mask, &Arena::new(250.0, false), 60.0);
        let m = &up.neighbor_masks;
        assert!(*m.get(0, 0) && *m.get(0, 1) && *m.get(1, 0));
        assert!(!*m.get(1, 2));
        assert!(!*m.get(3, 3));
        assert_eq!(up.comm_loss_agents, Some(vec![false, false, true, false]));
        assert!(up.any_comm_loss());
    }

    #[test]
    fn test_range_is_inclusive() {
        let agents = line_of_agents(&[0.0, 60.0]);
        let up = range_topology(&agents, &[true, true], &Arena::new(250.0, false), 60.0);
        assert!(*up.neighbor_masks.get(0, 1));
        assert!(!up.any_comm_loss());
    }

    #[test]
    fn test_range_topology_periodic_wraps() {
        let agents = line_of_agents(&[-120.0, 120.0]);
        let up = range_topology(&agents, &[true, true], &Arena::new(250.0, true), 20.0);
        assert!(*up.neighbor_masks.get(0, 1));
    }

    #[test]
    fn test_line_topology_degrees() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mask = vec![true, true, true, true, true, false];
        let m = line_topology(&mask, false, &mut rng);
        assert!(m.is_symmetric());
        let degrees: Vec<usize> = (0..5).map(|i| m.row_count(i) - 1).collect();
        assert_eq!(degrees.iter().sum::<usize>(), 2 * 4);
        assert_eq!(degrees.iter().filter(|&&d| d == 1).count(), 2);
        assert_eq!(m.row_count(5), 0);
    }

    #[test]
    fn test_ring_topology_degrees() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mask = vec![true; 6];
        let m = line_topology(&mask, true, &mut rng);
        assert!((0..6).all(|i| m.row_count(i) == 3));
    }

    #[test]
    fn test_star_topology() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mask = vec![true, true, true, true, false];
        let m = star_topology(&mask, &mut rng).unwrap();
        let hubs: Vec<usize> = (0..4).filter(|&i| m.row_count(i) == 4).collect();
        assert_eq!(hubs.len(), 1);
        assert!((0..4).filter(|i| !hubs.contains(i)).all(|i| m.row_count(i) == 2));
    }

    #[test]
    fn test_star_needs_two_agents() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            star_topology(&[true, false], &mut rng),
            Err(EnvError::StarTopologyTooSmall(1))
        ));
    }

    #[test]
    fn test_fixed_topology_is_frozen() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut topo = NetworkTopology::new(TopologyMode::Custom(CustomTopology::Ring));
        let arena = Arena::new(250.0, false);
        let agents = line_of_agents(&[0.0, 10.0, 20.0, 30.0]);
        let mask = vec![true; 4];
        let first = topo.init(&agents, &mask, &arena, &mut rng).unwrap();
        let moved = line_of_agents(&[100.0, -90.0, 5.0, 300.0]);
        let later = topo.update(&moved, &mask, &arena);
        assert_eq!(first.neighbor_masks, later.neighbor_masks);
        assert!(later.comm_loss_agents.is_none());
    }

    #[test]
    fn test_fully_connected_mode() {
        let topo = NetworkTopology::new(TopologyMode::FullyConnected);
        let up = topo.update(&line_of_agents(&[0.0, 1000.0, 0.0]), &[true, true, false], &Arena::new(250.0, false));
        assert!(up.neighbor_masks.iter().all(|&b| b));
        assert!(up.comm_loss_agents.is_none());
    }
}
