// src/control.rs
//
// Flocking controllers and kinematics.
//
// Both controllers output a heading-rate command u_i (rad/s) per slot,
// saturated to +-max_turn_rate, and 0 for padding slots. Only neighbors in the
// supplied network (restricted to active pairs) contribute.
//
// Vicsek:
//   u_i = mean_{j in N_i}(theta_j - theta_i) / dt
//
// Augmented Cucker-Smale (ACS):
//   u_cs  = lam / N_i * sum_j psi(r_ij) sin(theta_ij)          psi(r) = (1+r^2)^-beta
//   u_coh = sig / (N_i V) * sum_j ( k1/(2 r^2) <v_ij, p_ij> + k2/(2 r) (r - r0) )
//                                   * <[-sin theta_i, cos theta_i], p_ij>
//
// with N_i = |N_i| + eps. Self terms vanish (p_ii = 0, sin 0 = 0).

use crate::config::ControlConfig;
use crate::geometry::Arena;
use crate::grid::Grid;
use crate::state::{active_indices, AgentState, FlockState, RelativeState};

/// Regularizer on the neighbor count.
const NEIGHBOR_EPS: f64 = f64::EPSILON;

fn neighbor_count(net: &Grid<bool>, i: usize, active: &[usize]) -> f64 {
    active.iter().filter(|&&j| *net.get(i, j)).count() as f64 + NEIGHBOR_EPS
}

/// Vicsek heading alignment.
pub fn vicsek_control(
    rel: &RelativeState,
    net: &Grid<bool>,
    padding_mask: &[bool],
    dt: f64,
    u_max: f64,
) -> Vec<f64> {
    let active = active_indices(padding_mask);
    let mut u = vec![0.0; padding_mask.len()];
    for &i in &active {
        let n = neighbor_count(net, i, &active);
        let sum: f64 = active
            .iter()
            .filter(|&&j| *net.get(i, j))
            .map(|&j| *rel.headings.get(i, j))
            .sum();
        u[i] = (sum / n / dt).clamp(-u_max, u_max);
    }
    u
}

/// Augmented Cucker-Smale alignment plus cohesion / separation.
pub fn acs_control(
    state: &FlockState,
    rel: &RelativeState,
    net: &Grid<bool>,
    control: &ControlConfig,
) -> Vec<f64> {
    let active = state.active_indices();
    let u_max = control.max_turn_rate;
    let mut u = vec![0.0; state.num_agents_max()];

    for &i in &active {
        let n = neighbor_count(net, i, &active);
        let (sin_i, cos_i) = state.agents[i].theta.sin_cos();

        let mut align = 0.0;
        let mut bond = 0.0;
        for &j in &active {
            if i == j || !*net.get(i, j) {
                continue;
            }
            let r = *rel.distances.get(i, j);
            // Coincident agents carry no direction information.
            if r <= f64::EPSILON {
                continue;
            }
            let [px, py] = *rel.positions.get(i, j);
            let [vx, vy] = *rel.velocities.get(i, j);

            let psi = (1.0 + r * r).powf(-control.beta);
            align += psi * rel.headings.get(i, j).sin();

            let v_dot_p = vx * px + vy * py;
            let radial = control.k1 / (2.0 * r * r) * v_dot_p + control.k2 / (2.0 * r) * (r - control.r0);
            let lateral = -sin_i * px + cos_i * py;
            bond += radial * lateral;
        }

        let u_cs = control.lam / n * align;
        let u_coh = control.sig / (n * control.speed) * bond;
        u[i] = (u_cs + u_coh).clamp(-u_max, u_max);
    }
    u
}

/// Scale each command by (1 - laziness).
pub fn apply_laziness(u: &[f64], laziness: &[f64]) -> Vec<f64> {
    u.iter().zip(laziness).map(|(ui, a)| ui * (1.0 - a)).collect()
}

/// Advance one step.
///
/// Positions move with the pre-step velocities, headings integrate `u * dt`,
/// and velocities are rebuilt from the new headings for active agents.
/// Padding slots keep zero velocity.
pub fn integrate(
    agents: &[AgentState],
    padding_mask: &[bool],
    u: &[f64],
    dt: f64,
    speed: f64,
    arena: &Arena,
) -> Vec<AgentState> {
    agents
        .iter()
        .zip(padding_mask)
        .zip(u)
        .map(|((a, &active), &ui)| {
            let (x, y) = arena.wrap(a.x + a.vx * dt, a.y + a.vy * dt);
            let theta = a.theta + ui * dt;
            if active {
                AgentState {
                    x,
                    y,
                    vx: speed * theta.cos(),
                    vy: speed * theta.sin(),
                    theta,
                }
            } else {
                AgentState {
                    x,
                    y,
                    vx: 0.0,
                    vy: 0.0,
                    theta,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::leading_padding_mask;

    fn flock(agents: Vec<AgentState>, num_active: usize) -> FlockState {
        let n = agents.len();
        let padding_mask = leading_padding_mask(num_active, n);
        FlockState {
            neighbor_masks: Grid::filled(n, n, true),
            agents,
            padding_mask,
        }
    }

    #[test]
    fn test_vicsek_turns_toward_mean_heading() {
        let s = flock(
            vec![
                AgentState::moving(0.0, 0.0, 0.0, 15.0),
                AgentState::moving(10.0, 0.0, 0.02, 15.0),
                AgentState::moving(0.0, 0.0, 3.0, 15.0),
            ],
            2,
        );
        let arena = Arena::new(250.0, false);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &arena);
        let u = vicsek_control(&rel, &s.neighbor_masks, &s.padding_mask, 0.1, 8.0 / 15.0);
        // mean relative heading = 0.01, / dt = 0.1, below saturation
        assert!((u[0] - 0.1).abs() < 1e-9);
        assert!((u[1] + 0.1).abs() < 1e-9);
        assert_eq!(u[2], 0.0);
    }

    #[test]
    fn test_vicsek_saturates() {
        let s = flock(
            vec![
                AgentState::moving(0.0, 0.0, 0.0, 15.0),
                AgentState::moving(10.0, 0.0, 2.0, 15.0),
            ],
            2,
        );
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &Arena::new(250.0, false));
        let u = vicsek_control(&rel, &s.neighbor_masks, &s.padding_mask, 0.1, 0.5);
        assert_eq!(u, vec![0.5, -0.5]);
    }

    #[test]
    fn test_acs_is_zero_in_aligned_lattice_at_r0() {
        // Two agents side by side at exactly r0, same heading: no alignment
        // error, no relative velocity and no spacing error.
        let control = ControlConfig::default();
        let s = flock(
            vec![
                AgentState::moving(0.0, 0.0, 0.0, control.speed),
                AgentState::moving(0.0, control.r0, 0.0, control.speed),
            ],
            2,
        );
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &Arena::new(250.0, false));
        let u = acs_control(&s, &rel, &s.neighbor_masks, &control);
        assert!(u.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_acs_cohesion_turns_toward_far_neighbor() {
        // Neighbor directly to the left (+y) beyond r0: agent 0 heading +x
        // should turn left (positive rate).
        let control = ControlConfig::default();
        let s = flock(
            vec![
                AgentState::moving(0.0, 0.0, 0.0, control.speed),
                AgentState::moving(0.0, 150.0, 0.0, control.speed),
            ],
            2,
        );
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &Arena::new(250.0, false));
        let u = acs_control(&s, &rel, &s.neighbor_masks, &control);
        assert!(u[0] > 0.0);
        assert!(u[1] < 0.0);
        assert!(u.iter().all(|v| v.abs() <= control.max_turn_rate));
    }

    #[test]
    fn test_acs_ignores_non_neighbors_and_padding() {
        let control = ControlConfig::default();
        let mut s = flock(
            vec![
                AgentState::moving(0.0, 0.0, 0.0, control.speed),
                AgentState::moving(0.0, 150.0, 1.0, control.speed),
                AgentState::moving(5.0, 5.0, 2.0, control.speed),
            ],
            2,
        );
        s.neighbor_masks = Grid::from_fn(3, 3, |i, j| i == j);
        let rel = RelativeState::compute(&s.agents, &s.padding_mask, &Arena::new(250.0, false));
        let u = acs_control(&s, &rel, &s.neighbor_masks, &control);
        assert_eq!(u, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_apply_laziness() {
        assert_eq!(apply_laziness(&[1.0, -2.0, 0.5], &[0.0, 0.5, 1.0]), vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_integrate_uses_old_velocity_for_position() {
        let agents = vec![AgentState::moving(0.0, 0.0, 0.0, 10.0), AgentState::default()];
        let next = integrate(&agents, &[true, false], &[1.0, 1.0], 0.1, 10.0, &Arena::new(250.0, false));
        assert!((next[0].x - 1.0).abs() < 1e-12);
        assert_eq!(next[0].y, 0.0);
        assert!((next[0].theta - 0.1).abs() < 1e-12);
        assert!((next[0].vx - 10.0 * 0.1f64.cos()).abs() < 1e-12);
        assert_eq!(next[1].vx, 0.0);
        assert_eq!(next[1].vy, 0.0);
    }

    #[test]
    fn test_integrate_wraps_in_periodic_arena() {
        let agents = vec![AgentState::moving(124.5, 0.0, 0.0, 10.0)];
        let next = integrate(&agents, &[true], &[0.0], 0.1, 10.0, &Arena::new(250.0, true));
        assert!((next[0].x - (-124.5)).abs() < 1e-9);
    }
}
