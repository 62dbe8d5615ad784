// src/rl/action.rs
//
// Laziness actions.
//
// A joint action is one laziness value a_i in [0, 1] per slot (length
// num_agents_max); the applied control is (1 - a_i) * u_i. Padding slots are
// ignored downstream. In multi_env mode each agent submits its own scalar and
// the env assembles the joint vector.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::ActionType;
use crate::error::EnvError;
use crate::grid::Grid;
use crate::state::FlockState;

use super::observation::agent_name;

/// Check shape and finiteness, clip into [0, 1] (with a warning) and round
/// binary actions to {0, 1}.
pub fn validate_action(
    action: &[f64],
    num_agents_max: usize,
    action_type: ActionType,
) -> Result<Vec<f64>, EnvError> {
    if action.len() != num_agents_max {
        return Err(EnvError::ActionLength {
            expected: num_agents_max,
            got: action.len(),
        });
    }
    if let Some((index, &value)) = action.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(EnvError::NonFiniteAction { index, value });
    }

    let out_of_range = action.iter().any(|&a| !(0.0..=1.0).contains(&a));
    let mut out: Vec<f64> = if out_of_range {
        let (lo, hi) = action
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| (lo.min(a), hi.max(a)));
        warn!(min = lo, max = hi, "action outside [0, 1]; clipping");
        action.iter().map(|a| a.clamp(0.0, 1.0)).collect()
    } else {
        action.to_vec()
    };

    if action_type == ActionType::BinaryVector {
        for a in &mut out {
            *a = a.round();
        }
    }
    Ok(out)
}

/// Key a per-slot vector by agent name.
pub fn single_to_multi<T: Clone>(values: &[T], prefix: &str) -> BTreeMap<String, T> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (agent_name(prefix, i), v.clone()))
        .collect()
}

/// Assemble a per-slot vector from agent-keyed values.
///
/// Every active agent must be present; padding slots may be omitted and get
/// `T::default()`. Keys that do not name a slot are rejected.
pub fn multi_to_single<T: Clone + Default>(
    values: &BTreeMap<String, T>,
    prefix: &str,
    padding_mask: &[bool],
) -> Result<Vec<T>, EnvError> {
    let n = padding_mask.len();
    let mut out = vec![T::default(); n];
    for (name, v) in values {
        let index = name
            .strip_prefix(prefix)
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&i| i < n)
            .ok_or_else(|| EnvError::UnknownAgent(name.clone()))?;
        out[index] = v.clone();
    }
    for (i, &active) in padding_mask.iter().enumerate() {
        let name = agent_name(prefix, i);
        if active && !values.contains_key(&name) {
            return Err(EnvError::MissingAgentAction(name));
        }
    }
    Ok(out)
}

/// Reference "listen to every neighbor" action as a 0/1 matrix:
/// neighbor mask AND active-pair mask.
pub fn vicsek_action(state: &FlockState) -> Grid<u8> {
    let pairs = Grid::active_pairs(&state.padding_mask);
    state.neighbor_masks.and(&pairs).map(|&b| u8::from(b))
}
