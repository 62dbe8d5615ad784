// lazy_control_env/src/lib.rs
//
// Python bindings for the lazy flocking environment.
//
// Provides a Gym-style API for training laziness policies:
// - Env: single environment with reset(seed), custom_reset(...), step(action)
//   and step_multi(actions) for the per-agent (CTDE) interface
// - VecEnv: independent environments stepped in lockstep
//
// All operations are deterministic given seeds.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use lazy_control::rl::{AgentObservation, MultiAgentObservation};
use lazy_control::{Config, FlockingEnv, Observation, StepInfo, VecEnv as RustVecEnv, OBS_VERSION};

fn value_err(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn load_config(config_path: Option<&str>) -> PyResult<Config> {
    match config_path {
        Some(p) => Config::from_yaml_file(Path::new(p)).map_err(value_err),
        None => Config::load(None).map_err(value_err),
    }
}

/// Convert a joint Observation to a Python dictionary.
fn observation_to_dict(py: Python<'_>, obs: &Observation) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    let (n, _, d) = obs.shape();

    let infos: Vec<Vec<Vec<f64>>> = (0..n)
        .map(|i| (0..n).map(|j| obs.entry(i, j).to_vec()).collect())
        .collect();

    dict.set_item("obs_version", obs.obs_version)?;
    dict.set_item("time_step", obs.time_step)?;
    dict.set_item("obs_dim", d)?;
    dict.set_item("local_agent_infos", infos)?;
    dict.set_item("neighbor_masks", obs.neighbor_masks.to_nested())?;
    dict.set_item("padding_mask", obs.padding_mask.clone())?;
    dict.set_item("is_from_my_env", obs.is_from_my_env)?;

    Ok(dict.into())
}

fn agent_observation_to_dict(py: Python<'_>, obs: &AgentObservation) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("centralized_agent_info", obs.centralized_agent_info.to_vec())?;
    dict.set_item("neighbor_mask", obs.neighbor_mask.clone())?;
    dict.set_item("padding_mask", obs.padding_mask.clone())?;
    Ok(dict.into())
}

fn multi_observation_to_dict(py: Python<'_>, obs: &MultiAgentObservation) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    for (name, agent_obs) in obs {
        dict.set_item(name, agent_observation_to_dict(py, agent_obs)?)?;
    }
    Ok(dict.into())
}

/// Convert a StepInfo to a Python dictionary.
fn step_info_to_dict(py: Python<'_>, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    dict.set_item("time_step", info.time_step)?;
    dict.set_item("spatial_entropy", info.spatial_entropy)?;
    dict.set_item("velocity_entropy", info.velocity_entropy)?;
    dict.set_item("alignment", info.alignment)?;
    dict.set_item("original_reward", info.original_reward)?;
    dict.set_item("comm_loss_agents", info.comm_loss_agents.clone())?;
    dict.set_item(
        "termination_reason",
        info.termination_reason.map(|r| r.as_str()),
    )?;
    for (key, value) in &info.extra {
        dict.set_item(key, *value)?;
    }

    Ok(dict.into())
}

fn to_points(values: Vec<Vec<f64>>, what: &str) -> PyResult<Vec<[f64; 2]>> {
    values
        .into_iter()
        .map(|v| match v.as_slice() {
            [x, y] => Ok([*x, *y]),
            _ => Err(PyValueError::new_err(format!(
                "each {what} entry must have 2 components; got {}",
                v.len()
            ))),
        })
        .collect()
}

/// Gym-style environment wrapper.
///
/// - reset(seed) -> observation
/// - step(action) -> (observation, reward, done, info)
/// - step_multi(actions) -> (observations, rewards, dones, info)
#[pyclass]
pub struct Env {
    inner: FlockingEnv,
}

#[pymethods]
impl Env {
    /// Create a new environment.
    ///
    /// Args:
    ///     config_path: YAML config (default: LAZY_CONTROL_CONFIG, then
    ///         configs/default_env_config.yaml, then built-in defaults)
    ///     seed: Optional seed; falls back to env.seed in the config
    #[new]
    #[pyo3(signature = (config_path=None, seed=None))]
    fn new(config_path: Option<&str>, seed: Option<u64>) -> PyResult<Self> {
        let config = load_config(config_path)?;
        let inner = FlockingEnv::new(config, seed).map_err(value_err)?;
        Ok(Self { inner })
    }

    /// Reset the environment.
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, py: Python<'_>, seed: Option<u64>) -> PyResult<Py<PyDict>> {
        let obs = self.inner.reset(seed).map_err(value_err)?;
        observation_to_dict(py, &obs)
    }

    /// Reset to given initial conditions for the active agents.
    ///
    /// Args:
    ///     positions: [[x, y], ...]
    ///     velocities: [[vx, vy], ...]
    ///     headings: [theta, ...]
    ///     num_agents_max: must match the configured maximum if given
    ///     comm_range: communication range for this and later episodes
    #[pyo3(signature = (positions, velocities, headings, num_agents_max=None, comm_range=None))]
    fn custom_reset(
        &mut self,
        py: Python<'_>,
        positions: Vec<Vec<f64>>,
        velocities: Vec<Vec<f64>>,
        headings: Vec<f64>,
        num_agents_max: Option<usize>,
        comm_range: Option<f64>,
    ) -> PyResult<Py<PyDict>> {
        let positions = to_points(positions, "position")?;
        let velocities = to_points(velocities, "velocity")?;
        let obs = self
            .inner
            .custom_reset(&positions, &velocities, &headings, num_agents_max, comm_range)
            .map_err(value_err)?;
        observation_to_dict(py, &obs)
    }

    /// Take a step (single_env).
    ///
    /// Args:
    ///     action: laziness per agent slot (length num_agents_max)
    fn step(
        &mut self,
        py: Python<'_>,
        action: Vec<f64>,
    ) -> PyResult<(Py<PyDict>, f64, bool, Py<PyDict>)> {
        let result = self.inner.step(&action).map_err(value_err)?;
        let obs = observation_to_dict(py, &result.observation)?;
        let info = step_info_to_dict(py, &result.info)?;
        Ok((obs, result.reward, result.done, info))
    }

    /// Take a step (multi_env).
    ///
    /// Args:
    ///     actions: {agent_name: laziness} for every active agent
    #[allow(clippy::type_complexity)]
    fn step_multi(
        &mut self,
        py: Python<'_>,
        actions: HashMap<String, f64>,
    ) -> PyResult<(Py<PyDict>, HashMap<String, f64>, HashMap<String, bool>, Py<PyDict>)> {
        let actions: BTreeMap<String, f64> = actions.into_iter().collect();
        let result = self.inner.step_multi(&actions).map_err(value_err)?;
        let obs = multi_observation_to_dict(py, &result.observations)?;
        let info = step_info_to_dict(py, &result.info)?;
        Ok((
            obs,
            result.rewards.into_iter().collect(),
            result.dones.into_iter().collect(),
            info,
        ))
    }

    /// Per-agent observations of the current state.
    fn multi_observation(&self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        multi_observation_to_dict(py, &self.inner.multi_observation())
    }

    /// 0/1 "listen to every neighbor" matrix of the current state.
    fn vicsek_action(&self) -> Vec<Vec<u8>> {
        self.inner.vicsek_action().to_nested()
    }

    /// Resolved config as YAML.
    fn config_yaml(&self) -> PyResult<String> {
        self.inner.config().to_yaml_string().map_err(value_err)
    }

    #[getter]
    fn num_agents_max(&self) -> usize {
        self.inner.num_agents_max()
    }

    #[getter]
    fn num_agents(&self) -> usize {
        self.inner.num_agents()
    }

    #[getter]
    fn obs_dim(&self) -> usize {
        self.inner.config().env.obs_dim
    }

    #[getter]
    fn time_step(&self) -> usize {
        self.inner.time_step()
    }

    #[getter]
    fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }

    #[getter]
    fn lost_comm_step(&self) -> Option<usize> {
        self.inner.lost_comm_step()
    }
}

/// Independent environments stepped in lockstep.
#[pyclass]
pub struct VecEnv {
    inner: RustVecEnv,
}

#[pymethods]
impl VecEnv {
    /// Create `n` environments; env i is seeded with seed + i.
    #[new]
    #[pyo3(signature = (n, config_path=None, seed=None))]
    fn new(n: usize, config_path: Option<&str>, seed: Option<u64>) -> PyResult<Self> {
        if n == 0 {
            return Err(PyValueError::new_err("n must be > 0"));
        }
        let config = load_config(config_path)?;
        let inner = RustVecEnv::new(n, config, seed).map_err(value_err)?;
        Ok(Self { inner })
    }

    /// Reset all environments, optionally with one seed per environment.
    #[pyo3(signature = (seeds=None))]
    fn reset_all(&mut self, py: Python<'_>, seeds: Option<Vec<u64>>) -> PyResult<Vec<Py<PyDict>>> {
        let observations = self
            .inner
            .reset_all(seeds.as_deref())
            .map_err(value_err)?;
        observations
            .iter()
            .map(|obs| observation_to_dict(py, obs))
            .collect()
    }

    /// Step all environments (one laziness vector per environment).
    #[allow(clippy::type_complexity)]
    fn step(
        &mut self,
        py: Python<'_>,
        actions: Vec<Vec<f64>>,
    ) -> PyResult<(Vec<Py<PyDict>>, Vec<f64>, Vec<bool>, Vec<Py<PyDict>>)> {
        let results = self.inner.step(&actions).map_err(value_err)?;

        let observations: PyResult<Vec<_>> = results
            .iter()
            .map(|r| observation_to_dict(py, &r.observation))
            .collect();
        let rewards: Vec<f64> = results.iter().map(|r| r.reward).collect();
        let dones: Vec<bool> = results.iter().map(|r| r.done).collect();
        let infos: PyResult<Vec<_>> = results
            .iter()
            .map(|r| step_info_to_dict(py, &r.info))
            .collect();

        Ok((observations?, rewards, dones, infos?))
    }

    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    #[getter]
    fn seeds(&self) -> Vec<u64> {
        self.inner.seeds()
    }

    #[getter]
    fn dones(&self) -> Vec<bool> {
        self.inner.dones()
    }
}

/// Observation schema version.
#[pyfunction]
fn obs_version() -> u32 {
    OBS_VERSION
}

/// Python module definition.
#[pymodule]
fn lazy_control_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Env>()?;
    m.add_class::<VecEnv>()?;
    m.add_function(wrap_pyfunction!(obs_version, m)?)?;
    Ok(())
}
