// src/config.rs
//
// Central configuration for the lazy flocking environment.
//
// Two sections, matching the YAML layout:
// - control: flocking controller parameters (speed, turn-rate limit, ACS gains)
// - env:     episode / network / task / reward parameters
//
// Configs are loaded from YAML, then `resolve()`d: dependent defaults are
// filled (entropy_p_goal = 0.7 * r0 for ACS) and the whole config validated.
// A small set of environment variables can override fields for batch runs.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/default_env_config.yaml";

/// Environment variable pointing at a config file.
pub const CONFIG_PATH_ENV: &str = "LAZY_CONTROL_CONFIG";

/// Errors raised while loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config field '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Flocking controller parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Constant agent speed V (m/s).
    pub speed: f64,
    /// Saturation of the heading-rate control (rad/s).
    pub max_turn_rate: f64,
    /// Side length L of the initial square (and of the periodic arena), m.
    pub initial_position_bound: f64,
    /// Communication decay rate in psi(r) = (1 + r^2)^-beta.
    pub beta: f64,
    /// Alignment strength.
    pub lam: f64,
    /// Cohesion / separation (bonding) strength.
    pub sig: f64,
    pub k1: f64,
    pub k2: f64,
    /// Desired inter-agent distance R (m).
    pub r0: f64,
    /// Weight of the cruise (time) cost against the heading-rate cost.
    pub rho: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            speed: 15.0,
            max_turn_rate: 8.0 / 15.0,
            initial_position_bound: 250.0,
            beta: 1.0 / 3.0,
            lam: 5.0,
            sig: 1.0,
            k1: 1.0,
            k2: 3.0,
            r0: 60.0,
            rho: 1.0,
        }
    }
}

/// Single-agent (joint action) or per-agent (CTDE) interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvMode {
    #[default]
    SingleEnv,
    MultiEnv,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Continuous laziness in [0, 1] per agent.
    #[default]
    LazinessVector,
    /// Laziness restricted to {0, 1} per agent.
    BinaryVector,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Augmented Cucker-Smale flocking (alignment + cohesion/separation).
    #[default]
    Acs,
    /// Vicsek heading alignment.
    Vicsek,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Acs => "acs",
            TaskType::Vicsek => "vicsek",
        }
    }

    /// Parse a task name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<TaskType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acs" => Some(TaskType::Acs),
            "vicsek" => Some(TaskType::Vicsek),
            _ => None,
        }
    }
}

/// Fixed communication topologies, drawn once per episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomTopology {
    Line,
    Ring,
    Star,
}

impl CustomTopology {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomTopology::Line => "line",
            CustomTopology::Ring => "ring",
            CustomTopology::Star => "star",
        }
    }

    pub fn parse(s: &str) -> Option<CustomTopology> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Some(CustomTopology::Line),
            "ring" => Some(CustomTopology::Ring),
            "star" => Some(CustomTopology::Star),
            _ => None,
        }
    }
}

/// Pool of agent counts an episode may start with.
///
/// YAML forms: `20`, `[10, 20, 30]`, `{min: 8, max: 16}` (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumAgentsPool {
    Count(usize),
    List(Vec<usize>),
    Range { min: usize, max: usize },
}

impl Default for NumAgentsPool {
    fn default() -> Self {
        NumAgentsPool::Count(20)
    }
}

impl NumAgentsPool {
    /// Expand the pool into the list of candidate counts.
    pub fn candidates(&self) -> Vec<usize> {
        match self {
            NumAgentsPool::Count(n) => vec![*n],
            NumAgentsPool::List(v) => v.clone(),
            NumAgentsPool::Range { min, max } => (*min..=*max).collect(),
        }
    }

    pub fn min(&self) -> usize {
        self.candidates().into_iter().min().unwrap_or(0)
    }

    pub fn max(&self) -> usize {
        self.candidates().into_iter().max().unwrap_or(0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let NumAgentsPool::Range { min, max } = self {
            if min > max {
                return Err(ConfigError::invalid(
                    "env.num_agents_pool",
                    format!("range min ({min}) must be <= max ({max})"),
                ));
            }
        }
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(ConfigError::invalid(
                "env.num_agents_pool",
                "must not be empty",
            ));
        }
        if let Some(bad) = candidates.iter().find(|&&n| n < 2) {
            return Err(ConfigError::invalid(
                "env.num_agents_pool",
                format!("all agent counts must be > 1; got {bad}"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for NumAgentsPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumAgentsPool::Count(n) => write!(f, "{n}"),
            NumAgentsPool::List(v) => write!(f, "{v:?}"),
            NumAgentsPool::Range { min, max } => write!(f, "{min}..={max}"),
        }
    }
}

/// Episode, network, task and reward parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    /// Enables the shaped training reward for ACS.
    pub is_training: bool,
    pub seed: Option<u64>,
    /// Per-pair observation width: 4 (bounded arena) or 6 (periodic arena).
    pub obs_dim: usize,
    pub agent_name_prefix: String,
    pub env_mode: EnvMode,
    pub action_type: ActionType,
    pub num_agents_pool: NumAgentsPool,
    /// Integration step (s).
    pub dt: f64,
    pub enable_custom_topology: bool,
    pub custom_topology: Option<CustomTopology>,
    /// Communication radius (m); None means no range-based network.
    pub comm_range: Option<f64>,
    pub max_time_steps: usize,
    /// Disables task-completion termination (episodes run to max_time_steps).
    pub use_fixed_episode_length: bool,
    pub get_state_hist: bool,
    pub get_action_hist: bool,
    /// Keep running when an agent loses all its neighbors.
    pub ignore_comm_lost_agents: bool,
    pub periodic_boundary: bool,
    pub task_type: TaskType,

    // ----- Vicsek termination -----
    pub alignment_goal: f64,
    pub alignment_rate_goal: f64,
    pub alignment_window_length: usize,

    // ----- ACS termination -----
    /// Spatial entropy goal; None resolves to 0.7 * r0.
    pub entropy_p_goal: Option<f64>,
    pub entropy_v_goal: f64,
    pub entropy_p_rate_goal: f64,
    pub entropy_v_rate_goal: f64,
    pub entropy_rate_window_length: usize,

    // ----- ACS training reward weights -----
    pub acs_train_w_pos: f64,
    pub acs_train_w_vel: f64,
    pub acs_train_w_ctrl: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            is_training: false,
            seed: None,
            obs_dim: 4,
            agent_name_prefix: "agent_".to_string(),
            env_mode: EnvMode::SingleEnv,
            action_type: ActionType::LazinessVector,
            num_agents_pool: NumAgentsPool::default(),
            dt: 0.1,
            enable_custom_topology: false,
            custom_topology: None,
            comm_range: None,
            max_time_steps: 1000,
            use_fixed_episode_length: false,
            get_state_hist: false,
            get_action_hist: false,
            ignore_comm_lost_agents: false,
            periodic_boundary: false,
            task_type: TaskType::Acs,
            alignment_goal: 0.97,
            alignment_rate_goal: 0.03,
            alignment_window_length: 32,
            entropy_p_goal: None,
            entropy_v_goal: 0.1,
            entropy_p_rate_goal: 0.1,
            entropy_v_rate_goal: 0.2,
            entropy_rate_window_length: 50,
            acs_train_w_pos: 1.0,
            acs_train_w_vel: 0.2,
            acs_train_w_ctrl: 0.02,
        }
    }
}

impl EnvConfig {
    /// Observation width implied by the boundary mode.
    pub fn expected_obs_dim(&self) -> usize {
        if self.periodic_boundary {
            6
        } else {
            4
        }
    }

    /// Resolved spatial entropy goal (falls back to 0.7 * r0).
    pub fn entropy_p_goal_or(&self, r0: f64) -> f64 {
        self.entropy_p_goal.unwrap_or(0.7 * r0)
    }
}

/// Complete environment configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub control: ControlConfig,
    pub env: EnvConfig,
}

impl Config {
    /// Built-in defaults, resolved.
    pub fn resolved_default() -> Result<Self, ConfigError> {
        Config::default().resolve()
    }

    /// Load a config from a YAML file, then resolve and validate it.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a config from a YAML string, then resolve and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(yaml)?;
        cfg.resolve()
    }

    /// Locate and load a config.
    ///
    /// Precedence (highest to lowest):
    /// 1. `path` argument (must exist)
    /// 2. `LAZY_CONTROL_CONFIG` environment variable (must exist)
    /// 3. `configs/default_env_config.yaml` if present
    /// 4. Built-in defaults (with a warning)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            return Self::from_yaml_file(p);
        }
        if let Ok(raw) = env::var(CONFIG_PATH_ENV) {
            if !raw.is_empty() {
                info!(path = %raw, "loading config from {CONFIG_PATH_ENV}");
                return Self::from_yaml_file(raw);
            }
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::from_yaml_file(default_path);
        }
        warn!("no config provided; using the built-in default config");
        Self::resolved_default()
    }

    /// Fill dependent defaults and validate.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        match self.env.task_type {
            TaskType::Acs => {
                if self.env.entropy_p_goal.is_none() {
                    self.env.entropy_p_goal = Some(0.7 * self.control.r0);
                }
            }
            TaskType::Vicsek => {
                if self.env.entropy_p_goal.is_some() {
                    warn!("entropy_p_goal is not used in the vicsek task; it will be ignored");
                }
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Switch the task. Leaving the current task drops `entropy_p_goal`, so
    /// the next `resolve()` derives it for the new task (or leaves it unset).
    pub fn set_task_type(&mut self, task: TaskType) {
        if self.env.task_type != task {
            self.env.task_type = task;
            self.env.entropy_p_goal = None;
        }
    }

    /// Validate the config. `resolve()` calls this after filling defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.control;
        let e = &self.env;

        self.env.num_agents_pool.validate()?;

        if !(c.speed > 0.0) {
            return Err(ConfigError::invalid("control.speed", "must be > 0"));
        }
        if !(c.max_turn_rate > 0.0) {
            return Err(ConfigError::invalid("control.max_turn_rate", "must be > 0"));
        }
        if !(c.initial_position_bound > 0.0) {
            return Err(ConfigError::invalid(
                "control.initial_position_bound",
                "must be > 0",
            ));
        }
        if !(e.dt > 0.0) {
            return Err(ConfigError::invalid("env.dt", "must be > 0"));
        }
        if e.max_time_steps == 0 {
            return Err(ConfigError::invalid("env.max_time_steps", "must be > 0"));
        }
        if e.obs_dim != e.expected_obs_dim() {
            return Err(ConfigError::invalid(
                "env.obs_dim",
                format!(
                    "must be {} when periodic_boundary = {}; got {}",
                    e.expected_obs_dim(),
                    e.periodic_boundary,
                    e.obs_dim
                ),
            ));
        }

        match (e.env_mode, e.action_type) {
            (EnvMode::SingleEnv, ActionType::LazinessVector) => {}
            (EnvMode::MultiEnv, ActionType::BinaryVector) => {}
            (EnvMode::SingleEnv, other) => {
                return Err(ConfigError::invalid(
                    "env.action_type",
                    format!("single_env requires laziness_vector; got {other:?}"),
                ));
            }
            (EnvMode::MultiEnv, other) => {
                return Err(ConfigError::invalid(
                    "env.action_type",
                    format!("multi_env requires binary_vector; got {other:?}"),
                ));
            }
        }

        if let Some(r) = e.comm_range {
            if !(r > 0.0) {
                return Err(ConfigError::invalid("env.comm_range", "must be > 0"));
            }
        }

        if e.enable_custom_topology {
            if e.custom_topology.is_none() {
                return Err(ConfigError::invalid(
                    "env.custom_topology",
                    "must be set when enable_custom_topology is true",
                ));
            }
            if e.comm_range.is_some() {
                return Err(ConfigError::invalid(
                    "env.comm_range",
                    "cannot be set when enable_custom_topology is true",
                ));
            }
        }

        match e.task_type {
            TaskType::Vicsek => {
                if e.alignment_window_length == 0 {
                    return Err(ConfigError::invalid(
                        "env.alignment_window_length",
                        "must be > 0",
                    ));
                }
            }
            TaskType::Acs => {
                let p_goal = e.entropy_p_goal_or(c.r0);
                if !(p_goal > 0.0) {
                    return Err(ConfigError::invalid("env.entropy_p_goal", "must be > 0"));
                }
                if !(e.entropy_v_goal > 0.0) {
                    return Err(ConfigError::invalid("env.entropy_v_goal", "must be > 0"));
                }
                if !(e.entropy_p_rate_goal > 0.0) {
                    return Err(ConfigError::invalid(
                        "env.entropy_p_rate_goal",
                        "must be > 0",
                    ));
                }
                if !(e.entropy_v_rate_goal > 0.0) {
                    return Err(ConfigError::invalid(
                        "env.entropy_v_rate_goal",
                        "must be > 0",
                    ));
                }
                if e.entropy_rate_window_length == 0 {
                    return Err(ConfigError::invalid(
                        "env.entropy_rate_window_length",
                        "must be > 0",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Apply environment-variable overrides, then re-resolve.
    ///
    ///   - LAZY_CONTROL_SEED            (u64)
    ///   - LAZY_CONTROL_MAX_TIME_STEPS  (usize)
    ///   - LAZY_CONTROL_COMM_RANGE      (f64, metres; "none" clears it)
    ///   - LAZY_CONTROL_TASK_TYPE       (acs | vicsek)
    ///   - LAZY_CONTROL_TOPOLOGY        (line | ring | star | none)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = env::var("LAZY_CONTROL_SEED") {
            match raw.parse::<u64>() {
                Ok(v) => {
                    self.env.seed = Some(v);
                    info!("LAZY_CONTROL_SEED = {v} (overrode config)");
                }
                Err(_) => warn!("could not parse LAZY_CONTROL_SEED = {raw:?} as u64; ignoring"),
            }
        }

        if let Ok(raw) = env::var("LAZY_CONTROL_MAX_TIME_STEPS") {
            match raw.parse::<usize>() {
                Ok(v) => {
                    self.env.max_time_steps = v;
                    info!("LAZY_CONTROL_MAX_TIME_STEPS = {v} (overrode config)");
                }
                Err(_) => warn!(
                    "could not parse LAZY_CONTROL_MAX_TIME_STEPS = {raw:?} as usize; using {}",
                    self.env.max_time_steps
                ),
            }
        }

        if let Ok(raw) = env::var("LAZY_CONTROL_COMM_RANGE") {
            if raw.eq_ignore_ascii_case("none") {
                self.env.comm_range = None;
                info!("LAZY_CONTROL_COMM_RANGE = none (overrode config)");
            } else {
                match raw.parse::<f64>() {
                    Ok(v) => {
                        self.env.comm_range = Some(v);
                        info!("LAZY_CONTROL_COMM_RANGE = {v} (overrode config)");
                    }
                    Err(_) => {
                        warn!("could not parse LAZY_CONTROL_COMM_RANGE = {raw:?} as f64; ignoring")
                    }
                }
            }
        }

        if let Ok(raw) = env::var("LAZY_CONTROL_TASK_TYPE") {
            match TaskType::parse(&raw) {
                Some(t) => {
                    self.set_task_type(t);
                    info!("LAZY_CONTROL_TASK_TYPE = {} (overrode config)", t.as_str());
                }
                None => warn!("unknown LAZY_CONTROL_TASK_TYPE = {raw:?}; ignoring"),
            }
        }

        if let Ok(raw) = env::var("LAZY_CONTROL_TOPOLOGY") {
            if raw.eq_ignore_ascii_case("none") {
                self.env.enable_custom_topology = false;
                self.env.custom_topology = None;
                info!("LAZY_CONTROL_TOPOLOGY = none (overrode config)");
            } else {
                match CustomTopology::parse(&raw) {
                    Some(t) => {
                        self.env.enable_custom_topology = true;
                        self.env.custom_topology = Some(t);
                        info!("LAZY_CONTROL_TOPOLOGY = {} (overrode config)", t.as_str());
                    }
                    None => warn!("unknown LAZY_CONTROL_TOPOLOGY = {raw:?}; ignoring"),
                }
            }
        }

        self.resolve()
    }

    /// Smallest agent count in the pool.
    pub fn num_agents_min(&self) -> usize {
        self.env.num_agents_pool.min()
    }

    /// Largest agent count in the pool; the padded slot count of every array.
    pub fn num_agents_max(&self) -> usize {
        self.env.num_agents_pool.max()
    }

    /// Pretty JSON dump for startup logging.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }

    /// Write the config as YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolves_entropy_goal() {
        let cfg = Config::resolved_default().expect("default config must be valid");
        assert_eq!(cfg.env.entropy_p_goal, Some(0.7 * 60.0));
        assert_eq!(cfg.num_agents_max(), 20);
    }

    #[test]
    fn test_set_task_type_drops_derived_entropy_goal() {
        let mut cfg = Config::resolved_default().unwrap();
        cfg.set_task_type(TaskType::Vicsek);
        let cfg = cfg.resolve().unwrap();
        assert_eq!(cfg.env.entropy_p_goal, None);

        let mut back = cfg;
        back.set_task_type(TaskType::Acs);
        assert_eq!(back.resolve().unwrap().env.entropy_p_goal, Some(42.0));
    }

    #[test]
    fn test_set_same_task_keeps_entropy_goal() {
        let mut cfg = Config::resolved_default().unwrap();
        cfg.env.entropy_p_goal = Some(30.0);
        cfg.set_task_type(TaskType::Acs);
        assert_eq!(cfg.env.entropy_p_goal, Some(30.0));
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
control:
  speed: 10.0
env:
  num_agents_pool: [8, 12, 16]
  task_type: vicsek
  max_time_steps: 200
"#;
        let cfg = Config::from_yaml_str(yaml).expect("should parse");
        assert_eq!(cfg.control.speed, 10.0);
        assert_eq!(cfg.control.r0, 60.0);
        assert_eq!(cfg.env.task_type, TaskType::Vicsek);
        assert_eq!(cfg.num_agents_min(), 8);
        assert_eq!(cfg.num_agents_max(), 16);
        assert_eq!(cfg.env.entropy_p_goal, None);
    }

    #[test]
    fn test_pool_forms() {
        let range: NumAgentsPool = serde_yaml::from_str("{min: 4, max: 7}").unwrap();
        assert_eq!(range.candidates(), vec![4, 5, 6, 7]);
        let count: NumAgentsPool = serde_yaml::from_str("9").unwrap();
        assert_eq!(count.candidates(), vec![9]);
        let list: NumAgentsPool = serde_yaml::from_str("[3, 5]").unwrap();
        assert_eq!(list.max(), 5);
    }

    #[test]
    fn test_rejects_single_agent_pool() {
        let yaml = "env:\n  num_agents_pool: [1, 4]\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Invalid {
                field: "env.num_agents_pool",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let yaml = "env:\n  num_agents_pool: {min: 9, max: 3}\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_rejects_custom_topology_with_comm_range() {
        let yaml = r#"
env:
  enable_custom_topology: true
  custom_topology: ring
  comm_range: 80.0
"#;
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Invalid {
                field: "env.comm_range",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_custom_topology_without_name() {
        let yaml = "env:\n  enable_custom_topology: true\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_rejects_obs_dim_mismatch() {
        let yaml = "env:\n  periodic_boundary: true\n";
        assert!(Config::from_yaml_str(yaml).is_err());
        let yaml = "env:\n  periodic_boundary: true\n  obs_dim: 6\n";
        assert!(Config::from_yaml_str(yaml).is_ok());
    }

    #[test]
    fn test_rejects_mode_action_mismatch() {
        let yaml = "env:\n  env_mode: multi_env\n";
        assert!(Config::from_yaml_str(yaml).is_err());
        let yaml = "env:\n  env_mode: multi_env\n  action_type: binary_vector\n";
        assert!(Config::from_yaml_str(yaml).is_ok());
    }

    #[test]
    fn test_rejects_unknown_field() {
        let yaml = "env:\n  num_agent_pool: 5\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip_keeps_values() {
        let mut cfg = Config::resolved_default().unwrap();
        cfg.env.custom_topology = Some(CustomTopology::Star);
        cfg.env.enable_custom_topology = true;
        let yaml = cfg.to_yaml_string().unwrap();
        let back = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Config::from_yaml_file("/nonexistent/lazy.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
