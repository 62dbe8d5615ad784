// tests/config_tests.rs
//
// Config loading from YAML files:
// - the shipped default config parses and resolves
// - partial files fall back to defaults
// - invalid or unknown fields are rejected
// - LAZY_CONTROL_* overrides apply, unparsable values are ignored

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use lazy_control::config::{
    Config, ConfigError, CustomTopology, EnvMode, NumAgentsPool, TaskType,
};

fn shipped_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/default_env_config.yaml")
}

fn write_yaml(yaml: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    f
}

#[test]
fn test_shipped_config_resolves() {
    let cfg = Config::from_yaml_file(shipped_config()).unwrap();
    let default = Config::resolved_default().unwrap();
    assert_eq!(cfg.env, default.env.clone());
    assert_eq!(cfg.control.r0, default.control.r0);
    assert!((cfg.control.max_turn_rate - default.control.max_turn_rate).abs() < 1e-9);
    assert_eq!(cfg.env.entropy_p_goal, Some(42.0));
}

#[test]
fn test_partial_file_uses_defaults() {
    let f = write_yaml(
        "env:\n  task_type: vicsek\n  num_agents_pool: {min: 5, max: 9}\n  comm_range: 80.0\n",
    );
    let cfg = Config::from_yaml_file(f.path()).unwrap();
    assert_eq!(cfg.env.task_type, TaskType::Vicsek);
    assert_eq!(cfg.env.num_agents_pool, NumAgentsPool::Range { min: 5, max: 9 });
    assert_eq!(cfg.num_agents_max(), 9);
    assert_eq!(cfg.env.comm_range, Some(80.0));
    assert_eq!(cfg.env.entropy_p_goal, None);
    assert_eq!(cfg.control.speed, 15.0);
}

#[test]
fn test_multi_env_needs_binary_actions() {
    let f = write_yaml("env:\n  env_mode: multi_env\n");
    let err = Config::from_yaml_file(f.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "env.action_type", .. }));

    let f = write_yaml("env:\n  env_mode: multi_env\n  action_type: binary_vector\n");
    let cfg = Config::from_yaml_file(f.path()).unwrap();
    assert_eq!(cfg.env.env_mode, EnvMode::MultiEnv);
}

#[test]
fn test_unknown_field_rejected() {
    let f = write_yaml("env:\n  max_steps: 10\n");
    assert!(matches!(
        Config::from_yaml_file(f.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    assert!(matches!(
        Config::from_yaml_file(&missing),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_yaml_dump_reloads() {
    let cfg = Config::resolved_default().unwrap();
    let yaml = cfg.to_yaml_string().unwrap();
    let f = write_yaml(&yaml);
    let reloaded = Config::from_yaml_file(f.path()).unwrap();
    assert_eq!(reloaded.env, cfg.env);
}

// Environment variables are process-wide.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const OVERRIDE_KEYS: [&str; 5] = [
    "LAZY_CONTROL_SEED",
    "LAZY_CONTROL_MAX_TIME_STEPS",
    "LAZY_CONTROL_COMM_RANGE",
    "LAZY_CONTROL_TASK_TYPE",
    "LAZY_CONTROL_TOPOLOGY",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(*key).ok()))
            .collect::<Vec<_>>();
        for key in keys {
            std::env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.iter() {
            match value {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new(&OVERRIDE_KEYS);
    for (key, val) in vars {
        std::env::set_var(key, val);
    }
    f()
}

#[test]
fn test_env_overrides_apply() {
    let cfg = with_env(
        &[
            ("LAZY_CONTROL_SEED", "7"),
            ("LAZY_CONTROL_MAX_TIME_STEPS", "120"),
            ("LAZY_CONTROL_COMM_RANGE", "35.5"),
            ("LAZY_CONTROL_TASK_TYPE", "vicsek"),
        ],
        || Config::resolved_default().unwrap().apply_env_overrides(),
    )
    .unwrap();
    assert_eq!(cfg.env.seed, Some(7));
    assert_eq!(cfg.env.max_time_steps, 120);
    assert_eq!(cfg.env.comm_range, Some(35.5));
    assert_eq!(cfg.env.task_type, TaskType::Vicsek);
    // derived for acs; not carried into vicsek
    assert_eq!(cfg.env.entropy_p_goal, None);
}

#[test]
fn test_env_topology_override_and_none_values() {
    let mut base = Config::resolved_default().unwrap();
    base.env.comm_range = Some(80.0);
    let cfg = with_env(
        &[
            ("LAZY_CONTROL_COMM_RANGE", "none"),
            ("LAZY_CONTROL_TOPOLOGY", "ring"),
        ],
        || base.clone().apply_env_overrides(),
    )
    .unwrap();
    assert_eq!(cfg.env.comm_range, None);
    assert!(cfg.env.enable_custom_topology);
    assert_eq!(cfg.env.custom_topology, Some(CustomTopology::Ring));

    let cleared = with_env(&[("LAZY_CONTROL_TOPOLOGY", "none")], || {
        cfg.clone().apply_env_overrides()
    })
    .unwrap();
    assert!(!cleared.env.enable_custom_topology);
    assert_eq!(cleared.env.custom_topology, None);
}

#[test]
fn test_unparsable_env_overrides_are_ignored() {
    let base = Config::resolved_default().unwrap();
    let cfg = with_env(
        &[
            ("LAZY_CONTROL_SEED", "seven"),
            ("LAZY_CONTROL_MAX_TIME_STEPS", "-3"),
            ("LAZY_CONTROL_COMM_RANGE", "far"),
            ("LAZY_CONTROL_TASK_TYPE", "boids"),
            ("LAZY_CONTROL_TOPOLOGY", "mesh"),
        ],
        || base.clone().apply_env_overrides(),
    )
    .unwrap();
    assert_eq!(cfg.env, base.env);
}

#[test]
fn test_env_override_that_breaks_validation_is_error() {
    let result = with_env(&[("LAZY_CONTROL_COMM_RANGE", "-5")], || {
        Config::resolved_default().unwrap().apply_env_overrides()
    });
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { field, .. }) if field == "env.comm_range"
    ));
}
