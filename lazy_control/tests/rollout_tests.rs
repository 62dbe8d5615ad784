// tests/rollout_tests.rs
//
// Policy rollouts through EpisodeRunner:
// - every built-in policy completes an episode deterministically
// - attention weights survive a save / load cycle
// - history export writes metrics and trajectory CSVs

use lazy_control::config::{Config, NumAgentsPool};
use lazy_control::rl::{
    AttentionLazinessPolicy, AttentionPolicyConfig, ConstantLazinessPolicy, EpisodeConfig,
    EpisodeRunner, FlockingEnv, FullyActivePolicy, Policy,
};

fn make_config() -> Config {
    let mut cfg = Config::resolved_default().unwrap();
    cfg.env.num_agents_pool = NumAgentsPool::Range { min: 4, max: 8 };
    cfg.env.max_time_steps = 50;
    cfg.env.get_state_hist = true;
    cfg.env.get_action_hist = true;
    cfg.resolve().unwrap()
}

fn attention(width: usize, n_heads: usize, seed: u64) -> AttentionLazinessPolicy {
    let config = AttentionPolicyConfig::new(4)
        .with_d_embed(width)
        .with_d_model(width)
        .with_n_heads(n_heads);
    AttentionLazinessPolicy::seeded(config, seed).unwrap()
}

fn run(policy: Box<dyn Policy>, seed: u64) -> lazy_control::rl::EpisodeSummary {
    let env = FlockingEnv::new(make_config(), Some(seed)).unwrap();
    let mut runner = EpisodeRunner::new(env, policy);
    runner
        .run_episode(&EpisodeConfig::default().with_seed(seed))
        .unwrap()
}

#[test]
fn test_all_policies_complete_episodes() {
    let policies: Vec<Box<dyn Policy>> = vec![
        Box::new(FullyActivePolicy::new()),
        Box::new(ConstantLazinessPolicy::new(0.4)),
        Box::new(attention(16, 4, 0)),
    ];
    for policy in policies {
        let version = policy.version().to_string();
        let summary = run(policy, 21);
        assert_eq!(summary.policy_version, version);
        assert!(summary.length >= 1 && summary.length <= 50);
        assert!(summary.termination_reason.is_some());
        assert!(summary.total_reward.is_finite());
        assert!((0.0..=1.0 + 1e-9).contains(&summary.final_alignment));
    }
}

#[test]
fn test_attention_rollout_deterministic() {
    let a = run(Box::new(attention(8, 2, 3)), 8);
    let b = run(Box::new(attention(8, 2, 3)), 8);
    assert_eq!(a, b);
}

#[test]
fn test_attention_weights_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy");
    let policy = attention(8, 2, 4);
    policy.save(&path).unwrap();
    assert!(path.join("config.json").exists());

    let loaded = AttentionLazinessPolicy::load(&path).unwrap();
    assert_eq!(loaded.policy_id(), Some("policy"));

    let env = FlockingEnv::new(make_config(), Some(6)).unwrap();
    let obs = env.observation();
    for (x, y) in policy.act(obs).iter().zip(loaded.act(obs)) {
        assert!((x - y).abs() < 1e-9);
    }
}

#[test]
fn test_missing_weights_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(AttentionLazinessPolicy::load(dir.path().join("nope")).is_err());
}

#[test]
fn test_history_export() {
    let dir = tempfile::tempdir().unwrap();
    let env = FlockingEnv::new(make_config(), Some(2)).unwrap();
    let mut runner = EpisodeRunner::new(env, Box::new(ConstantLazinessPolicy::new(0.1)));
    let summary = runner
        .run_episode(&EpisodeConfig::default().with_seed(2))
        .unwrap();

    let env = runner.env();
    let history = env.history();
    assert_eq!(history.steps, summary.length);
    assert_eq!(history.actions.as_ref().map(|a| a.len()), Some(summary.length));

    let metrics = dir.path().join("out").join("episode_0.csv");
    history.write_metrics_csv(&metrics).unwrap();
    let text = std::fs::read_to_string(&metrics).unwrap();
    assert!(text.starts_with("step,alignment,spatial_entropy,velocity_entropy"));
    assert_eq!(text.lines().count(), summary.length + 1);

    let traj = dir.path().join("out").join("episode_0_trajectory.csv");
    history
        .write_trajectory_csv(&traj, &env.state().padding_mask, None)
        .unwrap();
    let text = std::fs::read_to_string(&traj).unwrap();
    assert_eq!(
        text.lines().count(),
        summary.length * summary.num_agents + 1
    );
}
