// src/main.rs
//
// CLI entrypoint: run laziness-policy rollouts on the flocking env.
//
// Config precedence (highest first):
//   CLI flags > LAZY_CONTROL_* env vars > --config / LAZY_CONTROL_CONFIG file
//   > configs/default_env_config.yaml > built-in defaults.
//
// Prints a run header and one summary line per episode. With --history-out,
// per-episode metrics / trajectory CSVs and a JSON summary are written.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lazy_control::config::{Config, CustomTopology, TaskType};
use lazy_control::rl::{
    AttentionLazinessPolicy, AttentionPolicyConfig, ConstantLazinessPolicy, EpisodeConfig,
    EpisodeRunner, EpisodeSummary, FlockingEnv, FullyActivePolicy, LazyTelemetry, Policy,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TaskArg {
    Acs,
    Vicsek,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TopologyArg {
    Line,
    Ring,
    Star,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    FullyActive,
    Constant,
    Attention,
}

#[derive(Debug, Parser)]
#[command(
    name = "lazy-control",
    about = "Lazy flocking control environment (policy rollouts)",
    version
)]
struct Args {
    /// YAML config file. Defaults to LAZY_CONTROL_CONFIG, then
    /// configs/default_env_config.yaml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed of the first episode; episode k uses seed + k.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of episodes to run.
    #[arg(long, default_value_t = 1)]
    episodes: u64,

    #[arg(long, value_enum)]
    task: Option<TaskArg>,

    /// Fixed custom topology.
    #[arg(long, value_enum)]
    topology: Option<TopologyArg>,

    /// Communication range (range-limited network).
    #[arg(long)]
    comm_range: Option<f64>,

    /// Override env.max_time_steps.
    #[arg(long)]
    max_steps: Option<usize>,

    #[arg(long, value_enum, default_value_t = PolicyArg::FullyActive)]
    policy: PolicyArg,

    /// Laziness of the constant policy.
    #[arg(long, default_value_t = 0.0)]
    laziness: f64,

    /// Attention policy weights directory (config.json + burn record).
    /// Seeded from --seed when omitted.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Directory for per-episode CSV / JSON outputs.
    #[arg(long)]
    history_out: Option<PathBuf>,

    /// Print the resolved config as YAML and exit.
    #[arg(long)]
    print_config: bool,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<Config> {
    let mut cfg = Config::load(args.config.as_deref())
        .context("failed to load config")?
        .apply_env_overrides()
        .context("invalid config after env overrides")?;

    if let Some(task) = args.task {
        cfg.set_task_type(match task {
            TaskArg::Acs => TaskType::Acs,
            TaskArg::Vicsek => TaskType::Vicsek,
        });
    }
    if let Some(topology) = args.topology {
        cfg.env.enable_custom_topology = true;
        cfg.env.custom_topology = Some(match topology {
            TopologyArg::Line => CustomTopology::Line,
            TopologyArg::Ring => CustomTopology::Ring,
            TopologyArg::Star => CustomTopology::Star,
        });
    }
    if let Some(r) = args.comm_range {
        cfg.env.comm_range = Some(r);
    }
    if let Some(n) = args.max_steps {
        cfg.env.max_time_steps = n;
    }
    if args.history_out.is_some() {
        cfg.env.get_state_hist = true;
    }
    cfg.resolve().context("invalid config after CLI overrides")
}

fn build_policy(args: &Args, cfg: &Config) -> Result<Box<dyn Policy>> {
    Ok(match args.policy {
        PolicyArg::FullyActive => Box::new(FullyActivePolicy::new()),
        PolicyArg::Constant => Box::new(ConstantLazinessPolicy::new(args.laziness)),
        PolicyArg::Attention => match &args.weights {
            Some(path) => Box::new(
                AttentionLazinessPolicy::load(path)
                    .with_context(|| format!("failed to load weights {}", path.display()))?,
            ),
            None => Box::new(AttentionLazinessPolicy::seeded(
                AttentionPolicyConfig::new(cfg.env.obs_dim),
                args.seed.unwrap_or(0),
            )?),
        },
    })
}

fn write_outputs(dir: &Path, k: u64, runner: &EpisodeRunner, summary: &EpisodeSummary) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let env = runner.env();
    let history = env.history();
    history.write_metrics_csv(&dir.join(format!("episode_{k}.csv")))?;
    if history.agent_states.is_some() {
        let arena = env.arena();
        let side = arena.periodic.then_some(arena.side);
        history.write_trajectory_csv(
            &dir.join(format!("episode_{k}_trajectory.csv")),
            &env.state().padding_mask,
            side,
        )?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    let path = dir.join(format!("episode_{k}_summary.json"));
    std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cfg = build_config(&args)?;
    if args.print_config {
        print!("{}", cfg.to_yaml_string()?);
        return Ok(());
    }

    let policy = build_policy(&args, &cfg)?;
    println!(
        "lazy-control | task={} | agents={}..{} | max_steps={} | comm_range={} | policy={} | seed={}",
        cfg.env.task_type.as_str(),
        cfg.num_agents_min(),
        cfg.num_agents_max(),
        cfg.env.max_time_steps,
        cfg.env
            .comm_range
            .map(|r| r.to_string())
            .unwrap_or_else(|| "none".to_string()),
        policy.version(),
        args.seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let env = FlockingEnv::new(cfg, args.seed)?;
    let mut runner = EpisodeRunner::new(env, policy).with_telemetry(LazyTelemetry::from_env());

    for k in 0..args.episodes {
        let mut episode = EpisodeConfig::default().with_episode_id(k);
        if let Some(seed) = args.seed {
            episode = episode.with_seed(seed.wrapping_add(k));
        }
        let summary = runner.run_episode(&episode)?;
        println!(
            "episode {k} | seed={} | agents={} | steps={} | reason={} | reward={:.4} | align={:.4} | sp_ent={:.3} | vel_ent={:.3} | lost_comm={}",
            summary.seed,
            summary.num_agents,
            summary.length,
            summary
                .termination_reason
                .map(|r| r.as_str())
                .unwrap_or("truncated"),
            summary.total_reward,
            summary.final_alignment,
            summary.final_spatial_entropy,
            summary.final_velocity_entropy,
            summary
                .lost_comm_step
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        if let Some(dir) = &args.history_out {
            write_outputs(dir, k, &runner, &summary)?;
        }
    }
    Ok(())
}
