// src/rl/telemetry.rs
//
// JSONL telemetry for laziness policies.
//
// One JSON object per line:
// - episode start/end markers (seed, termination reason, length, reward)
// - per-step records (policy version, applied action, reward, flock metrics)
//
// Write failures disable the sink; the run itself never fails because of
// telemetry.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::flocking_env::{StepResult, TerminationReason};
use super::observation::OBS_VERSION;

pub const TELEMETRY_MODE_ENV: &str = "LAZY_CONTROL_TELEMETRY_MODE";
pub const TELEMETRY_PATH_ENV: &str = "LAZY_CONTROL_TELEMETRY_PATH";

/// Per-step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub obs_version: u32,
    pub policy_version: String,
    pub episode_id: u64,
    pub time_step: usize,
    /// Laziness of active agents, in slot order.
    pub action: Vec<f64>,
    pub reward: f64,
    pub original_reward: f64,
    pub alignment: Option<f64>,
    pub spatial_entropy: Option<f64>,
    pub velocity_entropy: Option<f64>,
    /// Number of isolated agents after the step.
    pub comm_loss_count: usize,
    pub done: bool,
}

impl StepRecord {
    pub fn new(
        policy_version: &str,
        episode_id: u64,
        action: &[f64],
        padding_mask: &[bool],
        result: &StepResult,
    ) -> Self {
        let active_action = action
            .iter()
            .zip(padding_mask)
            .filter(|(_, &m)| m)
            .map(|(&a, _)| a)
            .collect();
        let comm_loss_count = result
            .info
            .comm_loss_agents
            .as_ref()
            .map_or(0, |lost| lost.iter().filter(|&&l| l).count());
        Self {
            obs_version: OBS_VERSION,
            policy_version: policy_version.to_string(),
            episode_id,
            time_step: result.info.time_step,
            action: active_action,
            reward: result.reward,
            original_reward: result.info.original_reward,
            alignment: result.info.alignment,
            spatial_entropy: result.info.spatial_entropy,
            velocity_entropy: result.info.velocity_entropy,
            comm_loss_count,
            done: result.done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMarkerType {
    Start,
    End,
}

/// Episode boundary marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub episode_id: u64,
    pub seed: u64,
    pub marker_type: EpisodeMarkerType,
    pub timestamp_ms: i64,
    /// Agents in this episode.
    pub num_agents: usize,
    /// End markers only.
    pub termination_reason: Option<TerminationReason>,
    pub total_reward: Option<f64>,
    pub total_steps: Option<usize>,
}

/// JSONL sink, disabled unless configured.
///
/// Environment variables:
/// - LAZY_CONTROL_TELEMETRY_MODE: "off" (default) or "jsonl"
/// - LAZY_CONTROL_TELEMETRY_PATH: path to JSONL file
pub struct LazyTelemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl Default for LazyTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyTelemetry {
    /// Disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
        }
    }

    pub fn from_env() -> Self {
        let enabled = env::var(TELEMETRY_MODE_ENV)
            .map(|s| s.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        let path = env::var(TELEMETRY_PATH_ENV).ok().map(PathBuf::from);
        if enabled && path.is_none() {
            tracing::warn!("{TELEMETRY_MODE_ENV}=jsonl but {TELEMETRY_PATH_ENV} is unset; telemetry off");
        }
        Self {
            enabled: enabled && path.is_some(),
            path,
            writer: None,
        }
    }

    pub fn enable(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path: Some(path),
            writer: None,
        }
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }

        if self.writer.is_none() {
            let path = self.path.as_ref()?;
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "cannot open telemetry file; telemetry off");
                    self.enabled = false;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    fn write_line<T: Serialize>(&mut self, value: &T) {
        let Ok(line) = serde_json::to_string(value) else {
            return;
        };
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        if writeln!(writer, "{line}").is_err() {
            self.enabled = false;
            self.writer = None;
        }
    }

    pub fn log_episode_start(
        &mut self,
        episode_id: u64,
        seed: u64,
        num_agents: usize,
        timestamp_ms: i64,
    ) {
        self.write_line(&EpisodeMarker {
            episode_id,
            seed,
            marker_type: EpisodeMarkerType::Start,
            timestamp_ms,
            num_agents,
            termination_reason: None,
            total_reward: None,
            total_steps: None,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_episode_end(
        &mut self,
        episode_id: u64,
        seed: u64,
        num_agents: usize,
        timestamp_ms: i64,
        reason: Option<TerminationReason>,
        total_reward: f64,
        total_steps: usize,
    ) {
        self.write_line(&EpisodeMarker {
            episode_id,
            seed,
            marker_type: EpisodeMarkerType::End,
            timestamp_ms,
            num_agents,
            termination_reason: reason,
            total_reward: Some(total_reward),
            total_steps: Some(total_steps),
        });
    }

    pub fn log_step(&mut self, record: &StepRecord) {
        self.write_line(record);
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for LazyTelemetry {
    fn drop(&mut self) {
        self.flush();
    }
}
