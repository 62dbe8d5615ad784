// src/rl/policy.rs
//
// Laziness policies.
//
// A policy maps the joint observation to one laziness value per agent slot
// (length num_agents_max). Values for padding slots are ignored by the env and
// are emitted as 0.0.
//
// - FullyActivePolicy: every agent applies its full control (laziness 0)
// - ConstantLazinessPolicy: one fixed laziness for every active agent
// - AttentionLazinessPolicy: agent tokens attend to their neighbors through a
//   multi-head attention layer (burn, NdArray backend); a sigmoid maps each
//   output to [0, 1]. Weights are saved as a burn record plus config.json.

use std::path::Path;

use burn::backend::ndarray::NdArrayDevice;
use burn::nn::Linear;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::activation::{sigmoid, tanh};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::observation::Observation;
use crate::model::linear::{linear_dims, seeded_linear, xavier_linear};
use crate::model::{
    model_device, tensor_to_vec, ModelBackend, ModelError, MultiHeadAttention,
    MultiHeadAttentionConfig,
};

pub const FULLY_ACTIVE_POLICY_VERSION: &str = "fully-active-v1.0.0";
pub const CONSTANT_POLICY_VERSION: &str = "constant-laziness-v1.0.0";
pub const ATTENTION_POLICY_VERSION: &str = "attention-laziness-v1.0.0";

/// Interface for all laziness policies.
pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Optional policy ID (e.g., weights file name).
    fn policy_id(&self) -> Option<&str> {
        None
    }

    /// Laziness per agent slot. Same observation, same action.
    fn act(&self, obs: &Observation) -> Vec<f64>;

    /// Called at the start of each episode.
    fn reset_episode(&mut self, seed: u64, episode_id: u64);
}

fn masked(obs: &Observation, value: impl Fn(usize) -> f64) -> Vec<f64> {
    obs.padding_mask
        .iter()
        .enumerate()
        .map(|(i, &active)| if active { value(i) } else { 0.0 })
        .collect()
}

/// Laziness 0 everywhere: the plain flocking controller.
#[derive(Debug, Clone, Default)]
pub struct FullyActivePolicy;

impl FullyActivePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for FullyActivePolicy {
    fn version(&self) -> &str {
        FULLY_ACTIVE_POLICY_VERSION
    }

    fn policy_id(&self) -> Option<&str> {
        Some("fully-active")
    }

    fn act(&self, obs: &Observation) -> Vec<f64> {
        vec![0.0; obs.num_agents_max]
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

#[derive(Debug, Clone)]
pub struct ConstantLazinessPolicy {
    laziness: f64,
}

impl ConstantLazinessPolicy {
    /// `laziness` is clamped to [0, 1].
    pub fn new(laziness: f64) -> Self {
        let laziness = if laziness.is_finite() {
            laziness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { laziness }
    }

    pub fn laziness(&self) -> f64 {
        self.laziness
    }
}

impl Policy for ConstantLazinessPolicy {
    fn version(&self) -> &str {
        CONSTANT_POLICY_VERSION
    }

    fn act(&self, obs: &Observation) -> Vec<f64> {
        masked(obs, |_| self.laziness)
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

/// Architecture of [`AttentionPolicyNet`]; saved next to the weights.
#[derive(Config, Debug)]
pub struct AttentionPolicyConfig {
    pub obs_dim: usize,
    #[config(default = 16)]
    pub d_embed: usize,
    #[config(default = 16)]
    pub d_model: usize,
    #[config(default = 4)]
    pub n_heads: usize,
}

impl AttentionPolicyConfig {
    fn attention(&self) -> MultiHeadAttentionConfig {
        MultiHeadAttentionConfig::new(self.d_embed, self.d_embed, self.d_model, self.n_heads)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AttentionPolicyNet<B>, ModelError> {
        Ok(AttentionPolicyNet {
            embed: xavier_linear(self.obs_dim, self.d_embed, device),
            attention: self.attention().init(device)?,
        })
    }

    pub fn init_seeded<B: Backend>(
        &self,
        seed: u64,
        device: &B::Device,
    ) -> Result<AttentionPolicyNet<B>, ModelError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let embed = seeded_linear(self.obs_dim, self.d_embed, &mut rng, device);
        let attention = self.attention().init_seeded(&mut rng, device)?;
        Ok(AttentionPolicyNet { embed, attention })
    }
}

/// Tokens -> tanh embedding -> masked self-attention -> sigmoid.
#[derive(Module, Debug)]
pub struct AttentionPolicyNet<B: Backend> {
    embed: Linear<B>,
    attention: MultiHeadAttention<B>,
}

impl<B: Backend> AttentionPolicyNet<B> {
    /// Check loaded parameters against the architecture.
    pub fn check(&self, config: &AttentionPolicyConfig) -> Result<(), ModelError> {
        let embed = linear_dims(&self.embed);
        let query = linear_dims(&self.attention.q_fc);
        let key = linear_dims(&self.attention.k_fc);
        let value = linear_dims(&self.attention.v_fc);
        let out = linear_dims(&self.attention.out_fc);
        for (what, got, expected) in [
            ("embedding", embed, (config.obs_dim, config.d_embed)),
            ("query projection", query, (config.d_embed, config.d_model)),
            ("key projection", key, (config.d_embed, config.d_model)),
            ("value projection", value, (config.d_embed, config.d_model)),
            ("output projection", out, (config.d_model, 1)),
        ] {
            if got != expected {
                return Err(ModelError::Shape {
                    what,
                    expected: vec![expected.0, expected.1],
                    got: vec![got.0, got.1],
                });
            }
        }
        Ok(())
    }

    /// `tokens`: (batch, n, obs_dim); `mask`: (batch, n, n).
    /// Returns laziness in (0, 1) as (batch, n).
    pub fn forward(
        &self,
        tokens: Tensor<B, 3>,
        mask: Tensor<B, 3, Bool>,
    ) -> Result<Tensor<B, 2>, ModelError> {
        let embedded = tanh(self.embed.forward(tokens));
        let out = self
            .attention
            .forward(embedded.clone(), embedded.clone(), embedded, Some(mask))?;
        let [batch, n, _] = out.dims();
        Ok(sigmoid(out.reshape([batch, n])))
    }
}

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model";

type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub struct AttentionLazinessPolicy {
    config: AttentionPolicyConfig,
    net: AttentionPolicyNet<ModelBackend>,
    device: NdArrayDevice,
    policy_id: Option<String>,
}

impl AttentionLazinessPolicy {
    pub fn from_net(
        config: AttentionPolicyConfig,
        net: AttentionPolicyNet<ModelBackend>,
    ) -> Result<Self, ModelError> {
        net.check(&config)?;
        Ok(Self {
            config,
            net,
            device: model_device(),
            policy_id: None,
        })
    }

    /// Xavier-initialized weights from `seed`.
    pub fn seeded(config: AttentionPolicyConfig, seed: u64) -> Result<Self, ModelError> {
        let net = config.init_seeded(seed, &model_device())?;
        Self::from_net(config, net).map(|p| p.with_id(&format!("seeded-{seed}")))
    }

    /// Load `config.json` and the weights record from `dir`. The policy ID is
    /// the directory name.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, ModelError> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_FILE);
        let config = AttentionPolicyConfig::load(&config_path).map_err(|err| ModelError::Config {
            path: config_path.clone(),
            message: format!("{err:?}"),
        })?;

        let device = model_device();
        let weights_path = dir.join(WEIGHTS_FILE);
        let net = config
            .init::<ModelBackend>(&device)?
            .load_file(weights_path.clone(), &WeightsRecorder::new(), &device)
            .map_err(|err| ModelError::Record {
                path: weights_path,
                message: format!("{err:?}"),
            })?;

        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "weights".to_string());
        Ok(Self::from_net(config, net)?.with_id(&id))
    }

    /// Write `config.json` and the weights record into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), ModelError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| ModelError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let config_path = dir.join(CONFIG_FILE);
        self.config
            .save(&config_path)
            .map_err(|source| ModelError::Io {
                path: config_path,
                source,
            })?;
        let weights_path = dir.join(WEIGHTS_FILE);
        self.net
            .clone()
            .save_file(weights_path.clone(), &WeightsRecorder::new())
            .map_err(|err| ModelError::Record {
                path: weights_path,
                message: format!("{err:?}"),
            })
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.policy_id = Some(id.to_string());
        self
    }

    pub fn config(&self) -> &AttentionPolicyConfig {
        &self.config
    }

    /// Raw laziness for every slot.
    pub fn forward(&self, obs: &Observation) -> Result<Vec<f64>, ModelError> {
        let n = obs.num_agents_max;
        let d = obs.obs_dim;
        if d != self.config.obs_dim {
            return Err(ModelError::Dim {
                what: "observation obs_dim",
                expected: self.config.obs_dim,
                got: d,
            });
        }
        if obs.local_agent_infos.len() != n * n * d {
            return Err(ModelError::Dim {
                what: "observation infos length",
                expected: n * n * d,
                got: obs.local_agent_infos.len(),
            });
        }

        // Attention mask: neighbors among active agents, plus self so padding
        // rows stay well defined.
        let allowed: Vec<bool> = (0..n * n)
            .map(|k| {
                let (i, j) = (k / n, k % n);
                i == j
                    || (*obs.neighbor_masks.get(i, j) && obs.padding_mask[i] && obs.padding_mask[j])
            })
            .collect();
        let mask = Tensor::<ModelBackend, 3, Bool>::from_data(
            TensorData::new(allowed, [1, n, n]),
            &self.device,
        );

        // Token i: mean pair feature over the agents it attends to.
        let infos: Vec<f32> = obs.local_agent_infos.iter().map(|&v| v as f32).collect();
        let infos =
            Tensor::<ModelBackend, 3>::from_data(TensorData::new(infos, [n, n, d]), &self.device);
        let weight = mask.clone().float().reshape([n, n, 1]).repeat_dim(2, d);
        let tokens = (infos * weight.clone()).sum_dim(1) / weight.sum_dim(1);

        let out = self.net.forward(tokens.reshape([1, n, d]), mask)?;
        let laziness = tensor_to_vec(out)?;
        Ok(masked(obs, |i| laziness[i]))
    }
}

impl Policy for AttentionLazinessPolicy {
    fn version(&self) -> &str {
        ATTENTION_POLICY_VERSION
    }

    fn policy_id(&self) -> Option<&str> {
        self.policy_id.as_deref()
    }

    /// Falls back to fully active when the observation does not fit the net.
    fn act(&self, obs: &Observation) -> Vec<f64> {
        match self.forward(obs) {
            Ok(laziness) => laziness,
            Err(err) => {
                tracing::warn!(error = %err, "attention policy forward failed; acting fully active");
                vec![0.0; obs.num_agents_max]
            }
        }
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}
