// src/model/mod.rs
//
// Building blocks for learned laziness policies, on burn.
//
// - linear: seeded / explicit construction of `burn::nn::Linear`
// - attention: multi-head scaled dot-product attention over agent tokens
//
// Tensors are batch-first: (batch, tokens, features). Inference runs on the
// CPU `NdArray` backend.

pub mod attention;
pub mod linear;

use std::path::PathBuf;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::prelude::*;
use thiserror::Error;

pub use attention::{MultiHeadAttention, MultiHeadAttentionConfig};

/// Backend used by the built-in policies.
pub type ModelBackend = NdArray;

/// Device of [`ModelBackend`].
pub fn model_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("d_model ({d_model}) must be divisible by the number of heads ({n_heads})")]
    HeadsMismatch { d_model: usize, n_heads: usize },

    #[error("{what}: expected {expected}, got {got}")]
    Dim {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("cannot access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model config '{path}': {message}")]
    Config { path: PathBuf, message: String },

    #[error("cannot read or write weights '{path}': {message}")]
    Record { path: PathBuf, message: String },

    #[error("tensor readback failed: {0}")]
    Data(String),
}

/// Copy a tensor back to host memory as f64, row-major.
pub fn tensor_to_vec<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f64>, ModelError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map(|v| v.into_iter().map(f64::from).collect())
        .map_err(|err| ModelError::Data(format!("{err:?}")))
}
