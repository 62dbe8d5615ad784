// src/model/attention.rs
//
// Multi-head scaled dot-product attention.
//
// Key and value projections start as copies of one shared projection and are
// stored separately afterwards. Masked scores are set to -1e9 before the
// softmax, so a fully masked row attends uniformly instead of producing NaN.

use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use rand::Rng;

use super::linear::{linear_dims, seeded_linear, xavier_linear};
use super::ModelError;

const MASKED_SCORE: f64 = -1e9;

#[derive(Config, Debug)]
pub struct MultiHeadAttentionConfig {
    /// Width of query tokens.
    pub d_embed_q: usize,
    /// Width of key / value tokens.
    pub d_embed_kv: usize,
    pub d_model: usize,
    pub n_heads: usize,
    #[config(default = 1)]
    pub d_out: usize,
}

impl MultiHeadAttentionConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_heads == 0 || self.d_model % self.n_heads != 0 {
            return Err(ModelError::HeadsMismatch {
                d_model: self.d_model,
                n_heads: self.n_heads,
            });
        }
        Ok(())
    }

    /// Xavier-uniform projections from the backend rng.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<MultiHeadAttention<B>, ModelError> {
        self.validate()?;
        Ok(self.assemble(
            xavier_linear(self.d_embed_q, self.d_model, device),
            xavier_linear(self.d_embed_kv, self.d_model, device),
            xavier_linear(self.d_model, self.d_out, device),
        ))
    }

    /// Xavier-uniform projections drawn from `rng`.
    pub fn init_seeded<B: Backend, R: Rng>(
        &self,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<MultiHeadAttention<B>, ModelError> {
        self.validate()?;
        let q_fc = seeded_linear(self.d_embed_q, self.d_model, rng, device);
        let kv_fc = seeded_linear(self.d_embed_kv, self.d_model, rng, device);
        let out_fc = seeded_linear(self.d_model, self.d_out, rng, device);
        Ok(self.assemble(q_fc, kv_fc, out_fc))
    }

    /// Layer from explicit projections; `kv_fc` seeds both key and value.
    pub fn init_with<B: Backend>(
        &self,
        q_fc: Linear<B>,
        kv_fc: Linear<B>,
        out_fc: Linear<B>,
    ) -> Result<MultiHeadAttention<B>, ModelError> {
        self.validate()?;
        for (what, got, expected) in [
            ("query projection", linear_dims(&q_fc), (self.d_embed_q, self.d_model)),
            ("key/value projection", linear_dims(&kv_fc), (self.d_embed_kv, self.d_model)),
            ("output projection", linear_dims(&out_fc), (self.d_model, self.d_out)),
        ] {
            if got != expected {
                return Err(ModelError::Shape {
                    what,
                    expected: vec![expected.0, expected.1],
                    got: vec![got.0, got.1],
                });
            }
        }
        Ok(self.assemble(q_fc, kv_fc, out_fc))
    }

    fn assemble<B: Backend>(
        &self,
        q_fc: Linear<B>,
        kv_fc: Linear<B>,
        out_fc: Linear<B>,
    ) -> MultiHeadAttention<B> {
        MultiHeadAttention {
            d_model: self.d_model,
            n_heads: self.n_heads,
            q_fc,
            k_fc: kv_fc.clone(),
            v_fc: kv_fc,
            out_fc,
        }
    }
}

#[derive(Module, Debug)]
pub struct MultiHeadAttention<B: Backend> {
    d_model: usize,
    n_heads: usize,
    pub q_fc: Linear<B>,
    pub k_fc: Linear<B>,
    pub v_fc: Linear<B>,
    pub out_fc: Linear<B>,
}

impl<B: Backend> MultiHeadAttention<B> {
    pub fn d_model(&self) -> usize {
        self.d_model
    }

    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    pub fn d_k(&self) -> usize {
        self.d_model / self.n_heads
    }

    pub fn d_out(&self) -> usize {
        linear_dims(&self.out_fc).1
    }

    /// (batch, seq, d_model) -> (batch, n_heads, seq, d_k)
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, seq, _] = x.dims();
        x.reshape([batch, seq, self.n_heads, self.d_k()])
            .swap_dims(1, 2)
    }

    /// `query`: (batch, seq_q, d_embed_q); `key` / `value`:
    /// (batch, seq_k, d_embed_kv); `mask`: (batch, seq_q, seq_k), `false`
    /// entries are excluded. Returns (batch, seq_q, d_out).
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> Result<Tensor<B, 3>, ModelError> {
        let [batch, seq_q, d_q] = query.dims();
        let [batch_k, seq_k, d_k_in] = key.dims();
        let value_dims = value.dims();
        let (q_in, _) = linear_dims(&self.q_fc);
        let (kv_in, _) = linear_dims(&self.k_fc);
        if d_q != q_in {
            return Err(ModelError::Dim {
                what: "query width",
                expected: q_in,
                got: d_q,
            });
        }
        if [batch_k, seq_k, d_k_in] != [batch, seq_k, kv_in] {
            return Err(ModelError::Shape {
                what: "key",
                expected: vec![batch, seq_k, kv_in],
                got: vec![batch_k, seq_k, d_k_in],
            });
        }
        if value_dims != [batch, seq_k, kv_in] {
            return Err(ModelError::Shape {
                what: "value",
                expected: vec![batch, seq_k, kv_in],
                got: value_dims.to_vec(),
            });
        }
        if let Some(m) = &mask {
            let got = m.dims();
            if got != [batch, seq_q, seq_k] {
                return Err(ModelError::Shape {
                    what: "mask",
                    expected: vec![batch, seq_q, seq_k],
                    got: got.to_vec(),
                });
            }
        }

        let q = self.split_heads(self.q_fc.forward(query));
        let k = self.split_heads(self.k_fc.forward(key));
        let v = self.split_heads(self.v_fc.forward(value));

        let scores = q
            .matmul(k.swap_dims(2, 3))
            .div_scalar((self.d_k() as f64).sqrt());
        let scores = match mask {
            Some(m) => {
                let excluded = m
                    .bool_not()
                    .unsqueeze_dim::<4>(1)
                    .repeat_dim(1, self.n_heads);
                scores.mask_fill(excluded, MASKED_SCORE)
            }
            None => scores,
        };
        let attention = softmax(scores, 3);

        let merged = attention
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq_q, self.d_model]);
        Ok(self.out_fc.forward(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::linear_from_parts;
    use crate::model::{model_device, tensor_to_vec, ModelBackend};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type B = ModelBackend;

    fn identity(n: usize) -> Linear<B> {
        let w = (0..n * n)
            .map(|k| if k / n == k % n { 1.0 } else { 0.0 })
            .collect();
        linear_from_parts(w, vec![0.0; n], n, n, &model_device()).unwrap()
    }

    fn zero(n: usize) -> Linear<B> {
        linear_from_parts(vec![0.0; n * n], vec![0.0; n], n, n, &model_device()).unwrap()
    }

    fn tokens(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f32) -> Tensor<B, 3> {
        let data: Vec<f32> = (0..rows * cols).map(|k| f(k / cols, k % cols)).collect();
        Tensor::from_data(TensorData::new(data, [1, rows, cols]), &model_device())
    }

    fn mask(rows: usize, cols: usize, f: impl Fn(usize, usize) -> bool) -> Tensor<B, 3, Bool> {
        let data: Vec<bool> = (0..rows * cols).map(|k| f(k / cols, k % cols)).collect();
        Tensor::from_data(TensorData::new(data, [1, rows, cols]), &model_device())
    }

    /// 2-wide token values: key r is [2r, 2r + 1].
    fn ramp(rows: usize) -> Tensor<B, 3> {
        tokens(rows, 2, |r, c| (r * 2 + c) as f32)
    }

    fn config(d_model: usize, n_heads: usize) -> MultiHeadAttentionConfig {
        MultiHeadAttentionConfig::new(d_model, d_model, d_model, n_heads).with_d_out(d_model)
    }

    #[test]
    fn test_rejects_indivisible_heads() {
        let cfg = MultiHeadAttentionConfig::new(4, 4, 6, 4);
        let err = cfg.init::<B>(&model_device()).unwrap_err();
        assert!(matches!(err, ModelError::HeadsMismatch { d_model: 6, n_heads: 4 }));
    }

    #[test]
    fn test_key_and_value_share_initial_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mha = MultiHeadAttentionConfig::new(3, 5, 4, 2)
            .with_d_out(2)
            .init_seeded::<B, _>(&mut rng, &model_device())
            .unwrap();
        let k = tensor_to_vec(mha.k_fc.weight.val()).unwrap();
        let v = tensor_to_vec(mha.v_fc.weight.val()).unwrap();
        assert_eq!(k, v);
        assert_eq!(mha.d_k(), 2);
        assert_eq!(mha.d_out(), 2);
    }

    #[test]
    fn test_zero_query_averages_values() {
        // Zero query projection gives equal scores, so output is the mean value.
        let mha = config(2, 1).init_with(zero(2), identity(2), identity(2)).unwrap();
        let q = tokens(1, 2, |_, _| 1.0);
        let out = tensor_to_vec(mha.forward(q, ramp(3), ramp(3), None).unwrap()).unwrap();
        assert!((out[0] - 2.0).abs() < 1e-5);
        assert!((out[1] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_mask_excludes_keys() {
        let mha = config(2, 2).init_with(zero(2), identity(2), identity(2)).unwrap();
        let q = tokens(2, 2, |_, _| 1.0);
        // Row 0 sees only key 2.
        let m = mask(2, 3, |i, j| !(i == 0 && j < 2));
        let out = tensor_to_vec(mha.forward(q, ramp(3), ramp(3), Some(m)).unwrap()).unwrap();
        assert!((out[0] - 4.0).abs() < 1e-5);
        assert!((out[1] - 5.0).abs() < 1e-5);
        assert!((out[2] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_fully_masked_row_is_finite() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mha = MultiHeadAttentionConfig::new(3, 3, 4, 2)
            .init_seeded::<B, _>(&mut rng, &model_device())
            .unwrap();
        let x = || tokens(3, 3, |r, c| (r + c) as f32 * 0.1);
        let out = mha.forward(x(), x(), x(), Some(mask(3, 3, |_, _| false))).unwrap();
        assert!(tensor_to_vec(out).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fully_masked_row_attends_uniformly() {
        let mha = config(2, 1).init_with(identity(2), identity(2), identity(2)).unwrap();
        let q = tokens(1, 2, |_, _| 3.0);
        let out = mha
            .forward(q, ramp(3), ramp(3), Some(mask(1, 3, |_, _| false)))
            .unwrap();
        let out = tensor_to_vec(out).unwrap();
        assert!((out[0] - 2.0).abs() < 1e-5);
        assert!((out[1] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_mask_shape_checked() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mha = MultiHeadAttentionConfig::new(2, 2, 2, 1)
            .init_seeded::<B, _>(&mut rng, &model_device())
            .unwrap();
        let x = || tokens(3, 2, |_, _| 0.5);
        let err = mha.forward(x(), x(), x(), Some(mask(3, 2, |_, _| true)));
        assert!(matches!(err, Err(ModelError::Shape { what: "mask", .. })));
    }

    #[test]
    fn test_init_with_checks_projection_shapes() {
        let err = config(2, 1).init_with(zero(3), identity(2), identity(2));
        assert!(err.is_err());
    }
}
