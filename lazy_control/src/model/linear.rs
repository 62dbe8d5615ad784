// src/model/linear.rs
//
// Constructors for `burn::nn::Linear`. burn stores the weight as
// (d_input, d_output) and computes `y = x W + b`.

use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use rand::Rng;

use super::ModelError;

/// Xavier-uniform layer drawn from the backend rng.
pub fn xavier_linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

/// Xavier-uniform weights and zero bias drawn from `rng`, so that a seed
/// fixes the layer independently of the backend's global rng.
pub fn seeded_linear<B: Backend, R: Rng>(
    d_input: usize,
    d_output: usize,
    rng: &mut R,
    device: &B::Device,
) -> Linear<B> {
    let a = (6.0 / (d_input + d_output).max(1) as f32).sqrt();
    let weight: Vec<f32> = (0..d_input * d_output)
        .map(|_| rng.gen_range(-a..=a))
        .collect();
    let bias = vec![0.0f32; d_output];
    linear_from_parts(weight, bias, d_input, d_output, device)
        .unwrap_or_else(|_| xavier_linear(d_input, d_output, device))
}

/// Layer from an explicit row-major (d_input x d_output) weight and bias.
pub fn linear_from_parts<B: Backend>(
    weight: Vec<f32>,
    bias: Vec<f32>,
    d_input: usize,
    d_output: usize,
    device: &B::Device,
) -> Result<Linear<B>, ModelError> {
    if weight.len() != d_input * d_output {
        return Err(ModelError::Dim {
            what: "linear weight length",
            expected: d_input * d_output,
            got: weight.len(),
        });
    }
    if bias.len() != d_output {
        return Err(ModelError::Dim {
            what: "linear bias length",
            expected: d_output,
            got: bias.len(),
        });
    }
    let mut linear = LinearConfig::new(d_input, d_output).init(device);
    linear.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weight, [d_input, d_output]),
        device,
    ));
    linear.bias = Some(Param::from_tensor(Tensor::from_data(
        TensorData::new(bias, [d_output]),
        device,
    )));
    Ok(linear)
}

/// (d_input, d_output)
pub fn linear_dims<B: Backend>(linear: &Linear<B>) -> (usize, usize) {
    let [d_input, d_output] = linear.weight.dims();
    (d_input, d_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{model_device, tensor_to_vec, ModelBackend};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_forward_applies_weight_and_bias() {
        let device = model_device();
        // W = [[1, 0, 2], [0, 1, -1]], b = [0.5, 0, 1]
        let linear = linear_from_parts::<ModelBackend>(
            vec![1.0, 0.0, 2.0, 0.0, 1.0, -1.0],
            vec![0.5, 0.0, 1.0],
            2,
            3,
            &device,
        )
        .unwrap();
        let x = Tensor::<ModelBackend, 2>::from_data(TensorData::new(vec![1.0f32, 2.0], [1, 2]), &device);
        let y = tensor_to_vec(linear.forward(x)).unwrap();
        assert_eq!(y, vec![1.5, 2.0, 1.0]);
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        let device = model_device();
        assert!(linear_from_parts::<ModelBackend>(vec![0.0; 5], vec![0.0; 3], 2, 3, &device).is_err());
        assert!(linear_from_parts::<ModelBackend>(vec![0.0; 6], vec![0.0; 2], 2, 3, &device).is_err());
    }

    #[test]
    fn test_seeded_linear_is_reproducible_and_bounded() {
        let device = model_device();
        let a = seeded_linear::<ModelBackend, _>(4, 3, &mut ChaCha8Rng::seed_from_u64(5), &device);
        let b = seeded_linear::<ModelBackend, _>(4, 3, &mut ChaCha8Rng::seed_from_u64(5), &device);
        assert_eq!(linear_dims(&a), (4, 3));
        let wa = tensor_to_vec(a.weight.val()).unwrap();
        let wb = tensor_to_vec(b.weight.val()).unwrap();
        assert_eq!(wa, wb);
        let bound = (6.0f64 / 7.0).sqrt() + 1e-6;
        assert!(wa.iter().all(|w| w.abs() <= bound));
    }
}
