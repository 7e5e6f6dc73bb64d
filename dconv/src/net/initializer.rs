use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::{Dim1, Dim4, Tensor, Tensor1, Tensor4};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

/// Supplies the starting parameters of a layer.
pub trait Initializer<F: DType> {
    /// Weights for filters shaped `dims`, each reading `fan_in` inputs.
    fn weights(&mut self, dims: Dim4, fan_in: usize) -> Result<Tensor4<F>>;
    fn biases(&mut self, n: usize) -> Result<Tensor1<F>>;
}

/// Draws weights from `Normal(0, sqrt(2 / fan_in))` and starts biases at zero.
pub struct RandomInitializer {
    rng: StdRng,
}

impl RandomInitializer {
    pub fn seed_from_u64(seed: u64) -> Self {
        RandomInitializer {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomInitializer {
    fn default() -> Self {
        RandomInitializer {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<F: DType> Initializer<F> for RandomInitializer {
    fn weights(&mut self, dims: Dim4, fan_in: usize) -> Result<Tensor4<F>> {
        let std = (2.0 / fan_in as f64).sqrt();
        let dist = Normal::new(0.0, std).map_err(|e| Error::InvalidGeometry(format!("weight distribution: {e}")))?;
        Ok(Tensor::from_distribution(&mut self.rng, dist.map(F::from_f64), dims))
    }

    fn biases(&mut self, n: usize) -> Result<Tensor1<F>> {
        Tensor1::try_zeroed("biases", Dim1(n))
    }
}

/// Sets every weight and bias to a fixed value.
#[derive(Copy, Clone, Debug)]
pub struct ConstantInitializer {
    pub weight: f64,
    pub bias: f64,
}

impl<F: DType> Initializer<F> for ConstantInitializer {
    fn weights(&mut self, dims: Dim4, _fan_in: usize) -> Result<Tensor4<F>> {
        Tensor4::try_filled("weights", F::from_f64(self.weight), dims)
    }

    fn biases(&mut self, n: usize) -> Result<Tensor1<F>> {
        Tensor1::try_filled("biases", F::from_f64(self.bias), Dim1(n))
    }
}

#[cfg(test)]
mod test {
    use super::{ConstantInitializer, Initializer, RandomInitializer};
    use crate::tensor::{Dim4, ITensor, Tensor1, Tensor4};

    #[test]
    fn test_random_weights_are_scaled_by_fan_in() {
        let mut init = RandomInitializer::seed_from_u64(0xabc);
        let fan_in = 8 * 3 * 3;
        let w: Tensor4<f64> = init.weights(Dim4(64, 8, 3, 3), fan_in).unwrap();
        assert_eq!(w.len(), 64 * 8 * 9);
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / w.len() as f64;
        let expected = 2.0 / fan_in as f64;
        assert!(mean.abs() < 0.01, "mean {mean}");
        assert!((var - expected).abs() < 0.1 * expected, "variance {var}, expected {expected}");

        let b: Tensor1<f64> = init.biases(64).unwrap();
        assert!(b.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a: Tensor4<f32> = RandomInitializer::seed_from_u64(1).weights(Dim4(2, 2, 2, 2), 8).unwrap();
        let b: Tensor4<f32> = RandomInitializer::seed_from_u64(1).weights(Dim4(2, 2, 2, 2), 8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant() {
        let mut init = ConstantInitializer { weight: 1.0, bias: 0.5 };
        let w: Tensor4<f32> = init.weights(Dim4(1, 1, 3, 3), 9).unwrap();
        assert!(w.iter().all(|&v| v == 1.0));
        let b: Tensor1<f32> = init.biases(2).unwrap();
        assert_eq!(b.as_ref(), &[0.5, 0.5]);
    }
}
