//! Initialization policies that fill a parameter's storage before first use.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{NnError, Result};
use crate::tensor::{DType, Shape, Tensor};

/// Stateless strategy producing the initial value of a parameter.
pub trait Initializer: Send + Sync + fmt::Debug {
    fn initialize(&self, shape: &Shape, dtype: DType) -> Result<Tensor>;
}

fn float_only(dtype: DType, who: &str) -> Result<()> {
    if dtype != DType::F32 {
        return Err(NnError::unsupported(format!(
            "{who} initializer cannot fill {dtype:?} parameters"
        )));
    }
    Ok(())
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Fills every element with the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantInit(pub f32);

impl ConstantInit {
    pub fn zeros() -> Self {
        ConstantInit(0.0)
    }

    pub fn ones() -> Self {
        ConstantInit(1.0)
    }
}

impl Initializer for ConstantInit {
    fn initialize(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
        if self.0 == 0.0 {
            return Ok(Tensor::zeros(shape.clone(), dtype));
        }
        float_only(dtype, "constant")?;
        Ok(Tensor::full(shape.clone(), self.0))
    }
}

/// Samples `U(-scale, scale)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformInit {
    pub scale: f32,
    pub seed: Option<u64>,
}

impl UniformInit {
    pub fn new(scale: f32) -> Self {
        UniformInit { scale, seed: None }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for UniformInit {
    fn initialize(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
        float_only(dtype, "uniform")?;
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(NnError::invalid_argument(format!(
                "uniform initializer scale must be finite and non-negative, got {}",
                self.scale
            )));
        }
        let mut rng = rng_for(self.seed);
        let values = (0..shape.num_elements())
            .map(|_| rng.gen_range(-self.scale..=self.scale))
            .collect();
        Tensor::from_vec(shape.clone(), values)
    }
}

/// Samples `N(0, sigma^2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalInit {
    pub sigma: f32,
    pub seed: Option<u64>,
}

impl NormalInit {
    pub fn new(sigma: f32) -> Self {
        NormalInit { sigma, seed: None }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for NormalInit {
    fn initialize(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
        float_only(dtype, "normal")?;
        let normal = Normal::new(0.0f32, self.sigma).map_err(|err| {
            NnError::invalid_argument(format!("normal initializer sigma {}: {err}", self.sigma))
        })?;
        let mut rng = rng_for(self.seed);
        let values = (0..shape.num_elements())
            .map(|_| normal.sample(&mut rng))
            .collect();
        Tensor::from_vec(shape.clone(), values)
    }
}

/// Xavier/Glorot uniform: `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`.
///
/// `fan_in` is the product of all axes but the last, `fan_out` the last axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XavierInit {
    pub seed: Option<u64>,
}

impl XavierInit {
    pub fn new() -> Self {
        XavierInit::default()
    }

    pub fn seeded(seed: u64) -> Self {
        XavierInit { seed: Some(seed) }
    }
}

impl Initializer for XavierInit {
    fn initialize(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
        float_only(dtype, "xavier")?;
        let dims = shape.dims();
        let (fan_in, fan_out) = match dims {
            [] => (1, 1),
            [n] => (*n, *n),
            [rest @ .., last] => (rest.iter().product::<usize>(), *last),
        };
        let denom = (fan_in + fan_out).max(1) as f32;
        UniformInit {
            scale: (6.0 / denom).sqrt(),
            seed: self.seed,
        }
        .initialize(shape, dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_fills_value() {
        let t = ConstantInit(0.5).initialize(&Shape::new([3]), DType::F32).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.5; 3]);
    }

    #[test]
    fn zeros_work_for_every_dtype() {
        let t = ConstantInit::zeros()
            .initialize(&Shape::new([2]), DType::I32)
            .unwrap();
        assert_eq!(t.to_i32_vec().unwrap(), vec![0, 0]);
    }

    #[test]
    fn seeded_initializers_are_reproducible() {
        let shape = Shape::new([4, 3]);
        let a = NormalInit::new(0.1).seeded(7).initialize(&shape, DType::F32).unwrap();
        let b = NormalInit::new(0.1).seeded(7).initialize(&shape, DType::F32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn xavier_respects_bound() {
        let shape = Shape::new([4, 2]);
        let bound = (6.0f32 / 6.0).sqrt();
        let t = XavierInit::seeded(3).initialize(&shape, DType::F32).unwrap();
        assert!(t.to_f32_vec().unwrap().iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn bad_uniform_scale_is_rejected() {
        let shape = Shape::new([2, 2]);
        for scale in [-1.0, f32::NAN, f32::INFINITY] {
            let err = UniformInit::new(scale)
                .seeded(1)
                .initialize(&shape, DType::F32)
                .unwrap_err();
            assert!(err.is_invalid_argument(), "scale {scale}");
        }
        let t = UniformInit::new(0.0).initialize(&shape, DType::F32).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn random_fill_of_integer_params_is_unsupported() {
        let err = UniformInit::new(1.0)
            .initialize(&Shape::new([1]), DType::I32)
            .unwrap_err();
        assert!(err.is_unsupported());
    }
}
