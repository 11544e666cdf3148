//! Logits processing for the decoder output.
//!
//! Handles temperature scaling, greedy/stochastic sampling, and log
//! probabilities for beam scoring.

use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

use half::f16;
use ndarray::{Array, Array2, Axis, Ix3, IxDyn};
use ort::util::ArrayExt;
use ort::value::DynValue;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;

use crate::error::{GenError, Result};

/// Wrapper around 2D logits with processing methods.
///
/// Rows are batch entries, columns are event-vocabulary entries.
pub struct Logits(Array2<f32>);

impl Deref for Logits {
    type Target = Array2<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Logits {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for Logits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Logits({:?})", self.0.dim())
    }
}

impl Logits {
    /// Creates Logits from a raw 2D array.
    pub fn new(array: Array2<f32>) -> Self {
        Self(array)
    }

    /// Creates Logits from a 3D DynValue, supporting both f32 and f16.
    ///
    /// The step graph emits `[1, batch_size, event_dim]`; the leading
    /// single-step axis is removed.
    pub fn from_3d_dyn_value(value: &DynValue) -> Result<Self> {
        let (shape, data): (Vec<usize>, Vec<f32>) =
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
                (shape_vec, data.to_vec())
            } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
                let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
                let data_f32: Vec<f32> = data.iter().map(|e| f32::from(*e)).collect();
                (shape_vec, data_f32)
            } else {
                return Err(GenError::model_inference_failed("logits must be f32 or f16"));
            };

        let arr = Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| {
            GenError::model_inference_failed(format!("failed to create array: {}", e))
        })?;

        let arr = arr
            .into_dimensionality::<Ix3>()
            .map_err(|e| GenError::model_inference_failed(format!("expected 3D logits: {}", e)))?;

        if arr.dim().0 != 1 {
            return Err(GenError::model_inference_failed(format!(
                "expected a single-step logits tensor, got {} steps",
                arr.dim().0
            )));
        }

        let arr = arr.remove_axis(Axis(0));
        Ok(Self(arr))
    }

    /// Softmax probabilities per row after temperature scaling.
    pub fn probs(&self, temperature: f32) -> Array2<f32> {
        let temperature = if temperature > 0.0 { temperature } else { 1.0 };
        (&self.0 / temperature).softmax(Axis(1))
    }

    /// Natural-log probabilities per row after temperature scaling.
    /// Used for beam scoring.
    pub fn log_probs(&self, temperature: f32) -> Array2<f32> {
        self.probs(temperature).mapv(|p| p.max(f32::MIN_POSITIVE).ln())
    }

    /// The most probable event per row.
    pub fn argmax_rows(&self) -> Vec<i64> {
        self.0
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| {
                        a.1.partial_cmp(b.1)
                            .expect("logits must not contain NaN")
                    })
                    .map(|(i, _)| i as i64)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Samples one event per row.
    ///
    /// Each row independently takes the argmax with probability
    /// `greedy_ratio`, otherwise samples the temperature-scaled softmax.
    pub fn sample(
        &self,
        temperature: f32,
        greedy_ratio: f32,
        rng: &mut impl Rng,
    ) -> Result<Vec<i64>> {
        let probs = self.probs(temperature);
        let mut result = Vec::with_capacity(self.0.dim().0);

        for (row, prob_row) in self.0.axis_iter(Axis(0)).zip(probs.axis_iter(Axis(0))) {
            if rng.gen::<f32>() < greedy_ratio {
                let argmax = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| {
                        a.1.partial_cmp(b.1)
                            .expect("logits must not contain NaN")
                    })
                    .map(|(i, _)| i as i64)
                    .unwrap_or(0);
                result.push(argmax);
            } else {
                let distribution = WeightedIndex::new(prob_row.iter()).map_err(|e| {
                    GenError::model_inference_failed(format!(
                        "failed to build sampling distribution: {}",
                        e
                    ))
                })?;
                result.push(distribution.sample(rng) as i64);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn probs_rows_sum_to_one() {
        let arr = Array::from_shape_vec((2, 3), vec![10., -1., 3., -1., 1., 11.]).unwrap();
        let logits = Logits::new(arr);
        let probs = logits.probs(0.8);
        for row in probs.axis_iter(Axis(0)) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn greedy_ratio_one_is_argmax() {
        let arr = Array::from_shape_vec((2, 3), vec![0.1, 0.2, 0.7, 0.9, 0.4, 0.3]).unwrap();
        let logits = Logits::new(arr);
        let events = logits.sample(1.0, 1.0, &mut rng()).unwrap();
        assert_eq!(events, vec![2, 0]);
    }

    #[test]
    fn sampled_events_are_in_range() {
        let arr = Array::from_shape_vec((4, 5), vec![0.5; 20]).unwrap();
        let logits = Logits::new(arr);
        let events = logits.sample(1.0, 0.0, &mut rng()).unwrap();
        assert_eq!(events.len(), 4);
        for event in events {
            assert!((0..5).contains(&event));
        }
    }

    #[test]
    fn log_probs_are_finite_and_negative() {
        let arr = Array::from_shape_vec((1, 4), vec![2.0, 1.0, 0.0, -1.0]).unwrap();
        let logits = Logits::new(arr);
        let log_probs = logits.log_probs(1.0);
        for lp in log_probs.iter() {
            assert!(lp.is_finite());
            assert!(*lp <= 0.0);
        }
    }

    #[test]
    fn argmax_rows_picks_maximum() {
        let arr = Array::from_shape_vec((2, 3), vec![0.0, 5.0, 1.0, 3.0, 2.0, 1.0]).unwrap();
        let logits = Logits::new(arr);
        assert_eq!(logits.argmax_rows(), vec![1, 0]);
    }
}
