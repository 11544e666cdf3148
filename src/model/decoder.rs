//! Autoregressive decoder over the exported recurrent step graph.
//!
//! One generation run projects the initial hidden state through
//! `init.onnx`, then feeds events back through `step.onnx` one step at a
//! time, sampling the next event from each step's logits. fp16 exports work
//! on this path; the quantization pass and beam search rework the hidden
//! state on the host and therefore need an f32 export.

use std::borrow::Cow;

use ndarray::Array2;
use ort::session::{Session, SessionInputValue};
use ort::value::{DynValue, Tensor};
use rand::Rng;

use crate::error::{GenError, Result};
use crate::model::config::ModelConfig;
use crate::model::logits::Logits;
use crate::model::quantize::{Quantizer, HIDDEN_TENSOR, LOGITS_TENSOR};
use crate::sequence::ResolvedControl;

/// Performance RNN decoder driving the exported ONNX graphs.
pub struct PerformanceDecoder {
    init_session: Session,
    step_session: Session,
    config: ModelConfig,
    quantizer: Option<Quantizer>,
}

impl PerformanceDecoder {
    /// Wraps loaded sessions into a decoder.
    pub fn new(
        init_session: Session,
        step_session: Session,
        config: ModelConfig,
        quantizer: Option<Quantizer>,
    ) -> Self {
        Self {
            init_session,
            step_session,
            config,
            quantizer,
        }
    }

    /// The checkpoint configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Whether the quantization pass is active.
    pub fn is_quantized(&self) -> bool {
        self.quantizer.is_some()
    }

    /// Projects an init batch into the initial hidden state.
    ///
    /// `init` must be `[batch, init_dim]`; the result is the hidden-state
    /// tensor `[gru_layers, batch, hidden_dim]` consumed by the step graph.
    pub(crate) fn init_hidden(&mut self, init: &Array2<f32>) -> Result<DynValue> {
        let (batch, init_dim) = init.dim();
        if init_dim != self.config.init_dim as usize {
            return Err(GenError::model_inference_failed(format!(
                "init has dimension {}, checkpoint expects {}",
                init_dim, self.config.init_dim
            )));
        }

        let data: Vec<f32> = init.iter().copied().collect();
        let init_tensor = Tensor::from_array(([batch, init_dim], data)).map_err(|e| {
            GenError::model_inference_failed(format!("failed to create init tensor: {}", e))
        })?;
        let init_value = init_tensor.into_dyn();

        let session_inputs: Vec<(Cow<str>, SessionInputValue)> = vec![(
            Cow::from("init"),
            SessionInputValue::from(init_value.view()),
        )];

        let mut outputs = self.init_session.run(session_inputs).map_err(|e| {
            GenError::model_inference_failed(format!("init projection failed: {}", e))
        })?;

        let hidden = outputs
            .remove("hidden")
            .ok_or_else(|| GenError::model_inference_failed("hidden not found in init output"))?;
        drop(outputs);

        self.quantize_value(HIDDEN_TENSOR, hidden)
    }

    /// Runs one decode step.
    ///
    /// `events` holds the previous event per batch row; `control` is the
    /// per-row control vector for this step (flattened `[batch,
    /// control_dim]`). Returns the step logits and the next hidden state.
    pub(crate) fn run_step(
        &mut self,
        events: &[i64],
        control: &[f32],
        hidden: &DynValue,
    ) -> Result<(Logits, DynValue)> {
        let batch = events.len();
        let control_dim = self.config.control_dim as usize;
        debug_assert_eq!(control.len(), batch * control_dim);

        let event_tensor = Tensor::from_array(([1usize, batch], events.to_vec())).map_err(|e| {
            GenError::model_inference_failed(format!("failed to create event tensor: {}", e))
        })?;
        let control_tensor =
            Tensor::from_array((vec![1usize, batch, control_dim], control.to_vec())).map_err(|e| {
                GenError::model_inference_failed(format!(
                    "failed to create control tensor: {}",
                    e
                ))
            })?;
        let event_value = event_tensor.into_dyn();
        let control_value = control_tensor.into_dyn();

        let session_inputs: Vec<(Cow<str>, SessionInputValue)> = vec![
            (Cow::from("event"), SessionInputValue::from(event_value.view())),
            (
                Cow::from("control"),
                SessionInputValue::from(control_value.view()),
            ),
            (Cow::from("hidden"), SessionInputValue::from(hidden.view())),
        ];

        let mut outputs = self
            .step_session
            .run(session_inputs)
            .map_err(|e| GenError::model_inference_failed(format!("step failed: {}", e)))?;

        let logits_value = outputs
            .remove("logits")
            .ok_or_else(|| GenError::model_inference_failed("logits not found in step output"))?;
        let hidden_out = outputs.remove("hidden_out").ok_or_else(|| {
            GenError::model_inference_failed("hidden_out not found in step output")
        })?;
        drop(outputs);

        let mut logits = Logits::from_3d_dyn_value(&logits_value)?;
        if let Some(quantizer) = &self.quantizer {
            if let Some(slice) = logits.as_slice_mut() {
                quantizer.apply(LOGITS_TENSOR, slice);
            }
        }

        let hidden_out = self.quantize_value(HIDDEN_TENSOR, hidden_out)?;
        Ok((logits, hidden_out))
    }

    /// Generates a batch of event-index sequences autoregressively.
    ///
    /// The first input event is the checkpoint's primary event. Seed
    /// events, when given, are force-fed (and recorded) for the leading
    /// steps before free-running sampling takes over. `on_progress`
    /// receives `(steps_done, max_len)`.
    #[allow(clippy::too_many_arguments)]
    pub fn generate<F>(
        &mut self,
        init: &Array2<f32>,
        max_len: usize,
        control: &ResolvedControl,
        seed_events: Option<&[i64]>,
        greedy_ratio: f32,
        temperature: f32,
        rng: &mut impl Rng,
        on_progress: F,
    ) -> Result<Vec<Vec<i64>>>
    where
        F: Fn(usize, usize),
    {
        if max_len == 0 {
            return Err(GenError::missing_length());
        }
        self.check_control_dim(control)?;

        let batch = init.dim().0;
        let control_dim = self.config.control_dim as usize;
        let mut hidden = self.init_hidden(init)?;
        let mut current = vec![self.config.primary_event as i64; batch];
        let mut outputs: Vec<Vec<i64>> = vec![Vec::with_capacity(max_len); batch];

        for step in 0..max_len {
            let step_control = broadcast_control(control, step, control_dim, batch);
            let (logits, next_hidden) = self.run_step(&current, &step_control, &hidden)?;
            hidden = next_hidden;

            let next = match seed_events {
                Some(seed) if step < seed.len() => vec![seed[step]; batch],
                _ => logits.sample(temperature, greedy_ratio, rng)?,
            };

            for (row, event) in outputs.iter_mut().zip(next.iter()) {
                row.push(*event);
            }
            current = next;
            on_progress(step + 1, max_len);
        }

        Ok(outputs)
    }

    /// Fails when a resolved control does not match the checkpoint's
    /// control dimension.
    pub(crate) fn check_control_dim(&self, control: &ResolvedControl) -> Result<()> {
        if let Some(dim) = control.dim() {
            if dim != self.config.control_dim as usize {
                return Err(GenError::invalid_control(format!(
                    "control vectors have dimension {}, checkpoint expects {}",
                    dim, self.config.control_dim
                )));
            }
        }
        Ok(())
    }

    /// Applies the quantization pass to a host-visible tensor, if enabled.
    fn quantize_value(&self, name: &str, value: DynValue) -> Result<DynValue> {
        let Some(quantizer) = &self.quantizer else {
            return Ok(value);
        };
        if !quantizer.covers(name) {
            return Ok(value);
        }

        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            GenError::model_inference_failed(format!(
                "quantization needs an f32 export, failed to extract \"{}\": {}",
                name, e
            ))
        })?;
        let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        let mut data = data.to_vec();
        quantizer.apply(name, &mut data);

        let tensor = Tensor::from_array((shape_vec, data)).map_err(|e| {
            GenError::model_inference_failed(format!(
                "failed to rebuild quantized \"{}\": {}",
                name, e
            ))
        })?;
        Ok(tensor.into_dyn())
    }
}

/// Flattens the control vector for one step across the batch.
pub(crate) fn broadcast_control(
    control: &ResolvedControl,
    step: usize,
    control_dim: usize,
    batch: usize,
) -> Vec<f32> {
    let vector = control.vector_at(step, control_dim);
    let mut flattened = Vec::with_capacity(batch * control_dim);
    for _ in 0..batch {
        flattened.extend_from_slice(&vector);
    }
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Control;

    #[test]
    fn broadcast_control_replicates_rows() {
        let control = ResolvedControl::Static(Control::uniform(2).unwrap());
        let flattened = broadcast_control(&control, 0, 24, 3);
        assert_eq!(flattened.len(), 72);
        assert_eq!(flattened[0..24], flattened[24..48]);
        assert_eq!(flattened[24..48], flattened[48..72]);
    }

    #[test]
    fn broadcast_unconditioned_is_zeros() {
        let flattened = broadcast_control(&ResolvedControl::None, 5, 24, 2);
        assert_eq!(flattened, vec![0.0; 48]);
    }

    #[test]
    fn sequence_control_holds_last_vector_past_end() {
        let steps = vec![vec![1.0; 24], vec![2.0; 24]];
        let control = ResolvedControl::Sequence(steps);
        let flattened = broadcast_control(&control, 10, 24, 1);
        assert_eq!(flattened, vec![2.0; 24]);
    }
}
