//! Beam search over the recurrent step graph.
//!
//! Keeps `beam_size` hypotheses per batch element, scored by cumulative
//! log probability of the temperature-scaled softmax. Each step expands
//! every live hypothesis, reranks, and reorders the hidden state to match
//! the surviving hypotheses. Requires an f32 export since the hidden state
//! is permuted on the host.

use ndarray::{s, Array2, ArrayView1, Axis};
use ort::value::{DynValue, Tensor};

use crate::error::{GenError, Result};
use crate::model::config::ModelConfig;
use crate::model::decoder::{broadcast_control, PerformanceDecoder};
use crate::sequence::ResolvedControl;

/// One surviving hypothesis after a rerank step.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BeamCandidate {
    /// Row index of the parent hypothesis within the element's beams.
    parent: usize,
    /// Event appended by this expansion.
    event: i64,
    /// Cumulative log probability.
    score: f32,
}

/// Runs beam search and returns the best sequence per batch element.
///
/// `init` is `[batch, init_dim]`; every element's beams start from the same
/// init row. `on_progress` receives `(steps_done, max_len)`.
pub fn beam_search<F>(
    decoder: &mut PerformanceDecoder,
    init: &Array2<f32>,
    max_len: usize,
    beam_size: usize,
    control: &ResolvedControl,
    temperature: f32,
    on_progress: F,
) -> Result<Vec<Vec<i64>>>
where
    F: Fn(usize, usize),
{
    if beam_size == 0 {
        return Err(GenError::model_inference_failed("beam size must be > 0"));
    }
    if max_len == 0 {
        return Err(GenError::missing_length());
    }
    decoder.check_control_dim(control)?;

    let batch = init.dim().0;
    let init_dim = init.dim().1;
    let control_dim = decoder.config().control_dim as usize;
    let primary_event = decoder.config().primary_event as i64;
    let expanded = batch * beam_size;

    // Every beam of an element shares the element's init row.
    let mut tiled = Vec::with_capacity(expanded * init_dim);
    for row in init.axis_iter(Axis(0)) {
        for _ in 0..beam_size {
            tiled.extend(row.iter().copied());
        }
    }
    let tiled = Array2::from_shape_vec((expanded, init_dim), tiled)
        .map_err(|e| GenError::model_inference_failed(format!("failed to tile init: {}", e)))?;

    let mut hidden = decoder.init_hidden(&tiled)?;
    let mut current = vec![primary_event; expanded];
    let mut histories: Vec<Vec<i64>> = vec![Vec::with_capacity(max_len); expanded];
    // All beams start identical; only the first is live so the initial
    // expansion does not select duplicates.
    let mut scores: Vec<f32> = (0..expanded)
        .map(|row| if row % beam_size == 0 { 0.0 } else { f32::NEG_INFINITY })
        .collect();

    let config = decoder.config().clone();

    for step in 0..max_len {
        let step_control = broadcast_control(control, step, control_dim, expanded);
        let (logits, next_hidden) = decoder.run_step(&current, &step_control, &hidden)?;
        let log_probs = logits.log_probs(temperature);

        let mut permutation = Vec::with_capacity(expanded);
        let mut next_current = Vec::with_capacity(expanded);
        let mut next_histories = Vec::with_capacity(expanded);
        let mut next_scores = Vec::with_capacity(expanded);

        for element in 0..batch {
            let base = element * beam_size;
            let element_rows = log_probs.slice(s![base..base + beam_size, ..]);
            let selected = select_beams(&scores[base..base + beam_size], element_rows, beam_size);

            for candidate in selected {
                let parent_row = base + candidate.parent;
                permutation.push(parent_row);
                next_current.push(candidate.event);
                let mut history = histories[parent_row].clone();
                history.push(candidate.event);
                next_histories.push(history);
                next_scores.push(candidate.score);
            }
        }

        hidden = reorder_hidden(&next_hidden, &permutation, &config)?;
        current = next_current;
        histories = next_histories;
        scores = next_scores;
        on_progress(step + 1, max_len);
    }

    // Best hypothesis per element
    let mut results = Vec::with_capacity(batch);
    for element in 0..batch {
        let base = element * beam_size;
        let best = (base..base + beam_size)
            .max_by(|a, b| {
                scores[*a]
                    .partial_cmp(&scores[*b])
                    .expect("beam scores must not be NaN")
            })
            .unwrap_or(base);
        results.push(histories[best].clone());
    }
    Ok(results)
}

/// Selects the top `beam_size` expansions of one element's hypotheses.
///
/// `scores` holds the cumulative log probability per live hypothesis and
/// `log_probs` its per-event expansion scores. The union of per-row top-k
/// candidates always contains the global top-k.
fn select_beams(
    scores: &[f32],
    log_probs: ndarray::ArrayView2<f32>,
    beam_size: usize,
) -> Vec<BeamCandidate> {
    let mut candidates = Vec::with_capacity(scores.len() * beam_size);

    for (parent, (score, row)) in scores
        .iter()
        .zip(log_probs.axis_iter(Axis(0)))
        .enumerate()
    {
        if !score.is_finite() {
            continue;
        }
        for (event, log_prob) in top_k_row(row, beam_size) {
            candidates.push(BeamCandidate {
                parent,
                event: event as i64,
                score: score + log_prob,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .expect("beam scores must not be NaN")
    });
    candidates.truncate(beam_size);
    // Fewer live hypotheses than beams can only happen at step 0; pad by
    // repeating the best candidate so the beam width stays constant.
    while candidates.len() < beam_size {
        let best = candidates[0];
        candidates.push(best);
    }
    candidates
}

/// Top `k` entries of one log-probability row, highest first.
fn top_k_row(row: ArrayView1<f32>, k: usize) -> Vec<(usize, f32)> {
    let mut entries: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .expect("log probabilities must not be NaN")
    });
    entries.truncate(k);
    entries
}

/// Permutes the hidden state's batch axis to follow surviving hypotheses.
///
/// `hidden` is `[gru_layers, rows, hidden_dim]`; row `r` of the result is
/// row `permutation[r]` of the input, within every layer.
fn reorder_hidden(
    hidden: &DynValue,
    permutation: &[usize],
    config: &ModelConfig,
) -> Result<DynValue> {
    let (shape, data) = hidden.try_extract_tensor::<f32>().map_err(|e| {
        GenError::model_inference_failed(format!(
            "beam search needs an f32 export, failed to extract hidden: {}",
            e
        ))
    })?;
    let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
    if shape_vec.len() != 3 {
        return Err(GenError::model_inference_failed(format!(
            "expected 3D hidden state, got {:?}",
            shape_vec
        )));
    }

    let (layers, rows, hidden_dim) = (shape_vec[0], shape_vec[1], shape_vec[2]);
    if rows != permutation.len()
        || hidden_dim != config.hidden_dim as usize
        || data.len() != config.hidden_len(rows)
    {
        return Err(GenError::model_inference_failed(format!(
            "hidden state shape {:?} does not match beam layout",
            shape_vec
        )));
    }

    let mut reordered = Vec::with_capacity(data.len());
    for layer in 0..layers {
        let layer_base = layer * rows * hidden_dim;
        for &src in permutation {
            let start = layer_base + src * hidden_dim;
            reordered.extend_from_slice(&data[start..start + hidden_dim]);
        }
    }

    let tensor = Tensor::from_array((shape_vec, reordered)).map_err(|e| {
        GenError::model_inference_failed(format!("failed to rebuild hidden state: {}", e))
    })?;
    Ok(tensor.into_dyn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn top_k_row_orders_descending() {
        let row = array![-3.0f32, -1.0, -2.0, -0.5];
        let top = top_k_row(row.view(), 2);
        assert_eq!(top[0].0, 3);
        assert_eq!(top[1].0, 1);
    }

    #[test]
    fn select_beams_prefers_high_joint_score() {
        // Two hypotheses: the weaker parent has the stronger expansion.
        let scores = [-1.0f32, -2.0];
        let log_probs = array![[-5.0f32, -6.0], [-0.1, -7.0]];
        let selected = select_beams(&scores, log_probs.view(), 2);
        // Best joint score: parent 1 with event 0 (-2.1), then parent 0
        // with event 0 (-6.0)
        assert_eq!(selected[0].parent, 1);
        assert_eq!(selected[0].event, 0);
        assert!((selected[0].score - -2.1).abs() < 1e-6);
        assert_eq!(selected[1].parent, 0);
        assert_eq!(selected[1].event, 0);
    }

    #[test]
    fn select_beams_skips_dead_hypotheses() {
        let scores = [0.0f32, f32::NEG_INFINITY];
        let log_probs = array![[-0.5f32, -1.5], [-0.0, -0.0]];
        let selected = select_beams(&scores, log_probs.view(), 2);
        // Both survivors expand the single live hypothesis
        assert!(selected.iter().all(|c| c.parent == 0));
        assert_eq!(selected[0].event, 0);
        assert_eq!(selected[1].event, 1);
    }

    fn small_config(gru_layers: u32) -> ModelConfig {
        ModelConfig {
            event_dim: 308,
            control_dim: 24,
            init_dim: 2,
            hidden_dim: 2,
            gru_layers,
            primary_event: 307,
        }
    }

    #[test]
    fn reorder_hidden_permutes_rows_within_each_layer() {
        // [2 layers, 3 rows, 2 hidden]
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let hidden = Tensor::from_array((vec![2usize, 3, 2], data))
            .unwrap()
            .into_dyn();

        let reordered = reorder_hidden(&hidden, &[2, 0, 1], &small_config(2)).unwrap();
        let (_, out) = reordered.try_extract_tensor::<f32>().unwrap();
        assert_eq!(
            out,
            &[4.0, 5.0, 0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 6.0, 7.0, 8.0, 9.0]
        );
    }

    #[test]
    fn reorder_hidden_rejects_wrong_layer_count() {
        let hidden = Tensor::from_array((vec![2usize, 3, 2], vec![0.0f32; 12]))
            .unwrap()
            .into_dyn();
        // Config expects 3 layers, tensor has 2
        assert!(reorder_hidden(&hidden, &[0, 1, 2], &small_config(3)).is_err());
    }

    #[test]
    fn select_beams_pads_to_full_width() {
        let scores = [0.0f32, f32::NEG_INFINITY, f32::NEG_INFINITY];
        let log_probs = array![
            [-0.5f32, f32::NEG_INFINITY, f32::NEG_INFINITY],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0]
        ];
        let selected = select_beams(&scores, log_probs.view(), 3);
        assert_eq!(selected.len(), 3);
    }
}
