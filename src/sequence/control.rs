//! Control signals for conditioned generation.
//!
//! A [`Control`] pairs a pitch-class histogram with a note-density bucket
//! and serializes to a fixed-length vector the model consumes at every
//! step. Processed `.data` files store one compressed control per time
//! step; recovering them yields a per-step control sequence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, Result};

/// Number of pitch classes in the histogram.
pub const PITCH_CLASSES: usize = 12;

/// Note-density buckets over windowed note counts.
///
/// A performance window falls in bucket `i` when its note count reaches
/// `NOTE_DENSITY_BINS[i]` but not `NOTE_DENSITY_BINS[i + 1]`.
pub const NOTE_DENSITY_BINS: [u32; 12] = [1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34];

/// Dimension of a serialized control vector: histogram + one-hot density.
pub const CONTROL_DIM: usize = PITCH_CLASSES + NOTE_DENSITY_BINS.len();

/// A pitch-class histogram paired with a note-density bucket.
///
/// Immutable once constructed; the histogram always sums to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    histogram: [f32; PITCH_CLASSES],
    density: usize,
}

impl Control {
    /// Creates a control from a normalized histogram and a density bucket.
    ///
    /// Fails when the density index is outside the bin range or the
    /// histogram contains a negative weight. A zero-sum histogram falls
    /// back to the uniform distribution; otherwise it is normalized to
    /// sum 1.
    pub fn new(histogram: [f32; PITCH_CLASSES], density: usize) -> Result<Self> {
        if density >= NOTE_DENSITY_BINS.len() {
            return Err(GenError::invalid_control(format!(
                "density index {} out of range 0..{}",
                density,
                NOTE_DENSITY_BINS.len()
            )));
        }
        if histogram.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(GenError::invalid_control(
                "histogram weights must be non-negative finite numbers",
            ));
        }

        let sum: f32 = histogram.iter().sum();
        let histogram = if sum > 0.0 {
            let mut h = histogram;
            for w in h.iter_mut() {
                *w /= sum;
            }
            h
        } else {
            uniform_histogram()
        };

        Ok(Self { histogram, density })
    }

    /// Creates a control with the uniform histogram.
    pub fn uniform(density: usize) -> Result<Self> {
        Self::new(uniform_histogram(), density)
    }

    /// The normalized pitch-class histogram.
    pub fn histogram(&self) -> &[f32; PITCH_CLASSES] {
        &self.histogram
    }

    /// The note-density bucket index.
    pub fn density(&self) -> usize {
        self.density
    }

    /// Serializes to the fixed-length control vector:
    /// histogram (12) followed by the one-hot density bucket.
    pub fn to_vector(&self) -> Vec<f32> {
        let mut v = Vec::with_capacity(CONTROL_DIM);
        v.extend_from_slice(&self.histogram);
        for i in 0..NOTE_DENSITY_BINS.len() {
            v.push(if i == self.density { 1.0 } else { 0.0 });
        }
        v
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let weights: Vec<String> = self.histogram.iter().map(|w| format!("{:.3}", w)).collect();
        write!(f, "Control(pitches=[{}], density={})", weights.join(","), self.density)
    }
}

/// The uniform distribution over the 12 pitch classes.
pub fn uniform_histogram() -> [f32; PITCH_CLASSES] {
    [1.0 / PITCH_CLASSES as f32; PITCH_CLASSES]
}

/// One compressed control step: the density bucket plus raw per-class
/// note counts for the surrounding window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedControl {
    /// Density bucket index.
    pub density: u8,
    /// Windowed note counts per pitch class.
    pub counts: [u8; PITCH_CLASSES],
}

impl CompressedControl {
    /// Decompresses into a control vector.
    ///
    /// Counts are normalized to a distribution (uniform when all zero)
    /// and the density bucket is one-hot encoded.
    pub fn recover(&self) -> Result<Vec<f32>> {
        let mut histogram = [0.0f32; PITCH_CLASSES];
        for (h, c) in histogram.iter_mut().zip(self.counts.iter()) {
            *h = *c as f32;
        }
        let control = Control::new(histogram, self.density as usize)?;
        Ok(control.to_vector())
    }
}

/// Contents of a processed `.data` file: the event-index sequence of a
/// preprocessed performance plus its per-step compressed controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedData {
    /// Event indices of the source performance.
    pub events: Vec<u32>,
    /// One compressed control per event step.
    pub controls: Vec<CompressedControl>,
}

impl ProcessedData {
    /// Loads a processed data file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GenError::with_source(
                crate::error::ErrorCode::InvalidControl,
                format!("failed to read {}", path.display()),
                e,
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            GenError::with_source(
                crate::error::ErrorCode::InvalidControl,
                format!("failed to parse {}", path.display()),
                e,
            )
        })
    }

    /// Recovers the full per-step control sequence, one vector per step.
    pub fn recover_controls(&self) -> Result<Vec<Vec<f32>>> {
        self.controls.iter().map(|c| c.recover()).collect()
    }
}
