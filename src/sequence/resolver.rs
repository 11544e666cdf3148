//! Control argument resolution.
//!
//! Turns the `--control` string into either no conditioning, a single
//! control broadcast over every step, or a per-step control sequence
//! recovered from a processed data file. Also settles the generation
//! length: when the control comes from a file and no explicit max length
//! was requested, the sequence length is taken from the file.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{GenError, Result};
use crate::sequence::control::{uniform_histogram, Control, ProcessedData, PITCH_CLASSES};

/// File extension of processed data files.
pub const DATA_EXTENSION: &str = "data";

/// Resolved control conditioning for one generation run.
#[derive(Debug, Clone)]
pub enum ResolvedControl {
    /// Unconditioned generation.
    None,
    /// A single control broadcast identically across every step.
    Static(Control),
    /// One recovered control vector per time step.
    Sequence(Vec<Vec<f32>>),
}

impl ResolvedControl {
    /// Returns true when generation is unconditioned.
    pub fn is_none(&self) -> bool {
        matches!(self, ResolvedControl::None)
    }

    /// Number of steps a per-step sequence defines, if any.
    pub fn step_count(&self) -> Option<usize> {
        match self {
            ResolvedControl::Sequence(steps) => Some(steps.len()),
            _ => None,
        }
    }

    /// Dimension of the serialized control vectors, if conditioned.
    pub fn dim(&self) -> Option<usize> {
        match self {
            ResolvedControl::None => None,
            ResolvedControl::Static(control) => Some(control.to_vector().len()),
            ResolvedControl::Sequence(steps) => steps.first().map(|v| v.len()),
        }
    }

    /// Control vector for a given step.
    ///
    /// Unconditioned generation feeds a zero vector of the model's control
    /// dimension; a per-step sequence holds its last vector when generation
    /// runs past its end.
    pub fn vector_at(&self, step: usize, dim: usize) -> Vec<f32> {
        match self {
            ResolvedControl::None => vec![0.0; dim],
            ResolvedControl::Static(control) => control.to_vector(),
            ResolvedControl::Sequence(steps) => {
                let index = step.min(steps.len().saturating_sub(1));
                steps[index].clone()
            }
        }
    }
}

/// A resolved control plus its banner description.
#[derive(Debug, Clone)]
pub struct ControlSource {
    /// The resolved conditioning.
    pub control: ResolvedControl,
    /// Human-readable description for the run banner.
    pub description: String,
}

/// Resolves the control argument and the effective generation length.
///
/// The argument may name a processed `.data` file, a directory of such
/// files (one is picked uniformly at random), or a literal
/// `"<histogram>;<density>"` spec. Returns the control source and the
/// effective max length; fails with `MISSING_LENGTH` when neither a
/// control file nor an explicit max length defines the step count.
pub fn resolve_control(
    arg: Option<&str>,
    max_len: usize,
    rng: &mut impl Rng,
) -> Result<(ControlSource, usize)> {
    let Some(spec) = arg else {
        if max_len == 0 {
            return Err(GenError::missing_length());
        }
        return Ok((
            ControlSource {
                control: ResolvedControl::None,
                description: "NONE".to_string(),
            },
            max_len,
        ));
    };

    let path = Path::new(spec);
    if path.is_file() || path.is_dir() {
        let file = if path.is_dir() {
            pick_data_file(path, rng)?
        } else {
            path.to_path_buf()
        };

        let data = ProcessedData::load(&file)?;
        let steps = data.recover_controls()?;
        if steps.is_empty() {
            return Err(GenError::invalid_control(format!(
                "control sequence in \"{}\" is empty",
                file.display()
            )));
        }

        let effective_len = if max_len == 0 { steps.len() } else { max_len };
        return Ok((
            ControlSource {
                control: ResolvedControl::Sequence(steps),
                description: format!("control sequence from \"{}\"", file.display()),
            },
            effective_len,
        ));
    }

    let control = parse_control_spec(spec)?;
    if max_len == 0 {
        return Err(GenError::missing_length());
    }
    let description = control.to_string();
    Ok((
        ControlSource {
            control: ResolvedControl::Static(control),
            description,
        },
        max_len,
    ))
}

/// Picks one `.data` file uniformly at random from a directory tree.
fn pick_data_file(dir: &Path, rng: &mut impl Rng) -> Result<PathBuf> {
    let mut files = Vec::new();
    collect_data_files(dir, &mut files)?;
    // Directory order is platform-dependent; sort so a seeded RNG picks
    // the same file everywhere.
    files.sort();

    files
        .choose(rng)
        .cloned()
        .ok_or_else(|| GenError::invalid_control(format!("no .data file in \"{}\"", dir.display())))
}

/// Collects `.data` files from a directory, descending into subdirectories.
fn collect_data_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        GenError::with_source(
            crate::error::ErrorCode::InvalidControl,
            format!("failed to list \"{}\"", dir.display()),
            e,
        )
    })?;

    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_data_files(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

/// Parses a literal `"<pitch_histogram>;<note_density>"` control spec.
fn parse_control_spec(spec: &str) -> Result<Control> {
    let (histogram_part, density_part) = spec.split_once(';').ok_or_else(|| {
        GenError::invalid_control(format!(
            "\"{}\" is neither an existing path nor a \"histogram;density\" spec",
            spec
        ))
    })?;

    let weights: Vec<&str> = histogram_part.split(',').filter(|s| !s.is_empty()).collect();
    let histogram = if weights.is_empty() {
        uniform_histogram()
    } else {
        if weights.len() != PITCH_CLASSES {
            return Err(GenError::invalid_control(format!(
                "histogram has {} values, expected {}",
                weights.len(),
                PITCH_CLASSES
            )));
        }
        let mut histogram = [0.0f32; PITCH_CLASSES];
        for (slot, raw) in histogram.iter_mut().zip(weights.iter()) {
            *slot = raw.trim().parse::<f32>().map_err(|e| {
                GenError::with_source(
                    crate::error::ErrorCode::InvalidControl,
                    format!("histogram value \"{}\" is not a number", raw),
                    e,
                )
            })?;
        }
        histogram
    };

    let density = density_part.trim().parse::<usize>().map_err(|e| {
        GenError::with_source(
            crate::error::ErrorCode::InvalidControl,
            format!("density index \"{}\" is not an integer", density_part),
            e,
        )
    })?;

    Control::new(histogram, density)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::control::{CompressedControl, NOTE_DENSITY_BINS};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::tempdir;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn write_data_file(path: &Path, steps: usize) {
        let data = ProcessedData {
            events: (0..steps as u32).collect(),
            controls: (0..steps)
                .map(|i| CompressedControl {
                    density: (i % NOTE_DENSITY_BINS.len()) as u8,
                    counts: [1; PITCH_CLASSES],
                })
                .collect(),
        };
        std::fs::write(path, serde_json::to_string(&data).unwrap()).unwrap();
    }

    #[test]
    fn literal_histogram_sums_to_one() {
        let (source, len) =
            resolve_control(Some("2,0,1,1,0,1,0,1,1,0,0,1;4"), 100, &mut rng()).unwrap();
        assert_eq!(len, 100);
        match source.control {
            ResolvedControl::Static(control) => {
                let sum: f32 = control.histogram().iter().sum();
                assert!((sum - 1.0).abs() < 1e-6);
                assert_eq!(control.density(), 4);
            }
            other => panic!("expected static control, got {:?}", other),
        }
    }

    #[test]
    fn empty_histogram_is_uniform() {
        let (source, _) = resolve_control(Some(";3"), 50, &mut rng()).unwrap();
        match source.control {
            ResolvedControl::Static(control) => {
                assert_eq!(control.histogram(), &uniform_histogram());
                assert_eq!(control.density(), 3);
            }
            other => panic!("expected static control, got {:?}", other),
        }
    }

    #[test]
    fn density_out_of_range_fails() {
        let spec = format!(";{}", NOTE_DENSITY_BINS.len());
        assert!(resolve_control(Some(&spec), 50, &mut rng()).is_err());
    }

    #[test]
    fn wrong_histogram_size_fails() {
        assert!(resolve_control(Some("1,2,3;0"), 50, &mut rng()).is_err());
    }

    #[test]
    fn data_file_infers_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("piece.data");
        write_data_file(&path, 37);

        let (source, len) =
            resolve_control(Some(path.to_str().unwrap()), 0, &mut rng()).unwrap();
        assert_eq!(len, 37);
        assert_eq!(source.control.step_count(), Some(37));
    }

    #[test]
    fn explicit_max_len_overrides_file_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("piece.data");
        write_data_file(&path, 37);

        let (_, len) = resolve_control(Some(path.to_str().unwrap()), 200, &mut rng()).unwrap();
        assert_eq!(len, 200);
    }

    #[test]
    fn directory_picks_one_data_file() {
        let dir = tempdir().unwrap();
        write_data_file(&dir.path().join("a.data"), 5);
        write_data_file(&dir.path().join("b.data"), 9);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (source, len) =
            resolve_control(Some(dir.path().to_str().unwrap()), 0, &mut rng()).unwrap();
        assert!(len == 5 || len == 9);
        assert!(source.description.contains(".data"));
    }

    #[test]
    fn nested_directories_are_searched() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("year").join("composer");
        std::fs::create_dir_all(&nested).unwrap();
        write_data_file(&nested.join("piece.data"), 11);

        let (source, len) =
            resolve_control(Some(dir.path().to_str().unwrap()), 0, &mut rng()).unwrap();
        assert_eq!(len, 11);
        assert!(source.description.contains("piece.data"));
    }

    #[test]
    fn empty_directory_fails() {
        let dir = tempdir().unwrap();
        assert!(resolve_control(Some(dir.path().to_str().unwrap()), 0, &mut rng()).is_err());
    }

    #[test]
    fn no_control_and_no_length_fails() {
        let err = resolve_control(None, 0, &mut rng()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingLength);
    }

    #[test]
    fn literal_control_without_length_fails() {
        let err = resolve_control(Some(";3"), 0, &mut rng()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingLength);
    }

    #[test]
    fn unconditioned_with_length_succeeds() {
        let (source, len) = resolve_control(None, 80, &mut rng()).unwrap();
        assert!(source.control.is_none());
        assert_eq!(len, 80);
        assert_eq!(source.description, "NONE");
    }

    #[test]
    fn unconditioned_vector_is_zeros() {
        let control = ResolvedControl::None;
        assert_eq!(control.vector_at(3, 24), vec![0.0; 24]);
    }
}
