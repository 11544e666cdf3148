//! CLI argument parser for the generation driver.
//!
//! Covers the full option surface of one generation run: control spec,
//! batch size, checkpoint directory, output directory, length and
//! sampling knobs, seed MIDI input, and the quantization stats file.

use std::path::PathBuf;

use clap::Parser;

/// perfrnn: Performance RNN symbolic music generation
#[derive(Parser, Debug)]
#[command(name = "perfrnn")]
#[command(about = "Performance RNN symbolic music generation with ONNX Runtime")]
#[command(version)]
pub struct Cli {
    /// Control spec or a processed data file path, e.g.
    /// "PITCH_HISTOGRAM;NOTE_DENSITY" like "2,0,1,1,0,1,0,1,1,0,0,1;4",
    /// or ";3" (which gives all pitches the same probability),
    /// or "/path/to/processed/file.data" (uses the control sequence from
    /// the given processed data), or a directory of .data files (one is
    /// picked at random)
    #[arg(short, long)]
    pub control: Option<String>,

    /// Number of sequences to generate in one batch
    #[arg(short, long, default_value = "8")]
    pub batch_size: usize,

    /// Path to the checkpoint directory containing config.json, init.onnx
    /// and step.onnx
    #[arg(short, long)]
    pub model_dir: Option<PathBuf>,

    /// Output directory for generated MIDI files (created if absent)
    #[arg(short, long, default_value = "output/")]
    pub output_dir: PathBuf,

    /// Number of events to generate (0 = take the length from the control
    /// sequence file)
    #[arg(short = 'l', long, default_value = "0")]
    pub max_len: usize,

    /// Probability of taking the argmax event instead of sampling
    #[arg(short, long, default_value = "1.0")]
    pub greedy_ratio: f32,

    /// Beam size (> 0 enables beam search and disables the greedy ratio)
    #[arg(short = 'B', long, default_value = "0")]
    pub beam_size: usize,

    /// Softmax temperature for sampling and beam scoring
    #[arg(short = 'T', long, default_value = "1.0")]
    pub temperature: f32,

    /// Initialize the hidden-state projection with zeros instead of
    /// standard-normal noise
    #[arg(short = 'z', long)]
    pub init_zero: bool,

    /// Path to a MIDI file whose events seed the generated sequences
    #[arg(short, long)]
    pub input_midi: Option<PathBuf>,

    /// Path to a JSON file with activation stats enabling quantized
    /// inference
    #[arg(short = 'q', long)]
    pub stats_file: Option<PathBuf>,

    /// Random seed for reproducible generation
    #[arg(short, long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns true if beam search is the active strategy.
    pub fn use_beam_search(&self) -> bool {
        self.beam_size > 0
    }

    /// Returns the effective checkpoint directory.
    ///
    /// Defaults to the platform-specific cache location if not specified.
    pub fn model_directory(&self) -> PathBuf {
        if let Some(ref path) = self.model_dir {
            path.clone()
        } else {
            default_model_path()
        }
    }
}

/// Returns the platform-specific default checkpoint storage path.
fn default_model_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "perfrnn") {
        proj_dirs.cache_dir().join("checkpoint")
    } else {
        PathBuf::from("./checkpoint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            control: None,
            batch_size: 8,
            model_dir: None,
            output_dir: PathBuf::from("output/"),
            max_len: 0,
            greedy_ratio: 1.0,
            beam_size: 0,
            temperature: 1.0,
            init_zero: false,
            input_midi: None,
            stats_file: None,
            seed: None,
        }
    }

    #[test]
    fn default_model_path_is_valid() {
        let path = default_model_path();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn beam_search_selection() {
        let sampling = base_cli();
        assert!(!sampling.use_beam_search());

        let beam = Cli {
            beam_size: 5,
            ..base_cli()
        };
        assert!(beam.use_beam_search());
    }

    #[test]
    fn model_directory_override() {
        let cli = Cli {
            model_dir: Some(PathBuf::from("/tmp/ckpt")),
            ..base_cli()
        };
        assert_eq!(cli.model_directory(), PathBuf::from("/tmp/ckpt"));
    }
}
