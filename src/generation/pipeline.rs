//! Generation pipeline.
//!
//! Orchestrates one run: resolve the control argument, load the
//! checkpoint, dispatch to sampling or beam search, and write one MIDI
//! file per batch element.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::cli::Cli;
use crate::config::RuntimeConfig;
use crate::error::{ErrorCode, GenError, Result};
use crate::midi::{read_midi_file, write_midi_file};
use crate::model::{beam_search, load_decoder, Quantizer};
use crate::sequence::resolve_control;

/// Runs one complete generation pass.
pub fn run_generation(cli: &Cli, runtime: &RuntimeConfig) -> Result<()> {
    let mut rng = match cli.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let seed_events = match &cli.input_midi {
        Some(path) => Some(read_midi_file(path)?),
        None => None,
    };

    let (source, max_len) = resolve_control(cli.control.as_deref(), cli.max_len, &mut rng)?;
    let model_dir = effective_model_dir(cli, runtime);

    let quantizer = match &cli.stats_file {
        Some(path) => Some(Quantizer::from_stats_file(path)?),
        None => None,
    };

    print_banner(cli, &model_dir, max_len, &source.description);

    let mut decoder = load_decoder(&model_dir, runtime, quantizer)?;
    if decoder.is_quantized() {
        eprintln!("Quantized inference enabled.");
    }
    decoder.check_control_dim(&source.control)?;

    let batch = cli.batch_size;
    let init_dim = decoder.config().init_dim as usize;
    let init: Array2<f32> = if cli.init_zero {
        Array2::zeros((batch, init_dim))
    } else {
        Array2::from_shape_fn((batch, init_dim), |_| rng.sample(StandardNormal))
    };

    let on_progress = |step: usize, total: usize| {
        if step % 100 == 0 || step == total {
            eprintln!("Progress: {}/{} events", step, total);
        }
    };

    let outputs = if cli.use_beam_search() {
        if seed_events.is_some() {
            eprintln!("Warning: --input-midi is ignored with beam search.");
        }
        eprintln!(
            "Generating {} events with beam size {}...",
            max_len, cli.beam_size
        );
        beam_search(
            &mut decoder,
            &init,
            max_len,
            cli.beam_size,
            &source.control,
            cli.temperature,
            on_progress,
        )?
    } else {
        eprintln!("Generating {} events...", max_len);
        decoder.generate(
            &init,
            max_len,
            &source.control,
            seed_events.as_deref(),
            cli.greedy_ratio,
            cli.temperature,
            &mut rng,
            on_progress,
        )?
    };

    write_outputs(&cli.output_dir, &outputs)
}

/// Writes one sequentially numbered MIDI file per batch element.
///
/// The output directory is created if absent; each line reports the file
/// path and its note count.
pub fn write_outputs(output_dir: &Path, outputs: &[Vec<i64>]) -> Result<()> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        GenError::with_source(
            ErrorCode::OutputWriteFailed,
            format!("failed to create {}", output_dir.display()),
            e,
        )
    })?;

    for (i, events) in outputs.iter().enumerate() {
        let path = output_dir.join(format!("output-{:03}.mid", i));
        let notes = write_midi_file(events, &path)?;
        eprintln!("===> {} ({} notes)", path.display(), notes);
    }

    Ok(())
}

/// Checkpoint directory after applying CLI and environment overrides.
/// The CLI option wins over the environment, which wins over the
/// platform default.
fn effective_model_dir(cli: &Cli, runtime: &RuntimeConfig) -> PathBuf {
    if cli.model_dir.is_some() {
        cli.model_directory()
    } else if let Some(ref path) = runtime.model_path {
        path.clone()
    } else {
        cli.model_directory()
    }
}

/// Prints the run banner, marking the inactive strategy's knob DISABLED.
fn print_banner(cli: &Cli, model_dir: &Path, max_len: usize, controls: &str) {
    let separator = "-".repeat(70);
    eprintln!("{}", separator);
    eprintln!("Checkpoint: {}", model_dir.display());
    eprintln!("Batch size: {}", cli.batch_size);
    eprintln!("Max length: {}", max_len);
    eprintln!("Greedy ratio: {}", greedy_display(cli));
    eprintln!("Beam size: {}", beam_display(cli));
    eprintln!("Output directory: {}", cli.output_dir.display());
    eprintln!("Controls: {}", controls);
    eprintln!("Temperature: {}", cli.temperature);
    eprintln!("Init zero: {}", cli.init_zero);
    match &cli.input_midi {
        Some(path) => eprintln!("Seed MIDI: {}", path.display()),
        None => eprintln!("Seed MIDI: NONE"),
    }
    match &cli.stats_file {
        Some(path) => eprintln!("Quantization: {}", path.display()),
        None => eprintln!("Quantization: DISABLED"),
    }
    eprintln!("{}", separator);
}

fn greedy_display(cli: &Cli) -> String {
    if cli.use_beam_search() {
        "DISABLED".to_string()
    } else {
        cli.greedy_ratio.to_string()
    }
}

fn beam_display(cli: &Cli) -> String {
    if cli.use_beam_search() {
        cli.beam_size.to_string()
    } else {
        "DISABLED".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::event::Event;
    use tempfile::tempdir;

    fn base_cli() -> Cli {
        Cli {
            control: None,
            batch_size: 2,
            model_dir: None,
            output_dir: PathBuf::from("output/"),
            max_len: 10,
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
    fn inactive_strategy_knob_is_disabled() {
        let sampling = base_cli();
        assert_eq!(greedy_display(&sampling), "1");
        assert_eq!(beam_display(&sampling), "DISABLED");

        let beam = Cli {
            beam_size: 5,
            ..base_cli()
        };
        assert_eq!(greedy_display(&beam), "DISABLED");
        assert_eq!(beam_display(&beam), "5");
    }

    #[test]
    fn cli_model_dir_wins_over_env() {
        let cli = Cli {
            model_dir: Some(PathBuf::from("/cli/ckpt")),
            ..base_cli()
        };
        let runtime = RuntimeConfig {
            model_path: Some(PathBuf::from("/env/ckpt")),
            ..RuntimeConfig::default()
        };
        assert_eq!(effective_model_dir(&cli, &runtime), PathBuf::from("/cli/ckpt"));

        let cli = base_cli();
        assert_eq!(effective_model_dir(&cli, &runtime), PathBuf::from("/env/ckpt"));
    }

    #[test]
    fn write_outputs_numbers_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("generated");
        let sequence = vec![
            Event::NoteOn { pitch: 60 }.to_index() as i64,
            Event::TimeShift { bin: 9 }.to_index() as i64,
            Event::NoteOff { pitch: 60 }.to_index() as i64,
        ];
        write_outputs(&out, &[sequence.clone(), sequence]).unwrap();

        assert!(out.join("output-000.mid").exists());
        assert!(out.join("output-001.mid").exists());
    }

    #[test]
    fn write_outputs_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("a").join("b");
        write_outputs(&out, &[]).unwrap();
        assert!(out.exists());
    }
}
