//! perfrnn: Performance RNN symbolic music generation CLI.
//!
//! Parses options, resolves the control argument, loads a checkpoint,
//! generates a batch of event sequences, and writes them as MIDI files.

use perfrnn::cli::Cli;
use perfrnn::config::RuntimeConfig;
use perfrnn::error::Result;
use perfrnn::generation::run_generation;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let runtime = RuntimeConfig::from_env();
    if let Some(problem) = runtime.validate() {
        eprintln!("Warning: ignoring invalid runtime config: {}", problem);
    }

    run_generation(&cli, &runtime)
}
