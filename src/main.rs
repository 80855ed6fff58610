// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use sfzsynth::config::{EngineConfig, PersistedState};
use sfzsynth::instrument::InstrumentLoader;
use sfzsynth::processor::{Controls, Processor};
use sfzsynth::render::{read_midi_file, render_to_wav};
use sfzsynth::samples::{FilePool, Oversampling, DEFAULT_PRELOAD_SIZE};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic SFZ sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renders a MIDI file through an instrument into a WAV file.
    Render {
        /// The path to the SFZ instrument.
        instrument: PathBuf,
        /// The path to the standard MIDI file to play.
        midi: PathBuf,
        /// Where to write the rendered stereo WAV file.
        output: PathBuf,
        /// The path to an engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// How long to keep rendering after the last event, e.g. 2s or 500ms.
        #[arg(short, long, default_value = "2s")]
        tail: String,
        /// Saved engine state to start from. Its instrument is replaced by the one given.
        #[arg(short, long)]
        state: Option<PathBuf>,
        /// Saves the engine state here after rendering.
        #[arg(long)]
        save_state: Option<PathBuf>,
    },
    /// Loads an instrument and prints what was found in it.
    Inspect {
        /// The path to the SFZ instrument.
        instrument: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            instrument,
            midi,
            output,
            config,
            tail,
            state,
            save_state,
        } => {
            let config = match config {
                Some(path) => EngineConfig::deserialize(&path)?,
                None => EngineConfig::default(),
            }
            .with_instrument(&instrument);
            let tail: Duration = DurationString::from_string(tail)?.into();

            let mut controls = match state {
                Some(path) => Controls::from(&PersistedState::deserialize(&path)?),
                None => Controls::from_config(&config)?,
            };
            controls.instrument = Some(Arc::from(instrument.as_path()));
            controls.volume = config.volume();
            controls.freewheeling = true;

            let mut processor = Processor::new(&config)?;
            let diagnostics = processor.diagnostics();
            if let Some(error) = diagnostics.last_error {
                return Err(error.into());
            }

            let events = read_midi_file(&midi, config.sample_rate())?;
            let tail_frames = (tail.as_secs_f64() * config.sample_rate() as f64).round() as usize;
            let frames = render_to_wav(&mut processor, &controls, &events, tail_frames, &output)?;
            println!(
                "Rendered {} events into {} ({:.2}s).",
                events.len(),
                output.display(),
                frames as f64 / config.sample_rate() as f64
            );

            if let Some(path) = save_state {
                processor.state().save(&path)?;
            }
        }
        Commands::Inspect { instrument } => {
            let mut loader =
                InstrumentLoader::new(FilePool::new(DEFAULT_PRELOAD_SIZE, Oversampling::X1));
            let loaded = loader.load_file(&instrument)?;

            println!("{}:", instrument.display());
            println!("- Regions: {}", loaded.num_regions());
            println!("- Masters: {}", loaded.num_masters());
            println!("- Groups: {}", loaded.num_groups());
            println!("- Sample memory: {} bytes", loader.memory_usage());

            if !loaded.unknown_opcodes().is_empty() {
                println!("\nUnknown opcodes (count: {}):", loaded.unknown_opcodes().len());
                for opcode in loaded.unknown_opcodes() {
                    println!("- {}", opcode);
                }
            }
            if !loaded.missing_samples().is_empty() {
                println!("\nMissing samples (count: {}):", loaded.missing_samples().len());
                for sample in loaded.missing_samples() {
                    println!("- {}", sample);
                }
            }
        }
    }

    Ok(())
}
