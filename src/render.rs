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

//! Offline rendering of standard MIDI files.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use midly::{Format, MetaMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, info};

use crate::engine::{Event, EventKind};
use crate::processor::{Controls, Processor};

/// Microseconds per quarter note until the first tempo event.
const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid MIDI file {path}: {source}")]
    Midi {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },

    #[error("Unable to write {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// A track event at an absolute tick, ordered by tick then by track.
struct TimedKind {
    tick: u64,
    track: usize,
    kind: TimedEvent,
}

enum TimedEvent {
    Tempo(u32),
    Synth(EventKind),
}

/// Reads a MIDI file and returns its events timed in frames at the given sample rate. Tracks
/// of a sequential file play one after another; otherwise all tracks and channels are merged.
pub fn read_midi_file(path: &Path, sample_rate: u32) -> Result<Vec<Event>, RenderError> {
    let data = fs::read(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let smf = Smf::parse(&data).map_err(|source| RenderError::Midi {
        path: path.to_path_buf(),
        source,
    })?;

    let sequential = smf.header.format == Format::Sequential;
    let mut timed = Vec::new();
    let mut track_start = 0u64;
    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick = track_start;
        for event in track {
            tick += event.delta.as_int() as u64;
            let kind = match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => TimedEvent::Tempo(tempo.as_int()),
                TrackEventKind::Midi { message, .. } => match EventKind::from_midi_message(message) {
                    Some(kind) => TimedEvent::Synth(kind),
                    None => continue,
                },
                _ => continue,
            };
            timed.push(TimedKind {
                tick,
                track: track_index,
                kind,
            });
        }
        if sequential {
            track_start = track
                .iter()
                .fold(track_start, |end, event| end + event.delta.as_int() as u64);
        }
    }
    timed.sort_by_key(|event| (event.tick, event.track));

    let sample_rate = sample_rate as f64;
    let mut events = Vec::with_capacity(timed.len());
    let mut tempo = DEFAULT_TEMPO;
    let mut last_tick = 0u64;
    let mut seconds = 0.0f64;
    for event in timed {
        seconds += (event.tick - last_tick) as f64 * seconds_per_tick(smf.header.timing, tempo);
        last_tick = event.tick;
        match event.kind {
            TimedEvent::Tempo(value) => tempo = value,
            TimedEvent::Synth(kind) => {
                events.push(Event::new((seconds * sample_rate).round() as usize, kind))
            }
        }
    }

    debug!(path = ?path, events = events.len(), "Read MIDI file");
    Ok(events)
}

fn seconds_per_tick(timing: Timing, tempo: u32) -> f64 {
    match timing {
        Timing::Metrical(ticks_per_beat) => {
            tempo as f64 / 1_000_000.0 / ticks_per_beat.as_int().max(1) as f64
        }
        Timing::Timecode(fps, subframes) => 1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
    }
}

/// Renders the events through the processor into a stereo 32-bit float WAV file. Rendering
/// continues for `tail_frames` after the last event. Returns the number of frames written.
pub fn render_to_wav(
    processor: &mut Processor,
    controls: &Controls,
    events: &[Event],
    tail_frames: usize,
    output: &Path,
) -> Result<usize, RenderError> {
    let wav_error = |source| RenderError::Wav {
        path: output.to_path_buf(),
        source,
    };
    let synth = processor.synth();
    let block = synth.samples_per_block();
    let spec = WavSpec {
        channels: 2,
        sample_rate: synth.sample_rate() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(output, spec).map_err(wav_error)?;

    let total = events.last().map_or(0, |event| event.time + 1) + tail_frames;
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut block_events = Vec::new();
    let mut next_event = 0;
    let mut start = 0;

    while start < total {
        let frames = block.min(total - start);
        let end = start + frames;

        block_events.clear();
        while next_event < events.len() && events[next_event].time < end {
            let event = events[next_event];
            block_events.push(Event::new(event.time.saturating_sub(start), event.kind));
            next_event += 1;
        }

        processor.process(
            controls,
            &block_events,
            &mut left[..frames],
            &mut right[..frames],
        );
        for (l, r) in left[..frames].iter().zip(&right[..frames]) {
            writer.write_sample(*l).map_err(wav_error)?;
            writer.write_sample(*r).map_err(wav_error)?;
        }
        start = end;
    }

    writer.finalize().map_err(wav_error)?;
    info!(path = ?output, frames = total, "Rendered");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use hound::WavReader;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Format, Header, MidiMessage, TrackEvent};
    use tempfile::tempdir;

    use super::*;
    use crate::config::EngineConfig;
    use crate::testutil::{write_sfz, write_wav};

    fn midi_event(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        midi_event(
            delta,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        )
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        midi_event(
            delta,
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        )
    }

    fn save(path: &Path, tracks: Vec<Vec<TrackEvent<'static>>>) -> Result<(), Box<dyn Error>> {
        let format = if tracks.len() == 1 {
            Format::SingleTrack
        } else {
            Format::Parallel
        };
        save_as(path, format, tracks)
    }

    fn save_as(
        path: &Path,
        format: Format,
        tracks: Vec<Vec<TrackEvent<'static>>>,
    ) -> Result<(), Box<dyn Error>> {
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::new(480))),
            tracks,
        };
        smf.save(path)?;
        Ok(())
    }

    #[test]
    fn test_reads_tempo_and_merges_tracks() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("song.mid");
        save(
            &path,
            vec![
                vec![
                    TrackEvent {
                        delta: u28::new(0),
                        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000))),
                    },
                    end_of_track(),
                ],
                vec![note_on(480, 60), note_off(480, 60), end_of_track()],
                vec![note_on(240, 64), end_of_track()],
            ],
        )?;

        // One beat is a second at this tempo.
        let events = read_midi_file(&path, 1000)?;
        let times: Vec<(usize, EventKind)> =
            events.iter().map(|event| (event.time, event.kind)).collect();
        assert_eq!(
            times,
            vec![
                (
                    500,
                    EventKind::NoteOn {
                        key: 64,
                        velocity: 100
                    }
                ),
                (
                    1000,
                    EventKind::NoteOn {
                        key: 60,
                        velocity: 100
                    }
                ),
                (
                    2000,
                    EventKind::NoteOff {
                        key: 60,
                        velocity: 0
                    }
                ),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_sequential_tracks_play_in_order() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("song.mid");
        save_as(
            &path,
            Format::Sequential,
            vec![
                vec![note_on(0, 60), note_off(480, 60), end_of_track()],
                vec![note_on(240, 64), end_of_track()],
            ],
        )?;

        // Half a second per beat at the default tempo.
        let events = read_midi_file(&path, 1000)?;
        let times: Vec<(usize, EventKind)> =
            events.iter().map(|event| (event.time, event.kind)).collect();
        assert_eq!(
            times,
            vec![
                (
                    0,
                    EventKind::NoteOn {
                        key: 60,
                        velocity: 100
                    }
                ),
                (
                    500,
                    EventKind::NoteOff {
                        key: 60,
                        velocity: 0
                    }
                ),
                (
                    750,
                    EventKind::NoteOn {
                        key: 64,
                        velocity: 100
                    }
                ),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_default_tempo() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("song.mid");
        save(&path, vec![vec![note_on(960, 60), end_of_track()]])?;

        let events = read_midi_file(&path, 48000)?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 48000);
        Ok(())
    }

    #[test]
    fn test_invalid_midi_file() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("song.mid");
        fs::write(&path, b"not midi")?;
        assert!(matches!(
            read_midi_file(&path, 48000),
            Err(RenderError::Midi { .. })
        ));
        assert!(matches!(
            read_midi_file(&dir.path().join("missing.mid"), 48000),
            Err(RenderError::Io { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_render_to_wav() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        write_wav(&dir.path().join("a.wav"), &[vec![0.5f32; 48000]], 48000)?;
        let instrument = write_sfz(dir.path(), "a.sfz", "<region> sample=a.wav amp_veltrack=0\n");
        let config = EngineConfig::default().with_instrument(&instrument);
        let mut processor = Processor::new(&config)?;
        let mut controls = Controls::from_config(&config)?;
        controls.freewheeling = true;

        let events = vec![
            Event::new(
                100,
                EventKind::NoteOn {
                    key: 60,
                    velocity: 100,
                },
            ),
            Event::new(
                2000,
                EventKind::NoteOff {
                    key: 60,
                    velocity: 0,
                },
            ),
        ];
        let output = dir.path().join("out.wav");
        let frames = render_to_wav(&mut processor, &controls, &events, 500, &output)?;
        assert_eq!(frames, 2501);

        let mut reader = WavReader::open(&output)?;
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.duration(), 2501);
        let samples: Vec<f32> = reader.samples::<f32>().collect::<Result<_, _>>()?;
        assert_eq!(samples[2 * 99], 0.0);
        assert!((samples[2 * 100] - 0.5).abs() < 1e-3);
        assert!((samples[2 * 1999 + 1] - 0.5).abs() < 1e-3);
        assert_eq!(samples[2 * 2000], 0.0);
        Ok(())
    }
}
