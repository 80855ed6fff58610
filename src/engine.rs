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

//! The polyphonic render engine.
//!
//! The synth owns the current instrument and a fixed voice pool. Rendering never
//! allocates, never blocks and never touches the filesystem: anything expensive is built
//! elsewhere and swapped in whole through the setters below.

use std::mem;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::instrument::Instrument;
use crate::opcode::db_to_gain;
use crate::region::Trigger;
use crate::samples::{Oversampling, DEFAULT_PRELOAD_SIZE};

mod events;
mod midi_state;
mod voice;

pub use events::{Event, EventKind};
pub use midi_state::{MidiState, SUSTAIN_CC};
pub use voice::Voice;

use voice::VoiceStart;

/// The largest voice pool the synth accepts.
pub const MAX_VOICES: usize = 256;

/// The voice pool size used when nothing else is configured.
pub const DEFAULT_VOICES: usize = 64;

/// The largest number of frames rendered in one call.
pub const MAX_BLOCK_SIZE: usize = 8192;

pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Slots for stolen voices while they fade out.
const STOLEN_VOICE_SLOTS: usize = 16;

const ALL_SOUND_OFF_CC: u8 = 120;
const ALL_NOTES_OFF_CC: u8 = 123;

/// Builds a fresh voice pool, clamped to the supported size.
pub fn voice_pool(num_voices: usize) -> Vec<Voice> {
    vec![Voice::default(); num_voices.clamp(1, MAX_VOICES)]
}

/// A polyphonic sampler.
pub struct Synth {
    instrument: Box<Instrument>,
    voices: Vec<Voice>,
    /// Stolen voices finishing their fadeout. Not part of the pool.
    fading: Vec<Voice>,
    midi: MidiState,
    rng: StdRng,

    sample_rate: f32,
    samples_per_block: usize,
    /// Scratch space for envelope values, one block long.
    envelope_buffer: Vec<f32>,

    preload_size: u32,
    oversampling: Oversampling,
    freewheeling: bool,
    /// Master volume in dB.
    volume: f32,
    next_age: u64,
}

impl Default for Synth {
    fn default() -> Self {
        Synth::new(DEFAULT_SAMPLE_RATE, DEFAULT_BLOCK_SIZE, DEFAULT_VOICES)
    }
}

impl Synth {
    pub fn new(sample_rate: f32, samples_per_block: usize, num_voices: usize) -> Synth {
        Synth::with_rng(
            sample_rate,
            samples_per_block,
            num_voices,
            StdRng::from_entropy(),
        )
    }

    /// Creates a synth whose random region selection is reproducible.
    pub fn with_seed(
        sample_rate: f32,
        samples_per_block: usize,
        num_voices: usize,
        seed: u64,
    ) -> Synth {
        Synth::with_rng(
            sample_rate,
            samples_per_block,
            num_voices,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        sample_rate: f32,
        samples_per_block: usize,
        num_voices: usize,
        rng: StdRng,
    ) -> Synth {
        let samples_per_block = samples_per_block.clamp(1, MAX_BLOCK_SIZE);
        Synth {
            instrument: Box::new(Instrument::empty()),
            voices: voice_pool(num_voices),
            fading: vec![Voice::default(); STOLEN_VOICE_SLOTS],
            midi: MidiState::default(),
            rng,
            sample_rate,
            samples_per_block,
            envelope_buffer: vec![0.0; samples_per_block],
            preload_size: DEFAULT_PRELOAD_SIZE,
            oversampling: Oversampling::default(),
            freewheeling: false,
            volume: 0.0,
            next_age: 0,
        }
    }

    /// Renders one block. `left` and `right` are overwritten. Events must be sorted by time;
    /// times that go backwards are treated as the previous event's time and times past the
    /// block are applied on its last frame.
    pub fn render(&mut self, events: &[Event], left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        left.fill(0.0);
        right.fill(0.0);

        let mut position = 0;
        for event in events {
            let time = event.time.clamp(position, frames.saturating_sub(1).max(position));
            if time > position {
                self.render_voices(&mut left[position..time], &mut right[position..time]);
                position = time;
            }
            self.handle_event(event.kind);
        }
        if position < frames {
            self.render_voices(&mut left[position..frames], &mut right[position..frames]);
        }

        if self.volume != 0.0 {
            let gain = db_to_gain(self.volume);
            left[..frames].iter_mut().for_each(|sample| *sample *= gain);
            right[..frames].iter_mut().for_each(|sample| *sample *= gain);
        }
    }

    fn render_voices(&mut self, left: &mut [f32], right: &mut [f32]) {
        let bend = self.midi.pitch_bend();
        let chunk = self.envelope_buffer.len();

        let voices = self.voices.iter_mut().chain(self.fading.iter_mut());
        for voice in voices.filter(|voice| !voice.is_free()) {
            let Some(sample) = self.instrument.sample(voice.region()) else {
                voice.stop();
                continue;
            };
            let cents = self.instrument.regions()[voice.region()].bend_cents(bend);
            let bend_ratio = 2f64.powf(cents as f64 / 1200.0);

            for (left, right) in left.chunks_mut(chunk).zip(right.chunks_mut(chunk)) {
                voice.render(sample, bend_ratio, left, right, &mut self.envelope_buffer);
                if voice.is_free() {
                    break;
                }
            }
        }
    }

    fn handle_event(&mut self, event: EventKind) {
        match event {
            EventKind::NoteOn { key, velocity } => self.note_on(key, velocity),
            EventKind::NoteOff { key, .. } => self.note_off(key),
            EventKind::ControlChange { controller, value } => {
                self.control_change(controller, value)
            }
            EventKind::PitchBend(bend) => self.midi.set_pitch_bend(bend),
        }
    }

    fn note_on(&mut self, key: u8, velocity: u8) {
        self.midi.note_on(key, velocity);
        let held = self.midi.held_count();
        let rand: f32 = self.rng.gen();

        for index in 0..self.instrument.num_regions() {
            let region = &self.instrument.regions()[index];
            let triggered = match region.trigger() {
                Trigger::Attack => true,
                Trigger::First => held == 1,
                Trigger::Legato => held > 1,
                Trigger::Release => false,
            };
            if triggered && region.matches(key, velocity, self.midi.controllers(), rand) {
                self.start_voice(index, key, velocity);
            }
        }
    }

    fn note_off(&mut self, key: u8) {
        self.midi.note_off(key);
        let sustained = self.midi.is_sustain_down();

        for voice in self.voices.iter_mut() {
            if voice.is_free()
                || voice.key() != key
                || voice.trigger() == Trigger::Release
                || voice.is_released()
            {
                continue;
            }
            if sustained {
                voice.defer_release();
            } else {
                voice.release();
            }
        }

        let velocity = self.midi.note_velocity(key);
        let rand: f32 = self.rng.gen();
        for index in 0..self.instrument.num_regions() {
            let region = &self.instrument.regions()[index];
            if region.trigger() == Trigger::Release
                && region.matches(key, velocity, self.midi.controllers(), rand)
            {
                self.start_voice(index, key, velocity);
            }
        }
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        self.midi.set_controller(controller, value);
        match controller {
            SUSTAIN_CC if value < 64 => {
                for voice in self.voices.iter_mut() {
                    if voice.is_sustained() && !self.midi.is_held(voice.key()) {
                        voice.release();
                    }
                }
            }
            ALL_SOUND_OFF_CC => self.all_sound_off(),
            ALL_NOTES_OFF_CC => {
                self.midi.reset_notes();
                self.voices
                    .iter_mut()
                    .filter(|voice| !voice.is_free())
                    .for_each(Voice::release);
            }
            _ => {}
        }
    }

    fn start_voice(&mut self, region_index: usize, key: u8, velocity: u8) {
        let Some(sample) = self.instrument.sample(region_index) else {
            return;
        };
        let regions = self.instrument.regions();
        let region = &regions[region_index];

        let group = region.group();
        for voice in self.voices.iter_mut().filter(|voice| !voice.is_free()) {
            if regions[voice.region()].off_by() == Some(group) && !voice.is_released() {
                voice.choke();
            }
        }

        let Some(slot) = find_voice(&self.voices) else {
            return;
        };
        if !self.voices[slot].is_free() {
            steal(&mut self.voices[slot], &mut self.fading);
        }
        self.voices[slot].start(VoiceStart {
            region_index,
            region,
            sample,
            key,
            velocity,
            sample_rate: self.sample_rate,
            age: self.next_age,
        });
        self.next_age += 1;
    }

    /// Stops every voice immediately.
    pub fn all_sound_off(&mut self) {
        self.voices.iter_mut().for_each(Voice::stop);
        self.fading.iter_mut().for_each(Voice::stop);
        self.midi.reset_notes();
    }

    /// Installs a new instrument and returns the old one so it can be dropped elsewhere.
    /// Voices playing the old instrument are stopped.
    pub fn set_instrument(&mut self, instrument: Box<Instrument>) -> Box<Instrument> {
        self.voices.iter_mut().for_each(Voice::stop);
        self.fading.iter_mut().for_each(Voice::stop);
        mem::replace(&mut self.instrument, instrument)
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Installs a new voice pool and returns the old one. Playing voices carry over,
    /// newest first, as far as the new pool has room.
    pub fn set_voices(&mut self, mut voices: Vec<Voice>) -> Vec<Voice> {
        voices.iter_mut().for_each(Voice::stop);
        self.voices.sort_unstable_by(|a, b| {
            a.is_free()
                .cmp(&b.is_free())
                .then_with(|| b.age().cmp(&a.age()))
        });
        for (slot, voice) in voices
            .iter_mut()
            .zip(self.voices.iter().filter(|voice| !voice.is_free()))
        {
            slot.clone_from(voice);
        }
        mem::replace(&mut self.voices, voices)
    }

    /// Resizes the voice pool in place. This allocates, so it is meant for setup.
    pub fn set_num_voices(&mut self, num_voices: usize) {
        self.set_voices(voice_pool(num_voices));
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    /// Voices playing in the pool. Stolen voices that are still fading out are not counted.
    pub fn num_active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| !voice.is_free()).count()
    }

    /// Changes the output sample rate. Playing voices are stopped.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        debug!(sample_rate, "Sample rate changed");
        self.all_sound_off();
        self.sample_rate = sample_rate;
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Sets the largest block size passed to render. This allocates, so it is meant for setup.
    pub fn set_samples_per_block(&mut self, samples_per_block: usize) {
        self.samples_per_block = samples_per_block.clamp(1, MAX_BLOCK_SIZE);
        self.envelope_buffer.resize(self.samples_per_block, 0.0);
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    /// Records the decode step the worker's loader applies to files loaded from now on.
    /// Rendering does not depend on it; the synth keeps it so hosts can compare it with the
    /// value they asked for.
    pub fn set_preload_size(&mut self, preload_size: u32) {
        self.preload_size = preload_size;
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size
    }

    /// Records the oversampling factor the current instrument was loaded with.
    pub fn set_oversampling_factor(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }

    pub fn oversampling_factor(&self) -> Oversampling {
        self.oversampling
    }

    pub fn enable_freewheeling(&mut self) {
        self.freewheeling = true;
    }

    pub fn disable_freewheeling(&mut self) {
        self.freewheeling = false;
    }

    /// True when rendering runs offline without real-time constraints.
    pub fn is_freewheeling(&self) -> bool {
        self.freewheeling
    }

    /// Sets the master volume in dB.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(-144.0, 6.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn num_regions(&self) -> usize {
        self.instrument.num_regions()
    }

    pub fn num_masters(&self) -> usize {
        self.instrument.num_masters()
    }

    pub fn num_groups(&self) -> usize {
        self.instrument.num_groups()
    }

    pub fn unknown_opcodes(&self) -> &[String] {
        self.instrument.unknown_opcodes()
    }

    pub fn midi_state(&self) -> &MidiState {
        &self.midi
    }
}

/// Picks the slot for a new voice: a free one if possible, otherwise the oldest released
/// voice, otherwise the oldest voice.
fn find_voice(voices: &[Voice]) -> Option<usize> {
    if let Some(free) = voices.iter().position(Voice::is_free) {
        return Some(free);
    }
    let oldest = |released: bool| {
        voices
            .iter()
            .enumerate()
            .filter(|(_, voice)| !released || voice.is_released())
            .min_by_key(|(_, voice)| voice.age())
            .map(|(index, _)| index)
    };
    oldest(true).or_else(|| oldest(false))
}

/// Moves a stolen voice into a fading slot and starts its fadeout there, leaving the pool
/// slot free. When every fading slot is busy the oldest one is cut.
fn steal(voice: &mut Voice, fading: &mut [Voice]) {
    let slot = fading.iter().position(Voice::is_free).or_else(|| {
        fading
            .iter()
            .enumerate()
            .min_by_key(|(_, voice)| voice.age())
            .map(|(index, _)| index)
    });
    if let Some(slot) = slot {
        fading[slot].clone_from(voice);
        fading[slot].fade_out();
    }
    voice.stop();
}
