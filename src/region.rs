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

//! A region is one zone of an instrument: a sample plus the conditions that trigger it
//! and the parameters used to play it back.

use std::f32::consts::{FRAC_PI_4, SQRT_2};
use std::ops::RangeInclusive;

use tracing::debug;

use crate::envelope::EnvelopeSegments;
use crate::opcode::{db_to_gain, Opcode};

/// Default fadeout applied to voices choked with `off_mode=fast`, in seconds.
const FAST_OFF_TIME: f32 = 0.006;

/// What kind of note event starts a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    /// Starts on note-on.
    #[default]
    Attack,
    /// Starts on note-off.
    Release,
    /// Starts on note-on when no other note is held.
    First,
    /// Starts on note-on when another note is already held.
    Legato,
}

/// How a region's sample loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    /// Plays the whole sample and ignores note-off.
    OneShot,
    LoopContinuous,
    /// Loops until the release begins.
    LoopSustain,
}

/// How a voice reacts when choked by another group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffMode {
    #[default]
    Fast,
    Normal,
}

/// Amplitude envelope parameters as written in the instrument, in seconds and percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmpEnvelope {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub start: f32,
}

impl Default for AmpEnvelope {
    fn default() -> Self {
        AmpEnvelope {
            delay: 0.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.0,
            sustain: 100.0,
            release: 0.0,
            start: 0.0,
        }
    }
}

impl AmpEnvelope {
    /// Converts the envelope into sample counts at the given rate.
    pub fn segments(&self, sample_rate: f32) -> EnvelopeSegments {
        let samples = |seconds: f32| (seconds * sample_rate).round().max(0.0) as u32;
        EnvelopeSegments {
            delay: samples(self.delay),
            attack: samples(self.attack),
            hold: samples(self.hold),
            decay: samples(self.decay),
            sustain: self.sustain / 100.0,
            release: samples(self.release),
            start: self.start / 100.0,
        }
    }
}

/// A continuous controller condition (`loccN`/`hiccN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CcCondition {
    controller: u8,
    low: u8,
    high: u8,
}

/// One instrument zone.
#[derive(Debug, Clone)]
pub struct Region {
    opcodes: Vec<Opcode>,
    unknown_opcodes: Vec<String>,

    sample: String,
    offset: u32,
    end: Option<u32>,
    loop_mode: Option<LoopMode>,
    loop_start: u32,
    loop_end: Option<u32>,

    key_range: RangeInclusive<u8>,
    velocity_range: RangeInclusive<u8>,
    cc_conditions: Vec<CcCondition>,
    rand_low: f32,
    rand_high: f32,
    trigger: Trigger,

    group: u32,
    off_by: Option<u32>,
    off_mode: OffMode,

    pitch_keycenter: u8,
    pitch_keytrack: i32,
    transpose: i32,
    tune: i32,
    bend_up: i32,
    bend_down: i32,

    volume: f32,
    pan: f32,
    amp_veltrack: f32,
    amp_envelope: AmpEnvelope,
}

impl Default for Region {
    fn default() -> Self {
        Region {
            opcodes: Vec::new(),
            unknown_opcodes: Vec::new(),
            sample: String::new(),
            offset: 0,
            end: None,
            loop_mode: None,
            loop_start: 0,
            loop_end: None,
            key_range: 0..=127,
            velocity_range: 0..=127,
            cc_conditions: Vec::new(),
            rand_low: 0.0,
            rand_high: 1.0,
            trigger: Trigger::Attack,
            group: 0,
            off_by: None,
            off_mode: OffMode::Fast,
            pitch_keycenter: 60,
            pitch_keytrack: 100,
            transpose: 0,
            tune: 0,
            bend_up: 200,
            bend_down: -200,
            volume: 0.0,
            pan: 0.0,
            amp_veltrack: 100.0,
            amp_envelope: AmpEnvelope::default(),
        }
    }
}

impl Region {
    /// Builds a region from an ordered opcode list. Later opcodes override earlier ones.
    pub fn from_opcodes(opcodes: Vec<Opcode>) -> Region {
        let mut region = Region::default();
        for opcode in opcodes.iter() {
            if !region.apply(opcode) && !region.unknown_opcodes.contains(&opcode.name) {
                region.unknown_opcodes.push(opcode.name.clone());
            }
        }
        region.opcodes = opcodes;
        region
    }

    /// Applies a single opcode. Returns false if the opcode is not understood. Malformed
    /// values of known opcodes leave the current value untouched.
    fn apply(&mut self, opcode: &Opcode) -> bool {
        let applied = match (opcode.name.as_str(), opcode.parameter) {
            ("sample", None) => {
                let sample = opcode.value.trim().replace('\\', "/");
                let valid = !sample.is_empty();
                if valid {
                    self.sample = sample;
                }
                valid
            }
            ("offset", None) => set(&mut self.offset, opcode.read_int(0..=u32::MAX)),
            ("end", None) => set_some(&mut self.end, opcode.read_int(0..=u32::MAX)),
            ("loop_mode" | "loopmode", None) => {
                let mode = opcode.read_word().and_then(|word| match word.as_str() {
                    "no_loop" => Some(LoopMode::NoLoop),
                    "one_shot" => Some(LoopMode::OneShot),
                    "loop_continuous" => Some(LoopMode::LoopContinuous),
                    "loop_sustain" => Some(LoopMode::LoopSustain),
                    _ => None,
                });
                set_some(&mut self.loop_mode, mode)
            }
            ("loop_start" | "loopstart", None) => {
                set(&mut self.loop_start, opcode.read_int(0..=u32::MAX))
            }
            ("loop_end" | "loopend", None) => {
                set_some(&mut self.loop_end, opcode.read_int(0..=u32::MAX))
            }

            ("lokey", None) => match opcode.read_key() {
                Some(key) => {
                    self.key_range = key..=*self.key_range.end();
                    true
                }
                None => false,
            },
            ("hikey", None) => match opcode.read_key() {
                Some(key) => {
                    self.key_range = *self.key_range.start()..=key;
                    true
                }
                None => false,
            },
            ("key", None) => match opcode.read_key() {
                Some(key) => {
                    self.key_range = key..=key;
                    self.pitch_keycenter = key;
                    true
                }
                None => false,
            },
            ("lovel", None) => match opcode.read_int(0..=127u8) {
                Some(velocity) => {
                    self.velocity_range = velocity..=*self.velocity_range.end();
                    true
                }
                None => false,
            },
            ("hivel", None) => match opcode.read_int(0..=127u8) {
                Some(velocity) => {
                    self.velocity_range = *self.velocity_range.start()..=velocity;
                    true
                }
                None => false,
            },
            ("locc" | "hicc", Some(controller)) => {
                let (Ok(controller), Some(value)) =
                    (u8::try_from(controller), opcode.read_int(0..=127u8))
                else {
                    return false;
                };
                if controller > 127 {
                    return false;
                }
                let condition = self.cc_condition(controller);
                if opcode.name == "locc" {
                    condition.low = value;
                } else {
                    condition.high = value;
                }
                true
            }
            ("lorand", None) => set(&mut self.rand_low, opcode.read_float(0.0..=1.0)),
            ("hirand", None) => set(&mut self.rand_high, opcode.read_float(0.0..=1.0)),
            ("trigger", None) => {
                let trigger = opcode.read_word().and_then(|word| match word.as_str() {
                    "attack" => Some(Trigger::Attack),
                    "release" => Some(Trigger::Release),
                    "first" => Some(Trigger::First),
                    "legato" => Some(Trigger::Legato),
                    _ => None,
                });
                set(&mut self.trigger, trigger)
            }

            ("group", None) => set(&mut self.group, opcode.read_int(0..=u32::MAX)),
            ("off_by", None) => set_some(&mut self.off_by, opcode.read_int(0..=u32::MAX)),
            ("off_mode", None) => {
                let mode = opcode.read_word().and_then(|word| match word.as_str() {
                    "fast" => Some(OffMode::Fast),
                    "normal" => Some(OffMode::Normal),
                    _ => None,
                });
                set(&mut self.off_mode, mode)
            }

            ("pitch_keycenter", None) => set(&mut self.pitch_keycenter, opcode.read_key()),
            ("pitch_keytrack", None) => {
                set(&mut self.pitch_keytrack, opcode.read_int(-1200..=1200i32))
            }
            ("transpose", None) => set(&mut self.transpose, opcode.read_int(-127..=127i32)),
            ("tune" | "pitch", None) => set(&mut self.tune, opcode.read_int(-9600..=9600i32)),
            ("bend_up", None) => set(&mut self.bend_up, opcode.read_int(-9600..=9600i32)),
            ("bend_down", None) => set(&mut self.bend_down, opcode.read_int(-9600..=9600i32)),

            ("volume", None) => set(&mut self.volume, opcode.read_float(-144.0..=6.0)),
            ("pan", None) => set(&mut self.pan, opcode.read_float(-100.0..=100.0)),
            ("amp_veltrack", None) => {
                set(&mut self.amp_veltrack, opcode.read_float(-100.0..=100.0))
            }
            ("ampeg_delay", None) => set(
                &mut self.amp_envelope.delay,
                opcode.read_float(0.0..=100.0),
            ),
            ("ampeg_attack", None) => set(
                &mut self.amp_envelope.attack,
                opcode.read_float(0.0..=100.0),
            ),
            ("ampeg_hold", None) => {
                set(&mut self.amp_envelope.hold, opcode.read_float(0.0..=100.0))
            }
            ("ampeg_decay", None) => set(
                &mut self.amp_envelope.decay,
                opcode.read_float(0.0..=100.0),
            ),
            ("ampeg_sustain", None) => set(
                &mut self.amp_envelope.sustain,
                opcode.read_float(0.0..=100.0),
            ),
            ("ampeg_release", None) => set(
                &mut self.amp_envelope.release,
                opcode.read_float(0.0..=100.0),
            ),
            ("ampeg_start", None) => set(
                &mut self.amp_envelope.start,
                opcode.read_float(0.0..=100.0),
            ),
            _ => return false,
        };

        if !applied {
            debug!(opcode = %opcode, "Ignoring malformed opcode value");
        }
        true
    }

    fn cc_condition(&mut self, controller: u8) -> &mut CcCondition {
        let index = match self
            .cc_conditions
            .iter()
            .position(|condition| condition.controller == controller)
        {
            Some(index) => index,
            None => {
                self.cc_conditions.push(CcCondition {
                    controller,
                    low: 0,
                    high: 127,
                });
                self.cc_conditions.len() - 1
            }
        };
        &mut self.cc_conditions[index]
    }

    /// The opcodes this region was built from, in order.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Names of opcodes this region did not understand.
    pub fn unknown_opcodes(&self) -> &[String] {
        &self.unknown_opcodes
    }

    /// The sample path as written, with backslashes normalized.
    pub fn sample(&self) -> &str {
        &self.sample
    }

    pub fn key_range(&self) -> &RangeInclusive<u8> {
        &self.key_range
    }

    pub fn velocity_range(&self) -> &RangeInclusive<u8> {
        &self.velocity_range
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn off_by(&self) -> Option<u32> {
        self.off_by
    }

    pub fn off_mode(&self) -> OffMode {
        self.off_mode
    }

    /// The fadeout length used when this region is choked with `off_mode=fast`.
    pub fn fast_off_samples(&self, sample_rate: f32) -> u32 {
        (FAST_OFF_TIME * sample_rate).round().max(1.0) as u32
    }

    /// The loop mode, falling back to no loop when none was given.
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode.unwrap_or_default()
    }

    /// The first frame to play.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// One past the last frame to play, limited to the sample length.
    pub fn end_frame(&self, sample_frames: usize) -> usize {
        match self.end {
            Some(end) => (end as usize).saturating_add(1).min(sample_frames),
            None => sample_frames,
        }
    }

    /// The half-open loop range in frames, or `None` if the loop points are unusable.
    pub fn loop_range(&self, sample_frames: usize) -> Option<(usize, usize)> {
        let end = match self.loop_end {
            Some(loop_end) => (loop_end as usize).saturating_add(1).min(sample_frames),
            None => sample_frames,
        };
        let start = self.loop_start as usize;
        (start < end).then_some((start, end))
    }

    /// Whether a note with the given parameters falls inside this region's trigger conditions.
    pub fn matches(&self, key: u8, velocity: u8, controllers: &[u8; 128], rand: f32) -> bool {
        self.key_range.contains(&key)
            && self.velocity_range.contains(&velocity)
            && self.cc_conditions.iter().all(|condition| {
                (condition.low..=condition.high).contains(&controllers[condition.controller as usize])
            })
            && rand >= self.rand_low
            && (rand < self.rand_high || self.rand_high >= 1.0)
    }

    /// Pitch offset from the sample's recorded pitch, in semitones.
    pub fn pitch_semitones(&self, key: u8) -> f32 {
        let key_offset = key as i32 - self.pitch_keycenter as i32;
        (key_offset * self.pitch_keytrack) as f32 / 100.0
            + self.transpose as f32
            + self.tune as f32 / 100.0
    }

    /// Pitch offset for a centered 14-bit bend value, in cents.
    pub fn bend_cents(&self, bend: i16) -> f32 {
        if bend >= 0 {
            bend as f32 / 8191.0 * self.bend_up as f32
        } else {
            -(bend as f32) / 8192.0 * self.bend_down as f32
        }
    }

    /// Linear gain from volume and velocity tracking.
    pub fn gain(&self, velocity: u8) -> f32 {
        let tracking = self.amp_veltrack / 100.0;
        let curve = (velocity as f32 / 127.0).powi(2);
        let velocity_gain = if tracking >= 0.0 {
            1.0 - tracking + tracking * curve
        } else {
            1.0 + tracking * curve
        };
        db_to_gain(self.volume) * velocity_gain
    }

    /// Constant-power left and right gains for the region's pan. Center is unity on both sides.
    pub fn pan_gains(&self) -> (f32, f32) {
        let angle = (self.pan / 100.0 + 1.0) * FRAC_PI_4;
        (angle.cos() * SQRT_2, angle.sin() * SQRT_2)
    }

    pub fn amp_envelope(&self) -> &AmpEnvelope {
        &self.amp_envelope
    }
}

fn set<T>(field: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *field = value;
            true
        }
        None => false,
    }
}

fn set_some<T>(field: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *field = Some(value);
            true
        }
        None => false,
    }
}
