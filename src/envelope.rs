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

//! Delay/attack/hold/decay/sustain/release envelope generator.
//!
//! The attack is a linear ramp to 1. Decay and release are exponential: each segment
//! multiplies the current value by a constant rate chosen so that the target is reached
//! after the configured number of samples. Release aims at [`VIRTUALLY_ZERO`] and then
//! drops to exactly 0.

/// The level treated as silence by the release and decay segments.
pub const VIRTUALLY_ZERO: f32 = 0.00005;

/// The current phase of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    #[default]
    Idle,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Fadeout,
    Done,
}

/// Segment lengths in samples, plus the sustain and start levels (0 to 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSegments {
    pub delay: u32,
    pub attack: u32,
    pub hold: u32,
    pub decay: u32,
    pub sustain: f32,
    pub release: u32,
    pub start: f32,
}

impl EnvelopeSegments {
    /// Segments with the given attack and release and every other value at its default.
    pub fn new(attack: u32, release: u32) -> EnvelopeSegments {
        EnvelopeSegments {
            attack,
            release,
            ..Default::default()
        }
    }
}

impl Default for EnvelopeSegments {
    fn default() -> Self {
        EnvelopeSegments {
            delay: 0,
            attack: 0,
            hold: 0,
            decay: 0,
            sustain: 1.0,
            release: 0,
            start: 0.0,
        }
    }
}

/// A per-voice envelope.
#[derive(Debug, Clone, Default)]
pub struct AdsrEnvelope {
    state: EnvelopeState,
    segments: EnvelopeSegments,
    current: f32,
    /// Samples left in the current segment.
    remaining: u32,
    /// Additive step for attack and fadeout.
    step: f32,
    decay_rate: f32,
    release_rate: f32,
    /// Samples to wait before the release begins.
    release_delay: Option<u32>,
}

impl AdsrEnvelope {
    /// Creates an idle envelope.
    pub fn new() -> AdsrEnvelope {
        AdsrEnvelope::default()
    }

    /// Restarts the envelope with new segments. Any scheduled release is discarded.
    pub fn reset(&mut self, segments: EnvelopeSegments) {
        let sustain = segments.sustain.clamp(0.0, 1.0);
        let start = segments.start.clamp(0.0, 1.0);
        self.segments = EnvelopeSegments {
            sustain,
            start,
            ..segments
        };

        self.current = start;
        self.step = 0.0;
        self.release_rate = 0.0;
        self.release_delay = None;
        self.decay_rate = if segments.decay > 0 {
            (sustain.max(VIRTUALLY_ZERO).ln() / segments.decay as f32).exp()
        } else {
            1.0
        };

        self.state = EnvelopeState::Delay;
        self.remaining = segments.delay;
    }

    /// Schedules the release `time_from_now` samples from now. With 0 the release begins
    /// on the next produced sample.
    pub fn start_release(&mut self, time_from_now: u32) {
        match self.state {
            EnvelopeState::Idle
            | EnvelopeState::Release
            | EnvelopeState::Fadeout
            | EnvelopeState::Done => {}
            _ if time_from_now == 0 => {
                self.release_delay = None;
                self.begin_release();
            }
            _ => self.release_delay = Some(time_from_now),
        }
    }

    /// Ramps linearly to 0 over the given number of samples, overriding any other phase.
    pub fn start_fadeout(&mut self, samples: u32) {
        self.release_delay = None;
        if samples == 0 || self.current <= 0.0 || !self.is_active() {
            self.finish();
            return;
        }
        self.step = self.current / samples as f32;
        self.remaining = samples;
        self.state = EnvelopeState::Fadeout;
    }

    /// Produces the next envelope value.
    pub fn get_next_value(&mut self) -> f32 {
        if let Some(delay) = self.release_delay {
            if delay == 0 {
                self.release_delay = None;
                self.begin_release();
            } else {
                self.release_delay = Some(delay - 1);
            }
        }
        self.advance()
    }

    /// Fills the buffer with successive envelope values.
    pub fn get_block(&mut self, output: &mut [f32]) {
        for index in 0..output.len() {
            if self.release_delay.is_none() {
                let steady = match self.state {
                    EnvelopeState::Sustain => Some(self.segments.sustain),
                    EnvelopeState::Idle | EnvelopeState::Done => Some(0.0),
                    _ => None,
                };
                if let Some(value) = steady {
                    if self.state == EnvelopeState::Sustain {
                        self.current = value;
                    }
                    output[index..].fill(value);
                    return;
                }
            }
            output[index] = self.get_next_value();
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn current_value(&self) -> f32 {
        self.current
    }

    /// True once the release has begun or been scheduled.
    pub fn is_released(&self) -> bool {
        self.release_delay.is_some()
            || matches!(
                self.state,
                EnvelopeState::Release | EnvelopeState::Fadeout | EnvelopeState::Done
            )
    }

    pub fn is_done(&self) -> bool {
        self.state == EnvelopeState::Done
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, EnvelopeState::Idle | EnvelopeState::Done)
    }

    fn begin_release(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.segments.release == 0 || self.current <= VIRTUALLY_ZERO {
            self.finish();
            return;
        }
        self.release_rate = ((VIRTUALLY_ZERO.ln() - self.current.ln())
            / self.segments.release as f32)
            .exp();
        self.remaining = self.segments.release;
        self.state = EnvelopeState::Release;
    }

    fn finish(&mut self) {
        self.current = 0.0;
        self.remaining = 0;
        self.state = EnvelopeState::Done;
    }

    /// Steps the active phase by one sample. Finished or empty phases hand over to the next
    /// phase within the same call.
    fn advance(&mut self) -> f32 {
        loop {
            match self.state {
                EnvelopeState::Idle | EnvelopeState::Done => return 0.0,
                EnvelopeState::Delay => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        return self.current;
                    }
                    self.state = EnvelopeState::Attack;
                    self.remaining = self.segments.attack;
                    self.step = if self.segments.attack > 0 {
                        (1.0 - self.current) / self.segments.attack as f32
                    } else {
                        0.0
                    };
                }
                EnvelopeState::Attack => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        self.current += self.step;
                        if self.remaining == 0 {
                            self.current = 1.0;
                        }
                        return self.current;
                    }
                    self.current = 1.0;
                    self.state = EnvelopeState::Hold;
                    self.remaining = self.segments.hold;
                }
                EnvelopeState::Hold => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        return self.current;
                    }
                    if self.segments.decay > 0 && self.segments.sustain < 1.0 {
                        self.state = EnvelopeState::Decay;
                        self.remaining = self.segments.decay;
                    } else {
                        self.state = EnvelopeState::Sustain;
                    }
                }
                EnvelopeState::Decay => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        self.current *= self.decay_rate;
                        if self.remaining == 0 {
                            self.current = self.segments.sustain;
                        }
                        return self.current;
                    }
                    self.state = EnvelopeState::Sustain;
                }
                EnvelopeState::Sustain => {
                    self.current = self.segments.sustain;
                    return self.current;
                }
                EnvelopeState::Release => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        self.current *= self.release_rate;
                        return self.current;
                    }
                    self.finish();
                }
                EnvelopeState::Fadeout => {
                    if self.remaining > 0 {
                        self.remaining -= 1;
                        self.current = (self.current - self.step).max(0.0);
                        if self.remaining == 0 {
                            self.current = 0.0;
                        }
                        return self.current;
                    }
                    self.finish();
                }
            }
        }
    }
}
