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

//! A single sounding instance of a region.
//!
//! Voices live in a fixed pool owned by the synth and hold no heap data, so starting,
//! stopping and copying them never allocates.

use crate::envelope::AdsrEnvelope;
use crate::region::{LoopMode, OffMode, Region, Trigger};
use crate::samples::SampleData;

/// Everything needed to start a voice.
pub(crate) struct VoiceStart<'a> {
    pub region_index: usize,
    pub region: &'a Region,
    pub sample: &'a SampleData,
    pub key: u8,
    pub velocity: u8,
    pub sample_rate: f32,
    pub age: u64,
}

/// A pool slot that plays one region.
#[derive(Debug, Clone, Default)]
pub struct Voice {
    playing: bool,
    /// Index of the region in the current instrument.
    region: usize,
    key: u8,
    velocity: u8,
    trigger: Trigger,
    /// Monotonic start counter used to find the oldest voice.
    age: u64,
    envelope: AdsrEnvelope,
    /// Playback position in frames of the sample data.
    position: f64,
    /// Frames advanced per output frame, before pitch bend.
    pitch_ratio: f64,
    end: usize,
    loop_mode: LoopMode,
    loop_range: Option<(usize, usize)>,
    gain_left: f32,
    gain_right: f32,
    off_mode: OffMode,
    fast_off_samples: u32,
    /// The note was released while the sustain pedal was down.
    sustained: bool,
}

impl Voice {
    pub(crate) fn start(&mut self, start: VoiceStart<'_>) {
        let region = start.region;
        let frames = start.sample.frames();
        let rate_ratio = start.sample.sample_rate() as f64 / start.sample_rate as f64;
        let semitones = region.pitch_semitones(start.key) as f64;
        let gain = region.gain(start.velocity);
        let (pan_left, pan_right) = region.pan_gains();

        self.playing = true;
        self.region = start.region_index;
        self.key = start.key;
        self.velocity = start.velocity;
        self.trigger = region.trigger();
        self.age = start.age;
        self.pitch_ratio = 2f64.powf(semitones / 12.0) * rate_ratio;
        self.end = region.end_frame(frames);
        self.position = (region.offset() as usize).min(self.end) as f64;
        self.loop_mode = region.loop_mode();
        self.loop_range = match self.loop_mode {
            LoopMode::LoopContinuous | LoopMode::LoopSustain => region.loop_range(self.end),
            LoopMode::NoLoop | LoopMode::OneShot => None,
        };
        self.gain_left = gain * pan_left;
        self.gain_right = gain * pan_right;
        self.off_mode = region.off_mode();
        self.fast_off_samples = region.fast_off_samples(start.sample_rate);
        self.sustained = false;
        self.envelope
            .reset(region.amp_envelope().segments(start.sample_rate));
    }

    /// Starts the release phase. One-shot voices play to the end of their sample.
    pub fn release(&mut self) {
        self.sustained = false;
        if self.loop_mode != LoopMode::OneShot {
            self.envelope.start_release(0);
        }
    }

    /// Marks the note as released while the sustain pedal holds it.
    pub fn defer_release(&mut self) {
        self.sustained = true;
    }

    /// Silences the voice because another group cut it off.
    pub fn choke(&mut self) {
        match self.off_mode {
            OffMode::Fast => self.fade_out(),
            OffMode::Normal => {
                self.envelope.start_release(0);
                self.sustained = false;
            }
        }
    }

    /// Ramps the voice down over its fast-off time, whatever its off mode.
    pub fn fade_out(&mut self) {
        self.envelope.start_fadeout(self.fast_off_samples);
        self.sustained = false;
    }

    /// Frees the slot immediately.
    pub fn stop(&mut self) {
        self.playing = false;
        self.sustained = false;
    }

    pub fn is_free(&self) -> bool {
        !self.playing
    }

    pub fn is_released(&self) -> bool {
        self.envelope.is_released()
    }

    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    pub fn region(&self) -> usize {
        self.region
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    fn is_looping(&self) -> bool {
        match self.loop_mode {
            LoopMode::LoopContinuous => true,
            LoopMode::LoopSustain => !self.envelope.is_released(),
            LoopMode::NoLoop | LoopMode::OneShot => false,
        }
    }

    /// Adds this voice's output into the buffers. `envelope` is scratch space at least as
    /// long as the output. The voice frees itself when its sample or envelope ends.
    pub(crate) fn render(
        &mut self,
        sample: &SampleData,
        bend_ratio: f64,
        left: &mut [f32],
        right: &mut [f32],
        envelope: &mut [f32],
    ) {
        if !self.playing {
            return;
        }

        let frames = left.len().min(right.len()).min(envelope.len());
        let envelope = &mut envelope[..frames];
        self.envelope.get_block(envelope);

        let data_left = sample.channel(0);
        let data_right = sample.channel(1);
        let step = self.pitch_ratio * bend_ratio;

        for (frame, amplitude) in envelope.iter().enumerate() {
            let looping = self.loop_range.filter(|_| self.is_looping());
            let limit = match looping {
                Some((loop_start, loop_end)) => {
                    while self.position >= loop_end as f64 {
                        self.position -= (loop_end - loop_start) as f64;
                    }
                    loop_end
                }
                None => self.end,
            };

            if self.position >= limit as f64 {
                self.stop();
                return;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = match looping {
                _ if index + 1 < limit => index + 1,
                Some((loop_start, _)) => loop_start,
                None => index,
            };

            let l = data_left[index] + (data_left[next] - data_left[index]) * frac;
            let r = data_right[index] + (data_right[next] - data_right[index]) * frac;
            left[frame] += l * self.gain_left * amplitude;
            right[frame] += r * self.gain_right * amplitude;

            self.position += step;
        }

        if self.envelope.is_done() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::region;

    fn start(voice: &mut Voice, region: &Region, sample: &SampleData, key: u8) {
        voice.start(VoiceStart {
            region_index: 0,
            region,
            sample,
            key,
            velocity: 127,
            sample_rate: 100.0,
            age: 1,
        });
    }

    fn render(voice: &mut Voice, sample: &SampleData, frames: usize) -> Vec<f32> {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        let mut envelope = vec![0.0; frames];
        voice.render(sample, 1.0, &mut left, &mut right, &mut envelope);
        left
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-4, "frame {index}: {a} != {e}");
        }
    }

    fn ramp(frames: usize) -> SampleData {
        SampleData::from_planar(vec![(0..frames).map(|i| i as f32).collect()], 100)
    }

    #[test]
    fn test_plays_sample_then_frees() {
        let sample = ramp(4);
        let region = region(&[("sample", "ramp.wav")]);
        let mut voice = Voice::default();
        assert!(voice.is_free());

        start(&mut voice, &region, &sample, 60);
        assert!(!voice.is_free());
        assert_close(&render(&mut voice, &sample, 6), &[0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
        assert!(voice.is_free());
    }

    #[test]
    fn test_octave_up_skips_frames() {
        let sample = ramp(8);
        let region = region(&[("sample", "ramp.wav"), ("pitch_keycenter", "60")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 72);
        assert_close(&render(&mut voice, &sample, 4), &[0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_interpolates_between_frames() {
        let sample = ramp(8);
        let region = region(&[("sample", "ramp.wav"), ("pitch_keycenter", "72")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        assert_close(&render(&mut voice, &sample, 4), &[0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_offset_and_end() {
        let sample = ramp(10);
        let region = region(&[("sample", "ramp.wav"), ("offset", "2"), ("end", "4")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        assert_close(&render(&mut voice, &sample, 5), &[2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_continuous_loop() {
        let sample = ramp(4);
        let region = region(&[
            ("sample", "ramp.wav"),
            ("loop_mode", "loop_continuous"),
            ("loop_start", "1"),
            ("loop_end", "2"),
        ]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        assert_close(
            &render(&mut voice, &sample, 7),
            &[0.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0],
        );
        assert!(!voice.is_free());
    }

    #[test]
    fn test_release_ends_voice() {
        let sample = SampleData::from_planar(vec![vec![1.0; 100]], 100);
        let region = region(&[("sample", "one.wav"), ("ampeg_release", "0.02")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        render(&mut voice, &sample, 2);

        voice.release();
        assert!(voice.is_released());
        let output = render(&mut voice, &sample, 4);
        assert!(output[0] < 1.0 && output[0] > 0.0);
        assert_eq!(output[2], 0.0);
        assert!(voice.is_free());
    }

    #[test]
    fn test_one_shot_ignores_release() {
        let sample = SampleData::from_planar(vec![vec![1.0; 3]], 100);
        let region = region(&[("sample", "one.wav"), ("loop_mode", "one_shot")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        voice.release();
        assert!(!voice.is_released());
        assert_close(&render(&mut voice, &sample, 4), &[1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_loop_sustain_stops_looping_on_release() {
        let sample = ramp(4);
        let region = region(&[
            ("sample", "ramp.wav"),
            ("loop_mode", "loop_sustain"),
            ("loop_start", "0"),
            ("loop_end", "1"),
            ("ampeg_release", "1"),
        ]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        assert_close(&render(&mut voice, &sample, 4), &[0.0, 1.0, 0.0, 1.0]);

        // Playback continues past the loop end to the end of the sample.
        voice.release();
        let output = render(&mut voice, &sample, 4);
        assert!(output[0] > 1.0);
        assert!(output[1] > 2.0);
        assert_eq!(output[2], 0.0);
        assert!(voice.is_free());
    }

    #[test]
    fn test_choke_fast_fades_out() {
        let sample = SampleData::from_planar(vec![vec![1.0; 100]], 100);
        let region = region(&[("sample", "one.wav"), ("ampeg_release", "10")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        voice.choke();
        let output = render(&mut voice, &sample, 3);
        assert!(output[0] < 1.0);
        assert_eq!(output[1], 0.0);
        assert!(voice.is_free());
    }

    #[test]
    fn test_pan_and_gain() {
        let sample = SampleData::from_planar(vec![vec![1.0; 4]], 100);
        let region = region(&[("sample", "one.wav"), ("pan", "-100")]);
        let mut voice = Voice::default();
        start(&mut voice, &region, &sample, 60);
        let mut left = vec![0.0; 2];
        let mut right = vec![0.0; 2];
        let mut envelope = vec![0.0; 2];
        voice.render(&sample, 1.0, &mut left, &mut right, &mut envelope);
        assert!((left[0] - std::f32::consts::SQRT_2).abs() < 1e-5);
        assert!(right[0].abs() < 1e-5);
    }
}
