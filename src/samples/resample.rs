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

//! Band-limited oversampling of decoded sample data.
//!
//! Voices read sample data with linear interpolation, which smears and images the high end
//! when a sample is pitched. Raising the data rate with a sinc resampler first moves the
//! interpolation error far above the audible band.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::error::SampleError;
use super::SampleData;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Raises the data rate by an integer factor. The output is aligned with the input (the
/// resampler delay is removed) and is exactly `factor` times as long.
pub(super) fn upsample(
    data: &SampleData,
    factor: u32,
    path: &Path,
) -> Result<SampleData, SampleError> {
    let frames = data.frames();
    let channel_count = data.channel_count();
    if factor <= 1 || frames == 0 || channel_count == 0 {
        return Ok(data.clone());
    }

    let from = data.sample_rate();
    let to = from * factor;
    let failed = || SampleError::ResamplingFailed {
        path: path.to_path_buf(),
        from,
        to,
    };

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        factor as f64,
        1.0,
        sinc_params,
        INPUT_BLOCK_SIZE,
        channel_count,
    )
    .map_err(|_e| failed())?;

    let target = frames * factor as usize;
    let delay = resampler.output_delay();
    let input: Vec<&[f32]> = (0..channel_count).map(|index| data.channel(index)).collect();
    let mut output =
        vec![Vec::with_capacity(target + delay + resampler.output_frames_max()); channel_count];

    let mut position = 0;
    while output[0].len() < target + delay {
        let needed = resampler.input_frames_next();
        let resampled = if position + needed <= frames {
            let chunk: Vec<&[f32]> = input
                .iter()
                .map(|channel| &channel[position..position + needed])
                .collect();
            position += needed;
            resampler.process(chunk.as_slice(), None)
        } else if position < frames {
            let chunk: Vec<&[f32]> = input.iter().map(|channel| &channel[position..]).collect();
            position = frames;
            resampler.process_partial(Some(chunk.as_slice()), None)
        } else {
            // Flush the tail still held in the filter.
            resampler.process_partial(None::<&[&[f32]]>, None)
        }
        .map_err(|_e| failed())?;

        if resampled.first().map_or(true, Vec::is_empty) {
            break;
        }
        for (channel, samples) in output.iter_mut().zip(resampled) {
            channel.extend_from_slice(&samples);
        }
    }

    for channel in output.iter_mut() {
        channel.drain(..delay.min(channel.len()));
        channel.resize(target, 0.0);
        channel.shrink_to_fit();
    }

    debug!(path = ?path, from, to, frames = target, "Oversampled sample data");
    Ok(SampleData::from_planar(output, to))
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::engine::{Event, EventKind, Synth};
    use crate::testutil::instrument;

    const RATE: u32 = 48000;

    fn sine(frequency: f64, frames: usize) -> SampleData {
        let samples = (0..frames)
            .map(|n| (2.0 * PI * frequency * n as f64 / RATE as f64).sin() as f32)
            .collect();
        SampleData::from_planar(vec![samples], RATE)
    }

    /// Plays the data a fifth above its root and returns the rendered left channel.
    fn render_fifth_up(data: SampleData) -> Vec<f32> {
        let mut synth = Synth::with_seed(RATE as f32, 2048, 4, 1);
        synth.set_instrument(instrument(
            &[&[("sample", "sine.wav"), ("pitch_keycenter", "60")]],
            std::sync::Arc::new(data),
        ));
        let mut left = vec![0.0; 2048];
        let mut right = vec![0.0; 2048];
        synth.render(
            &[Event::new(
                0,
                EventKind::NoteOn {
                    key: 67,
                    velocity: 127,
                },
            )],
            &mut left,
            &mut right,
        );
        left
    }

    /// RMS of what is left after removing the best fitting sine at `frequency`.
    fn residual(signal: &[f32], frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / RATE as f64;
        let (mut ss, mut cc, mut sc, mut ys, mut yc) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (n, y) in signal.iter().enumerate() {
            let (s, c) = (w * n as f64).sin_cos();
            let y = *y as f64;
            ss += s * s;
            cc += c * c;
            sc += s * c;
            ys += y * s;
            yc += y * c;
        }
        let det = ss * cc - sc * sc;
        let a = (ys * cc - yc * sc) / det;
        let b = (yc * ss - ys * sc) / det;
        let error: f64 = signal
            .iter()
            .enumerate()
            .map(|(n, y)| {
                let (s, c) = (w * n as f64).sin_cos();
                (*y as f64 - a * s - b * c).powi(2)
            })
            .sum();
        (error / signal.len() as f64).sqrt()
    }

    #[test]
    fn test_upsample_length_and_rate() {
        let data = SampleData::from_planar(vec![vec![0.1, 0.2, 0.3], vec![0.0, 0.0, 0.0]], 100);
        let upsampled = upsample(&data, 2, Path::new("short.wav")).unwrap();
        assert_eq!(upsampled.sample_rate(), 200);
        assert_eq!(upsampled.channel_count(), 2);
        assert_eq!(upsampled.frames(), 6);

        assert_eq!(upsample(&data, 1, Path::new("short.wav")).unwrap(), data);
    }

    #[test]
    fn test_upsample_keeps_signal_aligned() {
        let data = sine(200.0, 4800);
        let upsampled = upsample(&data, 2, Path::new("sine.wav")).unwrap();
        assert_eq!(upsampled.frames(), 9600);
        // Every other output frame lands on an input frame.
        for n in 1000..1100 {
            assert!(
                (upsampled.channel(0)[2 * n] - data.channel(0)[n]).abs() < 0.02,
                "frame {} differs",
                n
            );
        }
    }

    #[test]
    fn test_oversampling_reduces_interpolation_error() {
        let data = sine(7000.0, RATE as usize);
        let x1 = render_fifth_up(data.clone());
        let x2 = render_fifth_up(upsample(&data, 2, Path::new("sine.wav")).unwrap());
        let x4 = render_fifth_up(upsample(&data, 4, Path::new("sine.wav")).unwrap());

        let played = 7000.0 * 2f64.powf(7.0 / 12.0);
        let window = 512..1536;
        let error_x1 = residual(&x1[window.clone()], played);
        let error_x2 = residual(&x2[window.clone()], played);
        let error_x4 = residual(&x4[window], played);

        assert!(x1.iter().zip(&x2).any(|(a, b)| (a - b).abs() > 0.01));
        assert!(error_x2 < error_x1 * 0.5, "x1 {} x2 {}", error_x1, error_x2);
        assert!(error_x4 < error_x2, "x2 {} x4 {}", error_x2, error_x4);
    }
}
