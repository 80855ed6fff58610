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

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::error::SampleError;
use super::SampleData;

/// Decodes an audio file (WAV, FLAC, OGG and anything else symphonia supports) into
/// planar f32 data. Decoded frames are accumulated `chunk_frames` at a time.
pub fn decode_file(path: &Path, chunk_frames: usize) -> Result<SampleData, SampleError> {
    let file = File::open(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let decode_error = |source: SymphoniaError| SampleError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleError::NoTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params.sample_rate.ok_or_else(|| {
        SampleError::Unsupported(path.to_path_buf(), "sample rate not specified".to_string())
    })?;

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let chunk_frames = chunk_frames.max(1);
    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            // Some decoders return DecodeError at EOF instead of IoError
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(decode_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channel_count == 0 || decoded.frames() == 0 {
            continue;
        }

        let frames = decoded.frames();
        let too_small = sample_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < decoded.capacity() * channel_count);
        if too_small {
            sample_buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buffer) = sample_buffer.as_mut() else {
            continue;
        };
        buffer.copy_interleaved_ref(decoded);

        if channels.len() != channel_count {
            channels.resize_with(channel_count, Vec::new);
        }
        for channel in channels.iter_mut() {
            if channel.capacity() - channel.len() < frames {
                channel.reserve(chunk_frames.max(frames));
            }
        }
        for frame in buffer.samples().chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    debug!(
        path = ?path,
        channels = channels.len(),
        sample_rate,
        frames = channels.first().map(Vec::len).unwrap_or(0),
        "Decoded sample file"
    );

    Ok(SampleData::from_planar(channels, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_decode_stereo_wav() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("stereo.wav");
        write_wav(
            &path,
            &[vec![0.5f32, 0.25, -0.5], vec![-0.5f32, -0.25, 0.5]],
            44100,
        )
        .unwrap();

        let data = decode_file(&path, 2).unwrap();
        assert_eq!(data.sample_rate(), 44100);
        assert_eq!(data.channel_count(), 2);
        assert_eq!(data.frames(), 3);
        assert_eq!(data.channel(0), &[0.5, 0.25, -0.5]);
        assert_eq!(data.channel(1), &[-0.5, -0.25, 0.5]);
    }

    #[test]
    fn test_decode_mono_int_wav() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("mono.wav");
        write_wav(&path, &[vec![i16::MAX, 0, i16::MIN]], 22050).unwrap();

        let data = decode_file(&path, 4096).unwrap();
        assert_eq!(data.sample_rate(), 22050);
        assert_eq!(data.channel_count(), 1);
        assert_eq!(data.frames(), 3);
        assert!((data.channel(0)[0] - 1.0).abs() < 1e-3);
        assert_eq!(data.channel(0)[1], 0.0);
        assert!((data.channel(0)[2] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_missing_file() {
        let result = decode_file(Path::new("/nonexistent/file.wav"), 1024);
        assert!(matches!(result, Err(SampleError::Io { .. })));
    }

    #[test]
    fn test_not_audio() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("notes.wav");
        std::fs::write(&path, "definitely not audio").unwrap();
        assert!(decode_file(&path, 1024).is_err());
    }
}
