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

//! Opcodes are the `name=value` pairs that describe an instrument.
//!
//! A key such as `locc64` carries a trailing parameter index (`64`), which is split off
//! from the name at construction. Values are kept verbatim and only interpreted by the
//! typed readers below, which never fail loudly: a malformed value simply yields `None`.

use std::fmt;
use std::ops::RangeInclusive;

/// A single opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    /// The opcode name with any trailing parameter index removed.
    pub name: String,
    /// The trailing parameter index, if the raw key had one.
    pub parameter: Option<u32>,
    /// The raw value.
    pub value: String,
}

impl Opcode {
    /// Creates an opcode from a raw key and value.
    pub fn new(key: &str, value: &str) -> Opcode {
        let key = key.trim();
        let prefix = key.trim_end_matches(|c: char| c.is_ascii_digit());

        // Keys made entirely of digits, or with an index too large to represent, are kept whole.
        let parameter = if prefix.is_empty() || prefix.len() == key.len() {
            None
        } else {
            key[prefix.len()..].parse::<u32>().ok()
        };

        let name = match parameter {
            Some(_) => prefix,
            None => key,
        };

        Opcode {
            name: name.to_string(),
            parameter,
            value: value.to_string(),
        }
    }

    /// Reads the value as an integer, clamped into the given range.
    /// Decimal values are truncated toward zero.
    pub fn read_int<T>(&self, range: RangeInclusive<T>) -> Option<T>
    where
        T: Copy + Into<i64> + TryFrom<i64>,
    {
        let text = self.value.trim();
        let parsed = match text.parse::<i64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                let float = text.parse::<f64>().ok()?;
                if !float.is_finite() {
                    return None;
                }
                float as i64
            }
        };

        let clamped = parsed.clamp((*range.start()).into(), (*range.end()).into());
        T::try_from(clamped).ok()
    }

    /// Reads the value as a float, clamped into the given range.
    pub fn read_float(&self, range: RangeInclusive<f32>) -> Option<f32> {
        let parsed = self.value.trim().parse::<f32>().ok()?;
        if !parsed.is_finite() {
            return None;
        }
        Some(parsed.clamp(*range.start(), *range.end()))
    }

    /// Reads the value as a MIDI key, accepting either a number or a note name.
    pub fn read_key(&self) -> Option<u8> {
        self.read_int(0..=127u8)
            .or_else(|| read_note_value(&self.value))
    }

    /// Reads the value as a bare word, lowercased. Used for enumerated opcodes.
    pub fn read_word(&self) -> Option<String> {
        let word = self.value.trim();
        if word.is_empty() {
            return None;
        }
        Some(word.to_ascii_lowercase())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameter {
            Some(parameter) => write!(f, "{}{}={}", self.name, parameter, self.value),
            None => write!(f, "{}={}", self.name, self.value),
        }
    }
}

/// Parses a note name such as `c#4` or `Bb-1` into a MIDI note number.
///
/// Octave `-1` holds notes 0 through 11, so `C-1` is 0 and `G9` is 127. Matching is
/// case-insensitive and `#`/`b` accidentals are supported.
pub fn read_note_value(text: &str) -> Option<u8> {
    let text = text.trim();
    let mut chars = text.chars();

    let base: i32 = match chars.next()?.to_ascii_lowercase() {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') | Some('B') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    let octave = octave.parse::<i32>().ok()?;
    let note = (octave + 1) * 12 + base + accidental;
    u8::try_from(note).ok().filter(|note| *note <= 127)
}

/// Converts decibels into a linear gain.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
