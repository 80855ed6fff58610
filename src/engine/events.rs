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

use midly::live::LiveEvent;
use midly::MidiMessage;

/// A musical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Bend amount centered at 0, from -8192 to 8191.
    PitchBend(i16),
}

impl EventKind {
    /// Converts a MIDI channel message. Note-on with velocity 0 is treated as note-off.
    /// Messages the synth does not react to return `None`.
    pub fn from_midi_message(message: MidiMessage) -> Option<EventKind> {
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(EventKind::NoteOff {
                key: key.as_int(),
                velocity: 0,
            }),
            MidiMessage::NoteOn { key, vel } => Some(EventKind::NoteOn {
                key: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, vel } => Some(EventKind::NoteOff {
                key: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Some(EventKind::ControlChange {
                controller: controller.as_int(),
                value: value.as_int(),
            }),
            MidiMessage::PitchBend { bend } => Some(EventKind::PitchBend(bend.as_int())),
            _ => None,
        }
    }
}

/// An event at a frame offset within the block being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: usize,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: usize, kind: EventKind) -> Event {
        Event { time, kind }
    }

    /// Parses raw MIDI bytes. Returns `None` for malformed data and for messages the synth
    /// ignores, such as system messages.
    pub fn from_midi(time: usize, bytes: &[u8]) -> Option<Event> {
        match LiveEvent::parse(bytes).ok()? {
            LiveEvent::Midi { message, .. } => {
                EventKind::from_midi_message(message).map(|kind| Event { time, kind })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_midi() {
        assert_eq!(
            Event::from_midi(3, &[0x90, 60, 100]),
            Some(Event::new(
                3,
                EventKind::NoteOn {
                    key: 60,
                    velocity: 100
                }
            ))
        );
        assert_eq!(
            Event::from_midi(0, &[0x81, 60, 10]).map(|e| e.kind),
            Some(EventKind::NoteOff {
                key: 60,
                velocity: 10
            })
        );
        assert_eq!(
            Event::from_midi(0, &[0xB0, 64, 127]).map(|e| e.kind),
            Some(EventKind::ControlChange {
                controller: 64,
                value: 127
            })
        );
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        assert_eq!(
            Event::from_midi(0, &[0x90, 60, 0]).map(|e| e.kind),
            Some(EventKind::NoteOff {
                key: 60,
                velocity: 0
            })
        );
    }

    #[test]
    fn test_pitch_bend_is_centered() {
        // 14-bit value 0x2000 is the center.
        assert_eq!(
            Event::from_midi(0, &[0xE0, 0x00, 0x40]).map(|e| e.kind),
            Some(EventKind::PitchBend(0))
        );
        assert_eq!(
            Event::from_midi(0, &[0xE0, 0x7F, 0x7F]).map(|e| e.kind),
            Some(EventKind::PitchBend(8191))
        );
        assert_eq!(
            Event::from_midi(0, &[0xE0, 0x00, 0x00]).map(|e| e.kind),
            Some(EventKind::PitchBend(-8192))
        );
    }

    #[test]
    fn test_ignored_and_malformed() {
        assert_eq!(Event::from_midi(0, &[0xF8]), None);
        assert_eq!(Event::from_midi(0, &[0x90, 60]), None);
        assert_eq!(Event::from_midi(0, &[0xC0, 5]), None);
        assert_eq!(Event::from_midi(0, &[]), None);
    }
}
