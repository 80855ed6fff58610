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

/// Sustain pedal controller.
pub const SUSTAIN_CC: u8 = 64;

/// Live controller and note state.
#[derive(Debug, Clone)]
pub struct MidiState {
    controllers: [u8; 128],
    /// Velocity of the last note-on for each key, kept after note-off for release triggers.
    velocities: [u8; 128],
    held: [bool; 128],
    held_count: usize,
    pitch_bend: i16,
}

impl Default for MidiState {
    fn default() -> Self {
        MidiState {
            controllers: [0; 128],
            velocities: [0; 128],
            held: [false; 128],
            held_count: 0,
            pitch_bend: 0,
        }
    }
}

impl MidiState {
    pub fn note_on(&mut self, key: u8, velocity: u8) {
        let key = (key & 0x7F) as usize;
        self.velocities[key] = velocity;
        if !self.held[key] {
            self.held[key] = true;
            self.held_count += 1;
        }
    }

    pub fn note_off(&mut self, key: u8) {
        let key = (key & 0x7F) as usize;
        if self.held[key] {
            self.held[key] = false;
            self.held_count -= 1;
        }
    }

    pub fn is_held(&self, key: u8) -> bool {
        self.held[(key & 0x7F) as usize]
    }

    /// Number of keys currently held down.
    pub fn held_count(&self) -> usize {
        self.held_count
    }

    pub fn note_velocity(&self, key: u8) -> u8 {
        self.velocities[(key & 0x7F) as usize]
    }

    pub fn set_controller(&mut self, controller: u8, value: u8) {
        self.controllers[(controller & 0x7F) as usize] = value;
    }

    pub fn controllers(&self) -> &[u8; 128] {
        &self.controllers
    }

    pub fn is_sustain_down(&self) -> bool {
        self.controllers[SUSTAIN_CC as usize] >= 64
    }

    pub fn set_pitch_bend(&mut self, bend: i16) {
        self.pitch_bend = bend.clamp(-8192, 8191);
    }

    pub fn pitch_bend(&self) -> i16 {
        self.pitch_bend
    }

    /// Releases every key and resets the bend, leaving controllers untouched.
    pub fn reset_notes(&mut self) {
        self.held = [false; 128];
        self.held_count = 0;
        self.pitch_bend = 0;
    }
}
