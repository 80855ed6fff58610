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

//! A polyphonic sampler that plays SFZ instruments.
//!
//! [`processor::Processor`] is the entry point for hosts: it owns the [`engine::Synth`]
//! that renders on the realtime thread and hands loading and other slow work to a
//! background worker.

pub mod config;
pub mod engine;
pub mod envelope;
pub mod instrument;
pub mod opcode;
pub mod processor;
pub mod region;
pub mod render;
pub mod samples;
pub mod worker;

#[cfg(test)]
mod testutil;
