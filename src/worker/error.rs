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

use super::request::RequestKind;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker queue is full, dropped {0} request")]
    QueueFull(RequestKind),

    #[error("Worker is gone, dropped {0} request")]
    Disconnected(RequestKind),

    #[error("Unexpected {got} response while {}", expected_text(.expected))]
    UnexpectedResponse {
        expected: Option<RequestKind>,
        got: RequestKind,
    },

    #[error("Unable to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

fn expected_text(expected: &Option<RequestKind>) -> String {
    match expected {
        Some(kind) => format!("waiting for {}", kind),
        None => "nothing was pending".to_string(),
    }
}
