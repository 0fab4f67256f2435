// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use bincode::{Decode, Encode};
use tracing::debug;

use crate::TaskError;

/// The one control command every task understands.
pub const STOP: &str = "STOP";

/// How long closing the one-shot control socket may wait to flush its message.
const CONTROL_LINGER_MS: i32 = 1000;

/// Control messages are a command and a few short arguments; anything claiming more is garbage.
const MAX_CONTROL_BYTES: usize = 64 * 1024;

/// The private, in-process endpoint a task with the given name listens on for control messages.
pub fn control_endpoint(name: &str) -> String {
    format!("inproc://ctrl-{name}")
}

/// A `(command, args...)` message sent over a task's control queue.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct ControlMessage {
    pub command: String,
    pub args: Vec<String>,
}

impl ControlMessage {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn stop() -> Self {
        Self::new(STOP, vec![])
    }

    pub fn is_stop(&self) -> bool {
        self.command == STOP
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, TaskError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TaskError::Encode(e.to_string()))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, String> {
        bincode::decode_from_slice(
            bytes,
            bincode::config::standard().with_limit::<MAX_CONTROL_BYTES>(),
        )
            .map(|(msg, _)| msg)
            .map_err(|e| e.to_string())
    }
}

/// Cloneable, thread-safe way to reach a task's control queue. Obtained from `Task::handle` before
/// the task is moved onto its thread.
#[derive(Clone)]
pub struct TaskHandle {
    name: String,
    zmq_context: zmq::Context,
}

impl TaskHandle {
    pub(crate) fn new(name: String, zmq_context: zmq::Context) -> Self {
        Self { name, zmq_context }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to terminate at its earliest convenience. Does not wait for it to do so; join
    /// the task's thread for that.
    pub fn request_stop(&self) -> Result<(), TaskError> {
        self.send_control(&ControlMessage::stop())
    }

    /// Deliver an arbitrary control message. A fresh PUSH socket is used per message so the handle
    /// can be shared between threads freely.
    pub fn send_control(&self, message: &ControlMessage) -> Result<(), TaskError> {
        let payload = message.encode()?;
        let queue = self.zmq_context.socket(zmq::PUSH)?;
        queue.set_linger(CONTROL_LINGER_MS)?;
        queue.connect(&control_endpoint(&self.name))?;
        queue.send(payload, 0)?;
        debug!(task = %self.name, command = %message.command, "Sent control message");
        Ok(())
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_round_trip() {
        let bytes = ControlMessage::stop().encode().unwrap();
        assert!(ControlMessage::decode(&bytes).unwrap().is_stop());
    }

    #[test]
    fn test_oversized_command_is_refused() {
        let mut bytes = vec![0xfd];
        bytes.extend((1u64 << 50).to_le_bytes());
        assert!(ControlMessage::decode(&bytes).is_err());

        let long = ControlMessage::new("PING", vec!["x".repeat(MAX_CONTROL_BYTES)]);
        let bytes = long.encode().unwrap();
        assert!(ControlMessage::decode(&bytes).is_err());
    }
}
