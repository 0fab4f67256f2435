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

//! The task runtime. Every long-running service in the farm is a `Task`: one OS thread running a
//! cooperative loop which calls the service's per-cycle hook and then polls the 0mq queues the
//! service registered, dispatching to the handler attached to each ready queue.
//!
//! Each task also owns a private control queue (`inproc://ctrl-<name>`) over which other threads
//! ask it to stop, via a [`TaskHandle`].

mod control;
mod queues;
mod task;

pub use control::{ControlMessage, STOP, TaskHandle, control_endpoint};
pub use queues::{Handler, QueueId, Queues};
pub use task::{DEFAULT_POLL_TIMEOUT, RunningTask, Service, Task};

use thiserror::Error;

/// Errors surfaced by the task runtime and by the handlers it drives.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Raised when STOP arrives on the control queue. `Task::run` consumes it and exits cleanly;
    /// nothing else should.
    #[error("task asked to stop")]
    Quit,
    #[error("0mq transport error: {0}")]
    Transport(#[from] zmq::Error),
    #[error("could not encode control message: {0}")]
    Encode(String),
    #[error("no queue registered as {0:?}")]
    UnknownQueue(QueueId),
    #[error("task thread {0} panicked")]
    Panicked(String),
    /// A failure inside a service's own handler. Not caught by the runtime, so it ends the task.
    #[error("handler failed: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        TaskError::Handler(error.into())
    }
}
