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

use zmq::Socket;

use crate::TaskError;

/// Called with the ready queue as its only argument, plus the service that registered it.
pub type Handler<S> = fn(&mut S, QueueId) -> Result<(), TaskError>;

/// Identifies a queue within one service's registry. Only meaningful to the `Queues` that issued it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct QueueId(usize);

struct Registration<S> {
    socket: Socket,
    interest: zmq::PollEvents,
    handler: Handler<S>,
}

/// The set of queues a service wants polled each cycle, and the handler for each.
///
/// The registry owns its sockets, so the same socket can't end up registered twice.
pub struct Queues<S> {
    registrations: Vec<Registration<S>>,
}

impl<S> Default for Queues<S> {
    fn default() -> Self {
        Self {
            registrations: vec![],
        }
    }
}

impl<S> Queues<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `queue` for `POLLIN`.
    pub fn register(&mut self, queue: Socket, handler: Handler<S>) -> QueueId {
        self.register_with(queue, handler, zmq::POLLIN)
    }

    pub fn register_with(
        &mut self,
        queue: Socket,
        handler: Handler<S>,
        interest: zmq::PollEvents,
    ) -> QueueId {
        let id = QueueId(self.registrations.len());
        self.registrations.push(Registration {
            socket: queue,
            interest,
            handler,
        });
        id
    }

    /// Replace the handler on an already registered queue.
    pub fn set_handler(&mut self, queue: QueueId, handler: Handler<S>) -> Result<(), TaskError> {
        let registration = self
            .registrations
            .get_mut(queue.0)
            .ok_or(TaskError::UnknownQueue(queue))?;
        registration.handler = handler;
        Ok(())
    }

    /// Change what a queue is polled for. An empty set takes it out of the poll without dropping it.
    pub fn set_interest(
        &mut self,
        queue: QueueId,
        interest: zmq::PollEvents,
    ) -> Result<(), TaskError> {
        let registration = self
            .registrations
            .get_mut(queue.0)
            .ok_or(TaskError::UnknownQueue(queue))?;
        registration.interest = interest;
        Ok(())
    }

    pub fn socket(&self, queue: QueueId) -> Result<&Socket, TaskError> {
        self.registrations
            .get(queue.0)
            .map(|r| &r.socket)
            .ok_or(TaskError::UnknownQueue(queue))
    }

    pub(crate) fn handler(&self, queue: QueueId) -> Result<Handler<S>, TaskError> {
        self.registrations
            .get(queue.0)
            .map(|r| r.handler)
            .ok_or(TaskError::UnknownQueue(queue))
    }

    pub(crate) fn poll_items(&self) -> impl Iterator<Item = (QueueId, zmq::PollItem<'_>)> {
        self.registrations
            .iter()
            .enumerate()
            .map(|(i, r)| (QueueId(i), r.socket.as_poll_item(r.interest)))
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
