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

//! Load-sharing router between `DbClient`s and oracles.
//!
//! Oracles connect to the worker-facing ROUTER socket and announce themselves with `READY`; each
//! reply they send also makes them ready again. Client requests arriving on the client-facing
//! ROUTER socket go to the oracle that has been ready longest. While no oracle is ready the client
//! queue is left out of the poll, so requests wait in 0mq rather than here.

use db_rpc_common::READY;
use farm_task::{QueueId, Queues, Service, Task, TaskError};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

pub struct Router {
    queues: Queues<Self>,
    clients: QueueId,
    oracles: QueueId,
    ready: VecDeque<Vec<u8>>,
}

impl Router {
    /// Bind both sides of the router. `db_queue` is where clients connect, `oracle_queue` where
    /// oracles do.
    pub fn new(
        zmq_context: zmq::Context,
        db_queue: &str,
        oracle_queue: &str,
    ) -> Result<Task<Self>, TaskError> {
        let clients_socket = zmq_context.socket(zmq::ROUTER)?;
        clients_socket.bind(db_queue)?;
        let oracles_socket = zmq_context.socket(zmq::ROUTER)?;
        oracles_socket.bind(oracle_queue)?;

        let mut queues = Queues::new();
        // No oracle is ready yet, so don't accept client work.
        let clients =
            queues.register_with(clients_socket, Self::handle_client, zmq::PollEvents::empty());
        let oracles = queues.register(oracles_socket, Self::handle_oracle);
        info!(db_queue, oracle_queue, "Router listening");
        Task::new(
            "router",
            zmq_context,
            Self {
                queues,
                clients,
                oracles,
                ready: VecDeque::new(),
            },
        )
    }

    pub fn ready_oracles(&self) -> usize {
        self.ready.len()
    }

    /// `(client, empty, payload)` from a client; forwarded as
    /// `(oracle, empty, client, empty, payload)`.
    fn handle_client(&mut self, queue: QueueId) -> Result<(), TaskError> {
        let msg = self.queues.socket(queue)?.recv_multipart(0)?;
        if msg.len() != 3 {
            warn!(parts = msg.len(), "Dropping malformed client request");
            return Ok(());
        }
        let Some(oracle) = self.ready.pop_front() else {
            // Only polled while an oracle is ready, so this is a bug if it happens.
            warn!("Client request arrived with no oracle ready; dropping it");
            return Ok(());
        };
        let mut forward = Vec::with_capacity(5);
        forward.push(oracle);
        forward.push(vec![]);
        forward.extend(msg);
        self.queues.socket(self.oracles)?.send_multipart(forward, 0)?;
        self.update_interest()
    }

    /// Either `(oracle, empty, READY)` or `(oracle, empty, client, empty, reply)`. Both mean the
    /// oracle is free again.
    fn handle_oracle(&mut self, queue: QueueId) -> Result<(), TaskError> {
        let mut msg = self.queues.socket(queue)?.recv_multipart(0)?;
        match msg.len() {
            3 if msg[2] == READY => {
                let oracle = msg.swap_remove(0);
                if !self.ready.contains(&oracle) {
                    debug!("Oracle ready");
                    self.ready.push_back(oracle);
                }
            }
            5 => {
                let reply = msg.split_off(2);
                let oracle = msg.swap_remove(0);
                self.ready.push_back(oracle);
                self.queues.socket(self.clients)?.send_multipart(reply, 0)?;
            }
            n => warn!(parts = n, "Dropping malformed oracle message"),
        }
        self.update_interest()
    }

    fn update_interest(&mut self) -> Result<(), TaskError> {
        let interest = if self.ready.is_empty() {
            zmq::PollEvents::empty()
        } else {
            zmq::POLLIN
        };
        self.queues.set_interest(self.clients, interest)
    }
}

impl Service for Router {
    fn queues(&self) -> &Queues<Self> {
        &self.queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const CLIENTS: &str = "inproc://router-clients";
    const ORACLES: &str = "inproc://router-oracles";

    /// Run the router a cycle at a time until `done` holds, giving up after a few seconds.
    fn pump_until(router: &mut Task<Router>, mut done: impl FnMut(&Router) -> bool) -> bool {
        for _ in 0..200 {
            if done(router.service()) {
                return true;
            }
            router.poll(Duration::from_millis(20)).unwrap();
        }
        done(router.service())
    }

    /// A stand-in oracle. DEALER rather than REQ so it can say READY more than once.
    fn fake_oracle(ctx: &zmq::Context) -> zmq::Socket {
        let oracle = ctx.socket(zmq::DEALER).unwrap();
        oracle.connect(ORACLES).unwrap();
        oracle
    }

    fn send_ready(oracle: &zmq::Socket) {
        oracle.send_multipart([&b""[..], READY], 0).unwrap();
    }

    fn readable(socket: &zmq::Socket) -> bool {
        socket.poll(zmq::POLLIN, 0).unwrap() > 0
    }

    #[test]
    fn test_duplicate_ready_counts_once() {
        let ctx = zmq::Context::new();
        let mut router = Router::new(ctx.clone(), CLIENTS, ORACLES).unwrap();
        let oracle = fake_oracle(&ctx);

        send_ready(&oracle);
        send_ready(&oracle);
        assert!(pump_until(&mut router, |r| r.ready_oracles() == 1));
        // Let the second READY through as well.
        for _ in 0..5 {
            router.poll(Duration::from_millis(20)).unwrap();
        }
        assert_eq!(router.service().ready_oracles(), 1);
    }

    #[test]
    fn test_client_request_waits_for_an_oracle() {
        let ctx = zmq::Context::new();
        let mut router = Router::new(ctx.clone(), CLIENTS, ORACLES).unwrap();
        let oracle = fake_oracle(&ctx);
        let client = ctx.socket(zmq::REQ).unwrap();
        client.connect(CLIENTS).unwrap();

        client.send("ALLPKGS", 0).unwrap();
        for _ in 0..5 {
            router.poll(Duration::from_millis(20)).unwrap();
        }
        assert_eq!(router.service().ready_oracles(), 0);
        assert!(!readable(&oracle));

        // Once an oracle turns up the held request goes to it.
        send_ready(&oracle);
        assert!(pump_until(&mut router, |_| readable(&oracle)));
        let request = oracle.recv_multipart(0).unwrap();
        assert_eq!(request.len(), 4);
        assert_eq!(request[0], Vec::<u8>::new());
        assert_eq!(request[2], Vec::<u8>::new());
        assert_eq!(request[3], b"ALLPKGS".to_vec());
        assert_eq!(router.service().ready_oracles(), 0);

        // The reply finds its way back and the oracle is ready again.
        let client_id = request[1].clone();
        oracle
            .send_multipart([vec![], client_id, vec![], b"reply".to_vec()], 0)
            .unwrap();
        assert!(pump_until(&mut router, |_| readable(&client)));
        assert_eq!(client.recv_bytes(0).unwrap(), b"reply".to_vec());
        assert_eq!(router.service().ready_oracles(), 1);
    }
}
