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

//! The oracle: a stateless RPC responder in front of one database handle.
//!
//! Because database requests vary wildly in how long they take, clients never talk to an oracle
//! directly. Several oracles run at once, each connected with a REQ socket to the router, which
//! passes each client request to whichever oracle most recently said it was ready. Every request
//! an oracle receives gets exactly one reply: REQ/REP alternation means a missing reply would
//! leave both the oracle and the client stuck for good.

use db_rpc_common::{DbRequest, READY, Reply, Request, Value};
use farm_task::{QueueId, Queues, Service, Task, TaskError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

use crate::db::{Database, DatabaseError};

/// Outstanding message limit on an oracle's queue, so a backed-up router can't eat memory.
pub const ORACLE_HWM: i32 = 10;

static INSTANCE: AtomicUsize = AtomicUsize::new(0);

pub struct Oracle<D: Database> {
    queues: Queues<Self>,
    db: D,
}

impl<D: Database> Oracle<D> {
    /// Build an oracle task connected to the router's worker-facing `oracle_queue`. By the time
    /// this returns the oracle has already told the router it is ready.
    pub fn new(
        zmq_context: zmq::Context,
        oracle_queue: &str,
        db: D,
    ) -> Result<Task<Self>, TaskError> {
        let instance = INSTANCE.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("oracle_{instance}");
        let mut task = Task::new(
            name,
            zmq_context.clone(),
            Self {
                queues: Queues::new(),
                db,
            },
        )?;

        let db_queue = zmq_context.socket(zmq::REQ)?;
        db_queue.set_sndhwm(ORACLE_HWM)?;
        db_queue.set_rcvhwm(ORACLE_HWM)?;
        db_queue.connect(oracle_queue)?;
        let queue = task
            .service_mut()
            .queues
            .register(db_queue, Self::handle_db_request);
        task.service().queues.socket(queue)?.send(READY, 0)?;
        info!(oracle = task.name(), endpoint = oracle_queue, "Oracle ready");
        Ok(task)
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Handle one routed request: `(client address, empty delimiter, payload)`. The envelope goes
    /// back untouched ahead of the reply so the router can find the client again.
    fn handle_db_request(&mut self, queue: QueueId) -> Result<(), TaskError> {
        let mut parts = self.queues.socket(queue)?.recv_multipart(0)?;
        let payload = parts.pop().unwrap_or_default();
        let mut envelope = parts;

        let reply = if envelope.len() < 2 {
            warn!(
                parts = envelope.len() + 1,
                "Received request without a routing envelope"
            );
            Reply::Err("malformed request envelope".to_string())
        } else {
            self.answer(&payload)
        };

        // REP *must* send a reply even when stuff goes wrong, otherwise the send/recv cycle that
        // REQ/REP depends upon breaks.
        let reply = reply
            .encode()
            .or_else(|e| Reply::Err(e.to_string()).encode())
            .map_err(TaskError::handler)?;
        envelope.push(reply);
        self.queues.socket(queue)?.send_multipart(envelope, 0)?;
        Ok(())
    }

    fn answer(&mut self, payload: &[u8]) -> Reply {
        let request = match Request::decode(payload).and_then(DbRequest::try_from) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejecting db request");
                return Reply::Err(e.to_string());
            }
        };
        let command = request.command();
        debug!(%command, "Handling db request");

        let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(request)));
        match result {
            Ok(Ok(value)) => Reply::Ok(value),
            Ok(Err(e)) => {
                error!(%command, error = %e, "Error handling db request");
                Reply::Err(e.to_string())
            }
            Err(_) => {
                error!(%command, "Panic handling db request");
                Reply::Err(format!("internal error handling {command}"))
            }
        }
    }

    fn dispatch(&mut self, request: DbRequest) -> Result<Value, DatabaseError> {
        let db = &mut self.db;
        match request {
            DbRequest::AllPackages => db.get_all_packages().map(Value::from),
            DbRequest::AllPackageVersions => db.get_all_package_versions().map(Value::from),
            DbRequest::NewPackage(package) => db.add_new_package(&package).map(Value::from),
            DbRequest::NewPackageVersion(package, version) => db
                .add_new_package_version(&package, &version)
                .map(Value::from),
            DbRequest::LogDownload(download) => db.log_download(&download).map(Value::from),
            DbRequest::LogBuild(mut build) => {
                db.log_build(&mut build)?;
                build.build_id.map(Value::Int).ok_or_else(|| {
                    DatabaseError::Unavailable("no build id was assigned".to_string())
                })
            }
            DbRequest::PackageFiles(package) => db.get_package_files(&package).map(Value::from),
            DbRequest::PackageExists(package, version) => db
                .test_package_version(&package, &version)
                .map(Value::from),
            DbRequest::GetAbis => db.get_build_abis().map(Value::from),
            DbRequest::GetPypiSerial => db.get_pypi_serial().map(Value::from),
            DbRequest::SetPypiSerial(serial) => db.set_pypi_serial(serial).map(Value::from),
            DbRequest::GetStatistics => db.get_statistics().map(Value::from),
        }
    }
}

impl<D: Database> Service for Oracle<D> {
    fn queues(&self) -> &Queues<Self> {
        &self.queues
    }
}
