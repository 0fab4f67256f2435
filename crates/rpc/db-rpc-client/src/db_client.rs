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

use db_rpc_common::{
    BuildRecord, DbRequest, DownloadRecord, FileRecord, FromValue, Reply, Request, RpcError, Value,
};
use once_cell::unsync::OnceCell;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{error, warn};
use zmq::Socket;

use crate::statistics::{Statistics, StatisticsShape};

/// RPC client for the oracle pool. Talks REQ/REP to the router's client-facing endpoint, so there
/// is at most one request outstanding per client; every call takes `&mut self` to keep it that way.
pub struct DbClient {
    zmq_context: zmq::Context,
    endpoint: String,
    recv_timeout: Option<Duration>,
    // Note: this becomes None while a request is in flight, and is replaced with Some() as the
    // response is received.
    db_queue: Option<Socket>,
    statistics_shape: OnceCell<StatisticsShape>,
}

impl DbClient {
    /// A client that waits as long as it takes for each reply.
    pub fn new(zmq_context: zmq::Context, endpoint: &str) -> Result<Self, RpcError> {
        Self::build(zmq_context, endpoint, None)
    }

    /// A client that gives up on a reply after `recv_timeout`. The REQ socket is replaced after a
    /// timeout, so the client stays usable.
    pub fn with_recv_timeout(
        zmq_context: zmq::Context,
        endpoint: &str,
        recv_timeout: Duration,
    ) -> Result<Self, RpcError> {
        Self::build(zmq_context, endpoint, Some(recv_timeout))
    }

    fn build(
        zmq_context: zmq::Context,
        endpoint: &str,
        recv_timeout: Option<Duration>,
    ) -> Result<Self, RpcError> {
        let db_queue = Self::connect(&zmq_context, endpoint, recv_timeout)?;
        Ok(Self {
            zmq_context,
            endpoint: endpoint.to_string(),
            recv_timeout,
            db_queue: Some(db_queue),
            statistics_shape: OnceCell::new(),
        })
    }

    fn connect(
        zmq_context: &zmq::Context,
        endpoint: &str,
        recv_timeout: Option<Duration>,
    ) -> Result<Socket, RpcError> {
        let setup = || -> Result<Socket, zmq::Error> {
            let socket = zmq_context.socket(zmq::REQ)?;
            socket.set_sndhwm(1)?;
            socket.set_linger(0)?;
            if let Some(timeout) = recv_timeout {
                socket.set_rcvtimeo(i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX))?;
            }
            socket.connect(endpoint)?;
            Ok(socket)
        };
        setup().map_err(|e| RpcError::CouldNotSend(format!("unable to connect {endpoint}: {e}")))
    }

    /// Send `request` and wait for its reply.
    pub fn execute(&mut self, request: DbRequest) -> Result<Value, RpcError> {
        self.execute_raw(request.into())
    }

    /// Send an arbitrary request, known command or not, and wait for its reply. An `Err` reply
    /// comes back as `RpcError::Failed`.
    pub fn execute_raw(&mut self, request: Request) -> Result<Value, RpcError> {
        let payload = request
            .encode()
            .map_err(|e| RpcError::CouldNotSend(e.to_string()))?;
        let db_queue = self.db_queue.take().ok_or(RpcError::CouldNotSend(
            "RPC request socket not initialized".to_string(),
        ))?;

        // If sending would block we're either shutting down or the router is swamped; either way
        // fail now rather than wait.
        if let Err(e) = db_queue.send(payload, zmq::DONTWAIT) {
            error!(command = %request.command, error = %e, "Unable to send RPC request");
            // Nothing went out, so the socket is still ready to send.
            self.db_queue = Some(db_queue);
            return Err(RpcError::CouldNotSend(e.to_string()));
        }

        let parts = match db_queue.recv_multipart(0) {
            Ok(parts) => parts,
            Err(e) => {
                error!(command = %request.command, error = %e, "Unable to receive RPC reply");
                drop(db_queue);
                self.reconnect();
                return Err(RpcError::CouldNotReceive(e.to_string()));
            }
        };
        self.db_queue = Some(db_queue);

        let [reply] = parts.as_slice() else {
            return Err(RpcError::CouldNotReceive(format!(
                "unexpected message length {}",
                parts.len()
            )));
        };
        match Reply::decode(reply).map_err(|e| RpcError::CouldNotDecode(e.to_string()))? {
            Reply::Ok(value) => Ok(value),
            Reply::Err(description) => Err(RpcError::Failed(description)),
        }
    }

    /// A REQ socket that missed its reply can't send again, so swap in a fresh one.
    fn reconnect(&mut self) {
        match Self::connect(&self.zmq_context, &self.endpoint, self.recv_timeout) {
            Ok(socket) => self.db_queue = Some(socket),
            Err(e) => warn!(error = %e, "Unable to replace RPC request socket"),
        }
    }

    fn call<T: FromValue>(&mut self, request: DbRequest) -> Result<T, RpcError> {
        let command = request.command();
        let value = self.execute(request)?;
        T::from_value(value).map_err(|e| RpcError::UnexpectedReply(format!("{command}: {e}")))
    }

    pub fn get_all_packages(&mut self) -> Result<BTreeSet<String>, RpcError> {
        self.call(DbRequest::AllPackages)
    }

    pub fn get_all_package_versions(&mut self) -> Result<BTreeSet<(String, String)>, RpcError> {
        self.call(DbRequest::AllPackageVersions)
    }

    /// Returns true if the package was not already known.
    pub fn add_new_package(&mut self, package: &str) -> Result<bool, RpcError> {
        self.call(DbRequest::NewPackage(package.to_string()))
    }

    /// Returns true if the version was not already known.
    pub fn add_new_package_version(
        &mut self,
        package: &str,
        version: &str,
    ) -> Result<bool, RpcError> {
        self.call(DbRequest::NewPackageVersion(
            package.to_string(),
            version.to_string(),
        ))
    }

    pub fn test_package_version(&mut self, package: &str, version: &str) -> Result<bool, RpcError> {
        self.call(DbRequest::PackageExists(
            package.to_string(),
            version.to_string(),
        ))
    }

    pub fn log_download(&mut self, download: &DownloadRecord) -> Result<(), RpcError> {
        self.call(DbRequest::LogDownload(download.clone()))
    }

    /// Log `build`, and on success stamp it with the id the database assigned.
    pub fn log_build(&mut self, build: &mut BuildRecord) -> Result<(), RpcError> {
        let build_id = self.call(DbRequest::LogBuild(build.clone()))?;
        build.logged(build_id);
        Ok(())
    }

    pub fn get_package_files(&mut self, package: &str) -> Result<Vec<FileRecord>, RpcError> {
        self.call(DbRequest::PackageFiles(package.to_string()))
    }

    pub fn get_build_abis(&mut self) -> Result<Vec<String>, RpcError> {
        self.call(DbRequest::GetAbis)
    }

    pub fn get_pypi_serial(&mut self) -> Result<i64, RpcError> {
        self.call(DbRequest::GetPypiSerial)
    }

    pub fn set_pypi_serial(&mut self, serial: i64) -> Result<(), RpcError> {
        self.call(DbRequest::SetPypiSerial(serial))
    }

    /// The latest statistics snapshot. Field names are expected to be identical on every call; the
    /// first reply fixes them for the life of this client.
    pub fn get_statistics(&mut self) -> Result<Statistics, RpcError> {
        let pairs: Vec<(String, Value)> = self.call(DbRequest::GetStatistics)?;
        let (fields, values): (Vec<String>, Vec<Value>) = pairs.into_iter().unzip();
        let shape = self
            .statistics_shape
            .get_or_init(|| StatisticsShape::new(fields.iter().cloned()));
        if shape.fields() != fields.as_slice() {
            return Err(RpcError::UnexpectedReply(format!(
                "statistics fields changed from {:?} to {:?}",
                shape.fields(),
                fields
            )));
        }
        Ok(Statistics::new(shape.clone(), values))
    }
}
