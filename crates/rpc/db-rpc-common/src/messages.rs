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
use std::str::FromStr;

use crate::command::Command;
use crate::errors::ProtocolError;
use crate::records::{BuildRecord, DownloadRecord};
use crate::value::{FromValue, Value};

/// Largest message either side will decode. Length prefixes claiming more are rejected before
/// anything is allocated.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// A request as it travels: a command name and its positional arguments.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct Request {
    pub command: String,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(command: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::decode_from_slice(
            bytes,
            bincode::config::standard().with_limit::<MAX_MESSAGE_BYTES>(),
        )
            .map(|(request, _)| request)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// The status envelope every request gets back, exactly once.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub enum Reply {
    Ok(Value),
    Err(String),
}

impl Reply {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::decode_from_slice(
            bytes,
            bincode::config::standard().with_limit::<MAX_MESSAGE_BYTES>(),
        )
            .map(|(reply, _)| reply)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

impl<E: std::fmt::Display> From<Result<Value, E>> for Reply {
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(e) => Reply::Err(e.to_string()),
        }
    }
}

/// A decoded, type-checked request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DbRequest {
    AllPackages,
    AllPackageVersions,
    NewPackage(String),
    NewPackageVersion(String, String),
    LogDownload(DownloadRecord),
    LogBuild(BuildRecord),
    PackageFiles(String),
    PackageExists(String, String),
    GetAbis,
    GetPypiSerial,
    SetPypiSerial(i64),
    GetStatistics,
}

impl DbRequest {
    pub fn command(&self) -> Command {
        match self {
            DbRequest::AllPackages => Command::AllPackages,
            DbRequest::AllPackageVersions => Command::AllPackageVersions,
            DbRequest::NewPackage(_) => Command::NewPackage,
            DbRequest::NewPackageVersion(..) => Command::NewPackageVersion,
            DbRequest::LogDownload(_) => Command::LogDownload,
            DbRequest::LogBuild(_) => Command::LogBuild,
            DbRequest::PackageFiles(_) => Command::PackageFiles,
            DbRequest::PackageExists(..) => Command::PackageExists,
            DbRequest::GetAbis => Command::GetAbis,
            DbRequest::GetPypiSerial => Command::GetPypiSerial,
            DbRequest::SetPypiSerial(_) => Command::SetPypiSerial,
            DbRequest::GetStatistics => Command::GetStatistics,
        }
    }
}

impl From<DbRequest> for Request {
    fn from(request: DbRequest) -> Self {
        let command = request.command().name();
        let args = match request {
            DbRequest::AllPackages
            | DbRequest::AllPackageVersions
            | DbRequest::GetAbis
            | DbRequest::GetPypiSerial
            | DbRequest::GetStatistics => vec![],
            DbRequest::NewPackage(package) | DbRequest::PackageFiles(package) => {
                vec![package.into()]
            }
            DbRequest::NewPackageVersion(package, version)
            | DbRequest::PackageExists(package, version) => vec![package.into(), version.into()],
            DbRequest::LogDownload(download) => vec![download.into()],
            DbRequest::LogBuild(build) => vec![build.into()],
            DbRequest::SetPypiSerial(serial) => vec![serial.into()],
        };
        Request::new(command, args)
    }
}

/// Hands out a request's arguments in order, converting each and noting its position on failure.
struct Args {
    command: Command,
    position: usize,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn new(command: Command, values: Vec<Value>) -> Result<Self, ProtocolError> {
        let expected = command.arity();
        if values.len() != expected {
            return Err(ProtocolError::ArgumentCount {
                command,
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            command,
            position: 0,
            values: values.into_iter(),
        })
    }

    fn next<T: FromValue>(&mut self) -> Result<T, ProtocolError> {
        self.position += 1;
        // Arity was checked up front.
        let value = self.values.next().unwrap_or(Value::None);
        T::from_value(value).map_err(|error| ProtocolError::BadArgument {
            command: self.command,
            position: self.position,
            error,
        })
    }
}

impl TryFrom<Request> for DbRequest {
    type Error = ProtocolError;

    fn try_from(request: Request) -> Result<Self, Self::Error> {
        let command = Command::from_str(&request.command)
            .map_err(|_| ProtocolError::UnknownCommand(request.command.clone()))?;
        let mut args = Args::new(command, request.args)?;
        let request = match command {
            Command::AllPackages => DbRequest::AllPackages,
            Command::AllPackageVersions => DbRequest::AllPackageVersions,
            Command::NewPackage => DbRequest::NewPackage(args.next()?),
            Command::NewPackageVersion => DbRequest::NewPackageVersion(args.next()?, args.next()?),
            Command::LogDownload => DbRequest::LogDownload(args.next()?),
            Command::LogBuild => DbRequest::LogBuild(args.next()?),
            Command::PackageFiles => DbRequest::PackageFiles(args.next()?),
            Command::PackageExists => DbRequest::PackageExists(args.next()?, args.next()?),
            Command::GetAbis => DbRequest::GetAbis,
            Command::GetPypiSerial => DbRequest::GetPypiSerial,
            Command::SetPypiSerial => DbRequest::SetPypiSerial(args.next()?),
            Command::GetStatistics => DbRequest::GetStatistics,
        };
        Ok(request)
    }
}
