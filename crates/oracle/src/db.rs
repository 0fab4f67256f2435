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

use db_rpc_common::{BuildRecord, DownloadRecord, FileRecord, Value};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DatabaseError {
    #[error("unknown package {0}")]
    UnknownPackage(String),
    #[error("unknown version {1} of package {0}")]
    UnknownVersion(String, String),
    #[error("unknown file {0}")]
    UnknownFile(String),
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// What an oracle needs from the database. One handle per oracle; handles are never shared, which
/// is why everything takes `&mut self`.
pub trait Database: Send {
    fn get_all_packages(&mut self) -> Result<BTreeSet<String>, DatabaseError>;

    fn get_all_package_versions(&mut self) -> Result<BTreeSet<(String, String)>, DatabaseError>;

    /// Returns false if the package already existed.
    fn add_new_package(&mut self, package: &str) -> Result<bool, DatabaseError>;

    /// Returns false if the version already existed.
    fn add_new_package_version(
        &mut self,
        package: &str,
        version: &str,
    ) -> Result<bool, DatabaseError>;

    /// Fails if the downloaded file was never produced by a logged build.
    fn log_download(&mut self, download: &DownloadRecord) -> Result<(), DatabaseError>;

    /// Store the build and stamp it with its new id (via `BuildRecord::logged`).
    fn log_build(&mut self, build: &mut BuildRecord) -> Result<(), DatabaseError>;

    fn get_package_files(&mut self, package: &str) -> Result<Vec<FileRecord>, DatabaseError>;

    fn test_package_version(&mut self, package: &str, version: &str)
    -> Result<bool, DatabaseError>;

    fn get_build_abis(&mut self) -> Result<Vec<String>, DatabaseError>;

    fn get_pypi_serial(&mut self) -> Result<i64, DatabaseError>;

    fn set_pypi_serial(&mut self, serial: i64) -> Result<(), DatabaseError>;

    /// The latest statistics as ordered `(field, value)` pairs.
    fn get_statistics(&mut self) -> Result<Vec<(String, Value)>, DatabaseError>;
}
