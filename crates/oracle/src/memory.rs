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

//! An in-memory database. Every `MemoryDatabase` handle connected to the same `MemoryStore` sees
//! the same data, much as separate connections to one server would.

use db_rpc_common::{BuildRecord, DownloadRecord, FileRecord, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

use crate::db::{Database, DatabaseError};

/// Field names of a statistics snapshot, in reply order.
pub const STATISTICS_FIELDS: [&str; 7] = [
    "packages_count",
    "versions_count",
    "builds_count",
    "builds_success",
    "files_count",
    "downloads_count",
    "pypi_serial",
];

#[derive(Default)]
struct State {
    packages: BTreeSet<String>,
    versions: BTreeSet<(String, String)>,
    builds: Vec<BuildRecord>,
    // filename -> (package, file); rebuilding a wheel replaces its record.
    files: BTreeMap<String, (String, FileRecord)>,
    downloads: Vec<DownloadRecord>,
    build_abis: Vec<String>,
    pypi_serial: i64,
    last_build_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new(build_abis: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                build_abis,
                ..Default::default()
            })),
        }
    }

    /// A fresh handle onto the store, for exactly one oracle.
    pub fn connect(&self) -> MemoryDatabase {
        MemoryDatabase {
            state: self.state.clone(),
        }
    }
}

pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    /// The shared state. Every operation leaves it consistent up to its last write, so a lock
    /// poisoned by a panicking handle is taken back.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering in-memory store after a panic");
            self.state.clear_poison();
            PoisonError::into_inner(poisoned)
        })
    }
}

impl Database for MemoryDatabase {
    fn get_all_packages(&mut self) -> Result<BTreeSet<String>, DatabaseError> {
        Ok(self.state().packages.clone())
    }

    fn get_all_package_versions(&mut self) -> Result<BTreeSet<(String, String)>, DatabaseError> {
        Ok(self.state().versions.clone())
    }

    fn add_new_package(&mut self, package: &str) -> Result<bool, DatabaseError> {
        Ok(self.state().packages.insert(package.to_string()))
    }

    fn add_new_package_version(
        &mut self,
        package: &str,
        version: &str,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state();
        if !state.packages.contains(package) {
            return Err(DatabaseError::UnknownPackage(package.to_string()));
        }
        Ok(state
            .versions
            .insert((package.to_string(), version.to_string())))
    }

    fn log_download(&mut self, download: &DownloadRecord) -> Result<(), DatabaseError> {
        let mut state = self.state();
        if !state.files.contains_key(&download.filename) {
            return Err(DatabaseError::UnknownFile(download.filename.clone()));
        }
        state.downloads.push(download.clone());
        Ok(())
    }

    fn log_build(&mut self, build: &mut BuildRecord) -> Result<(), DatabaseError> {
        let mut state = self.state();
        let key = (build.package.clone(), build.version.clone());
        if !state.versions.contains(&key) {
            return Err(DatabaseError::UnknownVersion(key.0, key.1));
        }
        state.last_build_id += 1;
        build.logged(state.last_build_id);
        if build.status {
            for file in &build.files {
                state
                    .files
                    .insert(file.filename.clone(), (build.package.clone(), file.clone()));
            }
        }
        state.builds.push(build.clone());
        Ok(())
    }

    fn get_package_files(&mut self, package: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        Ok(self
            .state()
            .files
            .values()
            .filter(|(owner, _)| owner == package)
            .map(|(_, file)| file.clone())
            .collect())
    }

    fn test_package_version(
        &mut self,
        package: &str,
        version: &str,
    ) -> Result<bool, DatabaseError> {
        Ok(self
            .state()
            .versions
            .contains(&(package.to_string(), version.to_string())))
    }

    fn get_build_abis(&mut self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.state().build_abis.clone())
    }

    fn get_pypi_serial(&mut self) -> Result<i64, DatabaseError> {
        Ok(self.state().pypi_serial)
    }

    fn set_pypi_serial(&mut self, serial: i64) -> Result<(), DatabaseError> {
        self.state().pypi_serial = serial;
        Ok(())
    }

    fn get_statistics(&mut self) -> Result<Vec<(String, Value)>, DatabaseError> {
        let state = self.state();
        let count = |n: usize| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));
        let values = [
            count(state.packages.len()),
            count(state.versions.len()),
            count(state.builds.len()),
            count(state.builds.iter().filter(|b| b.status).count()),
            count(state.files.len()),
            count(state.downloads.len()),
            Value::Int(state.pypi_serial),
        ];
        Ok(STATISTICS_FIELDS
            .iter()
            .map(|f| f.to_string())
            .zip(values)
            .collect())
    }
}
