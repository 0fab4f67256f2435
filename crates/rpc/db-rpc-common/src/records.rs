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
use std::time::{Duration, SystemTime};

/// One wheel produced by a build.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct FileRecord {
    pub filename: String,
    pub filesize: u64,
    pub filehash: String,
    pub package_tag: String,
    pub package_version_tag: String,
    pub py_version_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

/// The outcome of one build attempt, as reported by a build slave.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct BuildRecord {
    pub slave_id: i64,
    pub package: String,
    pub version: String,
    pub abi_tag: String,
    pub status: bool,
    pub duration: Duration,
    pub output: String,
    pub files: Vec<FileRecord>,
    /// Assigned by the database when the build is logged.
    pub build_id: Option<i64>,
}

impl BuildRecord {
    pub fn new(
        slave_id: i64,
        package: impl Into<String>,
        version: impl Into<String>,
        abi_tag: impl Into<String>,
    ) -> Self {
        Self {
            slave_id,
            package: package.into(),
            version: version.into(),
            abi_tag: abi_tag.into(),
            status: false,
            duration: Duration::ZERO,
            output: String::new(),
            files: vec![],
            build_id: None,
        }
    }

    /// Record the id the database gave this build.
    pub fn logged(&mut self, build_id: i64) {
        self.build_id = Some(build_id);
    }

    pub fn is_logged(&self) -> bool {
        self.build_id.is_some()
    }
}

/// A wheel download observed in the web server's logs.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct DownloadRecord {
    pub filename: String,
    pub host: String,
    pub timestamp: SystemTime,
    pub arch: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub py_name: Option<String>,
    pub py_version: Option<String>,
}

impl DownloadRecord {
    pub fn new(filename: impl Into<String>, host: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            filename: filename.into(),
            host: host.into(),
            timestamp,
            arch: None,
            os_name: None,
            os_version: None,
            py_name: None,
            py_version: None,
        }
    }
}
