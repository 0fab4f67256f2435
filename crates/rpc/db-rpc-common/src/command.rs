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

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The fixed set of commands an oracle answers. The wire carries the name as a string; anything
/// that doesn't parse into one of these is rejected by the oracle.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum Command {
    #[strum(serialize = "ALLPKGS")]
    AllPackages,
    #[strum(serialize = "ALLVERS")]
    AllPackageVersions,
    #[strum(serialize = "NEWPKG")]
    NewPackage,
    #[strum(serialize = "NEWVER")]
    NewPackageVersion,
    #[strum(serialize = "LOGDOWNLOAD")]
    LogDownload,
    #[strum(serialize = "LOGBUILD")]
    LogBuild,
    #[strum(serialize = "PKGFILES")]
    PackageFiles,
    #[strum(serialize = "PKGEXISTS")]
    PackageExists,
    #[strum(serialize = "GETABIS")]
    GetAbis,
    #[strum(serialize = "GETPYPI")]
    GetPypiSerial,
    #[strum(serialize = "SETPYPI")]
    SetPypiSerial,
    #[strum(serialize = "GETSTATS")]
    GetStatistics,
}

impl Command {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Number of positional arguments the command takes.
    pub fn arity(self) -> usize {
        match self {
            Command::AllPackages
            | Command::AllPackageVersions
            | Command::GetAbis
            | Command::GetPypiSerial
            | Command::GetStatistics => 0,
            Command::NewPackage
            | Command::LogDownload
            | Command::LogBuild
            | Command::PackageFiles
            | Command::SetPypiSerial => 1,
            Command::NewPackageVersion | Command::PackageExists => 2,
        }
    }
}
