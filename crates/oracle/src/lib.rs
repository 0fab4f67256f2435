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

//! The database side of the build farm's RPC layer.
//!
//! Many [`Oracle`] tasks run side by side, each with its own [`Database`] handle, all connected to
//! one [`Router`] that hands each client request to whichever oracle said it was ready first.

mod db;
mod memory;
mod oracle;
mod router;

pub use db::{Database, DatabaseError};
pub use memory::{MemoryDatabase, MemoryStore, STATISTICS_FIELDS};
pub use oracle::{ORACLE_HWM, Oracle};
pub use router::Router;
