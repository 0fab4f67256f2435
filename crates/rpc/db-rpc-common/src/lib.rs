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

//! Common entities for the 0MQ request/reply protocol between `DbClient`s and the oracle pool.
//!
//! A request is a command name plus positional [`Value`] arguments; a reply is either `Ok` with a
//! value or `Err` with a description. Both travel bincode-encoded, one frame per message.

mod command;
mod errors;
mod messages;
mod records;
mod value;

pub use command::Command;
pub use errors::{ProtocolError, RpcError};
pub use messages::{DbRequest, MAX_MESSAGE_BYTES, Reply, Request};
pub use records::{BuildRecord, DownloadRecord, FileRecord};
pub use value::{FromValue, Value, ValueError};

/// Sentinel an oracle sends to the router as soon as it connects, and the router uses to put it on
/// its ready list.
pub const READY: &[u8] = b"READY";

/// Where the router listens for oracles.
pub const DEFAULT_ORACLE_QUEUE: &str = "inproc://oracle";

/// Where the router listens for `DbClient`s.
pub const DEFAULT_DB_QUEUE: &str = "ipc:///tmp/farm-db-queue";
