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

use thiserror::Error;

use crate::command::Command;
use crate::value::ValueError;

/// Errors seen by an RPC caller: either the transport let it down, or the oracle answered `Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("could not send RPC request: {0}")]
    CouldNotSend(String),
    #[error("could not receive RPC response: {0}")]
    CouldNotReceive(String),
    #[error("could not decode RPC response: {0}")]
    CouldNotDecode(String),
    /// The oracle replied `Err`. Only the description survives the trip.
    #[error("operation failed: {0}")]
    Failed(String),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Problems turning bytes into a well-formed request (or back). On the oracle side every one of
/// these becomes an `Err` reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("could not encode message: {0}")]
    Encode(String),
    #[error("could not decode message: {0}")]
    Decode(String),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{command} takes {expected} argument(s), got {found}")]
    ArgumentCount {
        command: Command,
        expected: usize,
        found: usize,
    },
    #[error("{command} argument {position}: {error}")]
    BadArgument {
        command: Command,
        position: usize,
        error: ValueError,
    },
}
