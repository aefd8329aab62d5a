// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

use crate::mode::RoutingControl;

/// Errors produced by the routing core.
///
/// **Important Notes on Usage:**
///  * Error messages are *not* considered part of the crate's API.
///    They may change at any time and don't follow semantic versioning.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RoutingError {
    /// The oracle procedure returned a reply that could not be turned into a routing table:
    /// wrong record count, missing/mistyped fields, or an unparsable address.
    #[error("failed to parse routing table: {reason}")]
    #[non_exhaustive]
    RoutingProtocol { reason: String },

    /// A direct connection to an address could not be established.
    #[error("could not reach {address}: {message}")]
    #[non_exhaustive]
    ServiceUnavailable { address: String, message: String },

    /// No refresh candidate router yielded a usable routing table.
    #[error("Unable to retrieve routing information")]
    RoutingTableUnavailable,

    /// `acquire(mode)` could not hand out a connection for the requested mode.
    #[error("Failed to obtain connection towards '{mode:?}' server.")]
    ConnectionExpired { mode: RoutingControl },
}

impl RoutingError {
    pub(crate) fn routing_protocol<S: Into<String>>(reason: S) -> Self {
        Self::RoutingProtocol {
            reason: reason.into(),
        }
    }

    pub(crate) fn service_unavailable<A: Into<String>, M: Into<String>>(
        address: A,
        message: M,
    ) -> Self {
        Self::ServiceUnavailable {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Turns a server-reported failure from invoking the routing procedure itself into the
    /// [`RoutingError::RoutingProtocol`] the core surfaces for it, distinguishing the
    /// well-known "procedure doesn't exist" code from everything else.
    pub fn from_routing_procedure_failure(err: &ServerError) -> Self {
        if err.is_procedure_not_found() {
            Self::routing_protocol("server does not support routing")
        } else {
            Self::routing_protocol(format!("routing procedure failed: {}", err.code()))
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// An error code and message as reported by the cluster on a live connection.
///
/// Only the subset of server errors relevant to routing is modeled here: whether a failure
/// should deactivate the server entirely, demote it from the writer set, or disqualify it as a
/// usable router candidate during discovery. Everything about transport framing and the rest of
/// the server's error taxonomy is out of scope for this crate.
#[derive(Debug, Clone)]
pub struct ServerError {
    code: String,
}

impl ServerError {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// `true` for errors that mean the node is gone and every role set should forget it.
    pub fn deactivates_server(&self) -> bool {
        matches!(
            self.code(),
            "Neo.TransientError.General.DatabaseUnavailable" | "Neo.ClientError.General.ServiceUnavailable"
        )
    }

    /// `true` for errors that mean a write was attempted on a server that isn't (or is no
    /// longer) the leader.
    pub fn invalidates_writer(&self) -> bool {
        matches!(
            self.code(),
            "Neo.ClientError.Cluster.NotALeader"
                | "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase"
        )
    }

    /// `true` for the well-known code the server returns when the routing procedure itself
    /// doesn't exist (pre-3.2 server queried with the wrong procedure name, or routing disabled).
    pub fn is_procedure_not_found(&self) -> bool {
        self.code() == "Neo.ClientError.Procedure.ProcedureNotFound"
    }
}

/// A failure observed on a connection that was already handed out through [`crate::pool`].
///
/// This is the input to [`crate::pool::RoutingPool::handle`]: the mapping from "what went wrong"
/// to "what to do about the cache" (see the crate's error-handling notes).
#[derive(Debug, Clone)]
pub enum ConnectionFailure {
    /// A coded failure reported by the server on an otherwise live connection.
    Server(ServerError),
    /// The connection itself is gone: expired, or the database/service is unavailable.
    Transport,
}
