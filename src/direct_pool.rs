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

//! The boundary between the routing core and the raw, per-address connection pool.
//!
//! Everything on the other side of [`DirectPool`] — wire handshake, message framing, record
//! decoding, TLS/auth configuration, idle connection bookkeeping — is deliberately not this
//! crate's concern (see the crate's [module docs](crate)). [`RoutingPool`](crate::pool::RoutingPool)
//! only ever calls through this trait.

use std::sync::Arc;

use crate::address::Address;
use crate::error::Result;
use crate::load_balancer::InUseConnectionCounter;
use crate::record::RoutingRecord;

/// One of the two routing oracle procedures a server may expose.
///
/// Which one to call is the single server-compatibility concern the routing core carries;
/// everything about what the procedure call looks like on the wire is up to the
/// [`Connection`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingProcedure {
    /// `dbms.cluster.routing.getRoutingTable`, servers `>= 3.2`.
    GetRoutingTable,
    /// `dbms.cluster.routing.getServers`, servers `< 3.2`.
    GetServers,
}

/// An opaque routing context forwarded to the oracle procedure, verbatim, from configuration.
///
/// The core never inspects its contents; it only threads it through to whichever
/// [`Connection::call_routing_procedure`] implementation handles the actual call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext(std::collections::HashMap<String, String>);

impl RoutingContext {
    pub fn new(entries: std::collections::HashMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &std::collections::HashMap<String, String> {
        &self.0
    }
}

impl From<std::collections::HashMap<String, String>> for RoutingContext {
    fn from(entries: std::collections::HashMap<String, String>) -> Self {
        Self(entries)
    }
}

/// A live connection to a single address, as handed out by the external [`DirectPool`].
pub trait Connection {
    /// The address this connection is bound to.
    fn address(&self) -> &Arc<Address>;

    /// Whether the server on the other end advertised support for the parameterized routing
    /// procedure (version `>= 3.2`). Version parsing itself happens outside this crate; only the
    /// yes/no answer crosses the boundary.
    fn supports_parameterized_routing(&self) -> bool;

    /// Invokes the given routing procedure and drains its single record into a
    /// [`RoutingRecord`] list. Failures reported by the server are expected to have already
    /// been turned into a [`crate::error::RoutingError::RoutingProtocol`] via
    /// [`crate::error::RoutingError::from_routing_procedure_failure`].
    fn call_routing_procedure(
        &mut self,
        procedure: RoutingProcedure,
        context: &RoutingContext,
    ) -> Result<Vec<RoutingRecord>>;

    /// Marks this connection so that a subsequent transport failure on it surfaces to the
    /// session layer as [`crate::error::RoutingError::ConnectionExpired`] rather than a generic
    /// transport error. Called once, right before the connection is handed out by
    /// [`crate::pool::RoutingPool::acquire`].
    fn mark_routing_expiry(&mut self);
}

/// The raw, per-address connection pool the routing core sits on top of.
pub trait DirectPool: InUseConnectionCounter {
    type Connection: Connection;

    /// Obtains a connection to `address`. Fails with
    /// [`crate::error::RoutingError::ServiceUnavailable`] if `address` cannot be reached.
    fn acquire_direct(&self, address: &Arc<Address>) -> Result<Self::Connection>;

    /// Drops `address` from the pool's own bookkeeping. Silently a no-op if unknown.
    fn deactivate(&self, address: &Address);

    /// Every address the pool currently knows about (has a live or idle connection to, or has
    /// reserved capacity for).
    fn known_addresses(&self) -> Vec<Arc<Address>>;
}
