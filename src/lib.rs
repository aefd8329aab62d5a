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

#![doc(test(attr(deny(dead_code))))]
#![doc(test(attr(deny(unused))))]

//! # Neo4j Cluster Routing
//!
//! This crate implements the cluster-aware routing layer of a Bolt driver for Neo4j: the part
//! that decides *which server* a piece of work should go to in a clustered deployment, as opposed
//! to the wire protocol, transport, or raw connection pool that carries it there.
//!
//! A client opens sessions against a logical cluster and must be routed transparently to the
//! right physical server: read-only work to any replica, read-write work to the current leader.
//! The cluster exposes this topology through a routing procedure — a server-side call returning a
//! single record with per-role address lists and a TTL. This crate caches that reply, refreshes it
//! against a rotating set of router candidates, picks servers from the cache by a load-balancing
//! policy, and reacts to connection- and role-level failures by invalidating whatever cache
//! entries caused them.
//!
//! What this crate does *not* do: the wire protocol handshake, message framing, record decoding,
//! the raw per-address connection pool (acquire/release/idle bookkeeping), address resolution
//! policy (e.g. DNS), TLS/auth configuration, or retrying the unit of work itself. Those are the
//! concern of the [`direct_pool::DirectPool`] and [`direct_pool::Connection`] implementations a
//! caller supplies, and of the session layer above this crate.
//!
//! ## Oracle reply shape
//! The routing procedure returns exactly one record with two fields:
//! * `ttl`: a non-negative integer, in seconds.
//! * `servers`: a list of `{role, addresses}` entries. Recognised roles are `ROUTE`, `READ`, and
//!   `WRITE`; any other role is silently ignored for forward compatibility. Addresses are
//!   `host[:port]`, with a default port applied when absent.
//!
//! Two procedure variants exist depending on server version: `dbms.cluster.routing.getRoutingTable`
//! (>= 3.2, takes a routing context) and `dbms.cluster.routing.getServers` (older servers, no
//! arguments). Choosing between them is the one server-compatibility concern this crate carries;
//! see [`direct_pool::Connection::supports_parameterized_routing`].
//!
//! ## Concepts
//!
//! ### [`routing_table::RoutingTable`]
//! The cached `{routers, readers, writers, ttl, last_updated}` snapshot. Freshness is mode-scoped:
//! a table can be fresh for reads while stale for writes, which happens during a leader election
//! (see [`pool`] module docs for how that "missing writer" window is handled).
//!
//! ### [`pool::RoutingPool`]
//! The orchestrator. Owns the single [`routing_table::RoutingTable`] instance, drives its refresh
//! under a single-flight lock, and serves [`pool::RoutingPool::acquire`] on top of an external
//! [`direct_pool::DirectPool`].
//!
//! ### [`load_balancer::LoadBalancer`]
//! Picks a reader or writer from a role set using least-in-use-connections with a round-robin
//! tie-break, so uniform load rotates evenly and skewed load favours the least busy server.
//!
//! ## Logging
//! This crate uses the [`log`] crate for logging.
//!
//! **Important Notes on Usage:**
//!  * Log messages are *not* considered part of the crate's API. They may change at any time and
//!    don't follow semantic versioning.
//!  * Log levels `WARN` and above indicate problems within the routing core itself (e.g. all
//!    router candidates exhausted). Anything the caller needs to react to is reported through
//!    [`error::RoutingError`], not a log message.

mod address;
mod direct_pool;
mod error;
mod load_balancer;
mod mode;
mod ordered_address_set;
mod parser;
mod pool;
mod record;
mod routing_table;

pub use address::Address;
pub use direct_pool::{Connection, DirectPool, RoutingContext, RoutingProcedure};
pub use error::{ConnectionFailure, Result, RoutingError, ServerError};
pub use load_balancer::InUseConnectionCounter;
pub use mode::RoutingControl;
pub use pool::RoutingPool;
pub use record::{RecordValue, RoutingRecord};
pub use routing_table::RoutingTable;

mod private {
    // Trait to prevent traits from being implemented outside of this crate.
    #[allow(dead_code)]
    pub trait Sealed {}
}
