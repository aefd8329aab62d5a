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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::address::Address;
use crate::mode::RoutingControl;
use crate::ordered_address_set::OrderedAddressSet;

/// A cached `{routers, readers, writers, ttl, last_updated}` snapshot.
///
/// There is exactly one of these per [`crate::pool::RoutingPool`]; all mutation happens through
/// [`RoutingTable::update`] or the targeted [`RoutingTable::deactivate`] /
/// [`RoutingTable::deactivate_writer`], which callers are expected to serialize under the pool's
/// refresh lock (see [`crate::pool`] module docs).
#[derive(Debug)]
pub struct RoutingTable {
    pub(crate) routers: OrderedAddressSet,
    pub(crate) readers: OrderedAddressSet,
    pub(crate) writers: OrderedAddressSet,
    ttl: Duration,
    last_updated: Instant,
}

impl RoutingTable {
    /// The initial stale table: all role sets empty, `ttl = 0`. Optionally seeded with routers
    /// known ahead of any refresh (e.g. the configured bootstrap address).
    pub fn new_stale(seed_routers: impl IntoIterator<Item = Arc<Address>>) -> Self {
        Self {
            routers: OrderedAddressSet::from_iter(seed_routers),
            readers: OrderedAddressSet::new(),
            writers: OrderedAddressSet::new(),
            ttl: Duration::ZERO,
            last_updated: Instant::now(),
        }
    }

    pub(crate) fn from_parts(
        routers: OrderedAddressSet,
        readers: OrderedAddressSet,
        writers: OrderedAddressSet,
        ttl: Duration,
    ) -> Self {
        Self {
            routers,
            readers,
            writers,
            ttl,
            last_updated: Instant::now(),
        }
    }

    pub(crate) fn servers_for_mode(&self, mode: RoutingControl) -> &OrderedAddressSet {
        match mode {
            RoutingControl::Read => &self.readers,
            RoutingControl::Write => &self.writers,
        }
    }

    /// A table is fresh for `mode` iff it hasn't expired, it still has routers, and it has at
    /// least one server for the requested role. A table with readers but no writers is fresh for
    /// READ and stale for WRITE: the "missing writer" state (see [`crate::pool`]).
    pub fn is_fresh(&self, mode: RoutingControl) -> bool {
        if self.routers.is_empty() {
            debug!("routing table stale: no routers left {:?}", self);
            return false;
        }
        if self.servers_for_mode(mode).is_empty() {
            debug!(
                "routing table stale: no servers for {:?} left {:?}",
                mode, self
            );
            return false;
        }
        if self.last_updated.elapsed() >= self.ttl {
            debug!(
                "routing table stale: ttl ({:?}) <= age ({:?}) {:?}",
                self.ttl,
                self.last_updated.elapsed(),
                self
            );
            return false;
        }
        true
    }

    /// Replaces each role set from `other` wholesale and resets `last_updated` from the
    /// *receiver's* clock, not the oracle's: this sidesteps clock skew between client and server,
    /// making the TTL a local expiry counted from the moment the client observed the snapshot.
    pub fn update(&mut self, other: RoutingTable) {
        self.routers = other.routers;
        self.readers = other.readers;
        self.writers = other.writers;
        self.ttl = other.ttl;
        self.last_updated = Instant::now();
        debug!("routing table updated: {:?}", self);
    }

    /// The union of all three role sets.
    pub fn servers(&self) -> HashSet<Arc<Address>> {
        self.routers
            .iter()
            .chain(self.readers.iter())
            .chain(self.writers.iter())
            .cloned()
            .collect()
    }

    /// Removes `addr` from all three role sets. Idempotent.
    pub fn deactivate(&mut self, addr: &Address) {
        self.routers.discard(addr);
        self.readers.discard(addr);
        self.writers.discard(addr);
    }

    /// Removes `addr` from the writer set only; routers and readers are unchanged.
    pub fn deactivate_writer(&mut self, addr: &Address) {
        self.writers.discard(addr);
    }
}
