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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::address::Address;
use crate::ordered_address_set::OrderedAddressSet;

/// Picks a server from a role set by least-in-use-connections, with round-robin tie-break.
///
/// Keeps one monotonically increasing offset per role. Offsets are plain atomics: a lost update
/// under contention produces at most an off-by-one in the starting point of the ring walk, never
/// an incorrect selection, so no further synchronization is needed (see
/// [`crate::pool`] module docs on the concurrency model).
#[derive(Debug, Default)]
pub struct LoadBalancer {
    readers_offset: AtomicUsize,
    writers_offset: AtomicUsize,
}

/// Reports how many connections are currently checked out to a given address. Implemented by
/// whatever owns the direct, per-address connection pool; the load balancer only ever reads it.
pub trait InUseConnectionCounter {
    fn in_use_connection_count(&self, address: &Address) -> usize;
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_reader(
        &self,
        addresses: &OrderedAddressSet,
        counter: &impl InUseConnectionCounter,
    ) -> Option<Arc<Address>> {
        let offset = self.readers_offset.fetch_add(1, Ordering::Relaxed);
        Self::select(offset, addresses, counter)
    }

    pub fn select_writer(
        &self,
        addresses: &OrderedAddressSet,
        counter: &impl InUseConnectionCounter,
    ) -> Option<Arc<Address>> {
        let offset = self.writers_offset.fetch_add(1, Ordering::Relaxed);
        Self::select(offset, addresses, counter)
    }

    fn select(
        offset: usize,
        addresses: &OrderedAddressSet,
        counter: &impl InUseConnectionCounter,
    ) -> Option<Arc<Address>> {
        let num_addresses = addresses.len();
        if num_addresses == 0 {
            return None;
        }
        let start_index = offset % num_addresses;
        let mut index = start_index;

        let mut least_connected = None;
        let mut least_in_use = usize::MAX;

        loop {
            let address = addresses.at(index);
            let in_use = counter.in_use_connection_count(address);
            if in_use < least_in_use {
                least_connected = Some(Arc::clone(address));
                least_in_use = in_use;
            }
            index = (index + 1) % num_addresses;
            if index == start_index {
                break;
            }
        }
        least_connected
    }
}
