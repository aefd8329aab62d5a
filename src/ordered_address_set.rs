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
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use crate::address::Address;

/// A set of addresses that remembers insertion order and supports indexed access.
///
/// Round-robin consumers (see [`crate::load_balancer::LoadBalancer`]) rely on [`len`](Self::len)
/// and [`at`](Self::at) to walk the set deterministically. A companion [`HashSet`] keeps
/// membership checks and de-duplication on insert O(1); the two are kept in lock-step by
/// construction, never exposed for independent mutation.
#[derive(Clone, Default)]
pub(crate) struct OrderedAddressSet {
    order: Vec<Arc<Address>>,
    members: HashSet<Arc<Address>>,
}

impl OrderedAddressSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_iter(addresses: impl IntoIterator<Item = Arc<Address>>) -> Self {
        let mut set = Self::new();
        set.replace(addresses);
        set
    }

    pub(crate) fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Appends `address` if it's not already present. Idempotent.
    pub(crate) fn add(&mut self, address: Arc<Address>) {
        if self.members.insert(Arc::clone(&address)) {
            self.order.push(address);
        }
    }

    /// Removes `address` if present; silently does nothing otherwise.
    pub(crate) fn discard(&mut self, address: &Address) {
        if self.members.remove(address) {
            self.order.retain(|a| a.as_ref() != address);
        }
    }

    /// Removes `address`, failing if it isn't present. Unlike [`discard`](Self::discard), this is
    /// for callers that treat "not a member" as a bug rather than a no-op.
    #[allow(dead_code)]
    pub(crate) fn remove(&mut self, address: &Address) -> std::result::Result<(), AddressNotPresent> {
        if self.members.remove(address) {
            self.order.retain(|a| a.as_ref() != address);
            Ok(())
        } else {
            Err(AddressNotPresent)
        }
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    /// Atomically replaces the contents with `addresses`, preserving their order and
    /// dropping duplicates (first occurrence wins).
    pub(crate) fn replace(&mut self, addresses: impl IntoIterator<Item = Arc<Address>>) {
        self.clear();
        for address in addresses.into_iter().unique() {
            self.add(address);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn at(&self, index: usize) -> &Arc<Address> {
        &self.order[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Address>> {
        self.order.iter()
    }
}

/// The failure [`OrderedAddressSet::remove`] reports when the address isn't a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AddressNotPresent;

impl std::fmt::Display for AddressNotPresent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "address not present in set")
    }
}

impl std::error::Error for AddressNotPresent {}

impl Debug for OrderedAddressSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.order.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a OrderedAddressSet {
    type Item = &'a Arc<Address>;
    type IntoIter = std::slice::Iter<'a, Arc<Address>>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}
