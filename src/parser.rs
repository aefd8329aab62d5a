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

use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::address::Address;
use crate::error::{Result, RoutingError};
use crate::ordered_address_set::OrderedAddressSet;
use crate::record::{RecordValue, RoutingRecord};
use crate::routing_table::RoutingTable;

/// Turns the oracle's reply into a [`RoutingTable`].
///
/// Fails with [`RoutingError::RoutingProtocol`] if `records` doesn't contain exactly one record,
/// or if that record's shape doesn't match what's documented in the [module docs](crate): a
/// `ttl` integer and a `servers` list of `{role, addresses}` entries. Roles other than `ROUTE`,
/// `READ`, and `WRITE` are silently ignored for forward compatibility; a role repeated across
/// more than one `servers` entry has its addresses accumulated in encounter order, with
/// first-occurrence-wins de-duplication within each role set.
pub fn parse_routing_info(mut records: Vec<RoutingRecord>) -> Result<RoutingTable> {
    if records.len() != 1 {
        return Err(RoutingError::routing_protocol(format!(
            "expected exactly one record, got {}",
            records.len()
        )));
    }
    let mut record = records.remove(0);

    let ttl = record
        .fields
        .remove("ttl")
        .ok_or_else(|| RoutingError::routing_protocol("missing \"ttl\""))?;
    let ttl = ttl
        .into_integer()
        .ok_or_else(|| RoutingError::routing_protocol("\"ttl\" was not an integer"))?;
    if ttl < 0 {
        return Err(RoutingError::routing_protocol("negative \"ttl\""));
    }
    let ttl = Duration::from_secs(ttl as u64);

    let servers = record
        .fields
        .remove("servers")
        .ok_or_else(|| RoutingError::routing_protocol("missing \"servers\""))?;
    let servers = servers
        .into_list()
        .ok_or_else(|| RoutingError::routing_protocol("\"servers\" was not a list"))?;

    let mut routers = OrderedAddressSet::new();
    let mut readers = OrderedAddressSet::new();
    let mut writers = OrderedAddressSet::new();

    for server in servers {
        let (role, addresses) = parse_server(server)?;
        let set = match role {
            ServerRole::Router => &mut routers,
            ServerRole::Reader => &mut readers,
            ServerRole::Writer => &mut writers,
            ServerRole::Unknown => continue,
        };
        for address in addresses {
            set.add(address);
        }
    }

    Ok(RoutingTable::from_parts(routers, readers, writers, ttl))
}

fn parse_server(server: RecordValue) -> Result<(ServerRole, Vec<Arc<Address>>)> {
    let mut server = server
        .into_map()
        .ok_or_else(|| RoutingError::routing_protocol("\"servers\" entry was not a map"))?;

    let role = server
        .remove("role")
        .ok_or_else(|| RoutingError::routing_protocol("\"servers\" entry missing \"role\""))?
        .into_string()
        .ok_or_else(|| RoutingError::routing_protocol("\"role\" was not a string"))?;

    let role = ServerRole::from(role.as_str());
    if matches!(role, ServerRole::Unknown) {
        warn!("ignoring unknown server role {role:?}", role = role_str(&role));
        // still validate "addresses" is present and well-formed even though we discard it,
        // matching the behavior of a forward-compatible parser that doesn't special-case
        // malformed entries for roles it doesn't recognize
    }

    let addresses = server
        .remove("addresses")
        .ok_or_else(|| RoutingError::routing_protocol("\"servers\" entry missing \"addresses\""))?
        .into_list()
        .ok_or_else(|| RoutingError::routing_protocol("\"addresses\" was not a list"))?;

    let addresses = addresses
        .into_iter()
        .map(|address| {
            let address = address
                .into_string()
                .ok_or_else(|| RoutingError::routing_protocol("an address was not a string"))?;
            Ok(Arc::new(Address::from(address.as_str())))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((role, addresses))
}

fn role_str(role: &ServerRole) -> &'static str {
    match role {
        ServerRole::Router => "ROUTE",
        ServerRole::Reader => "READ",
        ServerRole::Writer => "WRITE",
        ServerRole::Unknown => "<unknown>",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerRole {
    Router,
    Reader,
    Writer,
    Unknown,
}

impl From<&str> for ServerRole {
    fn from(s: &str) -> Self {
        match s {
            "ROUTE" => ServerRole::Router,
            "READ" => ServerRole::Reader,
            "WRITE" => ServerRole::Writer,
            _ => ServerRole::Unknown,
        }
    }
}
