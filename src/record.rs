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

use std::collections::HashMap;

/// A value as received from the cluster's routing oracle.
///
/// This is deliberately a small subset of what a full Bolt value type would carry: decoding the
/// wire format into richer types (nodes, temporal values, ...) is out of scope here, the routing
/// oracle's reply only ever uses these four shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Integer(i64),
    String(String),
    List(Vec<RecordValue>),
    Map(HashMap<String, RecordValue>),
}

impl RecordValue {
    pub(crate) fn into_map(self) -> Option<HashMap<String, RecordValue>> {
        match self {
            RecordValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn into_list(self) -> Option<Vec<RecordValue>> {
        match self {
            RecordValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn into_string(self) -> Option<String> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn into_integer(self) -> Option<i64> {
        match self {
            RecordValue::Integer(i) => Some(i),
            _ => None,
        }
    }
}

/// One record returned by the oracle procedure: an ordered field map.
///
/// The oracle is contractually expected to return exactly one such record (see
/// [`crate::parser::parse_routing_info`]).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoutingRecord {
    pub fields: HashMap<String, RecordValue>,
}

impl RoutingRecord {
    pub fn new(fields: HashMap<String, RecordValue>) -> Self {
        Self { fields }
    }
}
