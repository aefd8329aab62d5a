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

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::str::FromStr;

/// The default Bolt port used when an address string carries none.
pub const DEFAULT_PORT: u16 = 7687;
const COLON_BYTES: usize = ':'.len_utf8();

/// A server address: a `(host, port)` pair.
///
/// Equality and hashing are structural, based on [`Address::host()`] and [`Address::port()`].
/// Resolving a host name to one or more IP addresses is an external concern (see the crate's
/// [module docs](crate)); this type only carries the address as the routing table received it.
#[derive(Debug, Clone)]
pub struct Address {
    host: String,
    port: u16,
    key: String,
}

impl PartialEq for Address {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.port == other.port
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.port.hash(state);
    }
}

impl Address {
    fn normalize_ip(host: &str) -> String {
        IpAddr::from_str(host)
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| host.to_string())
    }

    /// The host name or IP address, as received.
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// The port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The normalized key used for equality: IP addresses are canonicalized so that, e.g.,
    /// `127.0.0.1` and a differently-written but equal IP compare equal.
    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.host.find(':').is_some() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<(String, u16)> for Address {
    fn from((host, port): (String, u16)) -> Self {
        let key = Self::normalize_ip(&host);
        Self { host, port, key }
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        let key = Self::normalize_ip(host);
        Self {
            host: String::from(host),
            port,
            key,
        }
    }
}

/// Splits `host[:port]` into its parts, defaulting the port to [`DEFAULT_PORT`].
///
/// IPv6 literals (`[::1]:port` or bare `::1`) are recognized by the presence of a closing
/// bracket or of more than one colon.
fn parse(host: &str) -> (String, u16) {
    if let Some(pos_colon) = host.rfind(':') {
        if let Some(pos_bracket) = host.rfind(']') {
            if pos_bracket < pos_colon {
                // [IPv6]:port (colon after bracket)
                let port = host[pos_colon + COLON_BYTES..]
                    .parse()
                    .unwrap_or(DEFAULT_PORT);
                (String::from(&host[..pos_colon]), port)
            } else {
                // [IPv6] (bracket after colon)
                (String::from(host), DEFAULT_PORT)
            }
        } else if host[..pos_colon].rfind(':').is_some() {
            // IPv6 (multiple colons, no brackets)
            (String::from(host), DEFAULT_PORT)
        } else {
            // IPv4:port or host:port (single colon)
            let port = host[pos_colon + COLON_BYTES..]
                .parse()
                .unwrap_or(DEFAULT_PORT);
            (String::from(&host[..pos_colon]), port)
        }
    } else {
        // no colon => use default port
        (String::from(host), DEFAULT_PORT)
    }
}

impl From<&str> for Address {
    fn from(host: &str) -> Self {
        let (host, port) = parse(host);
        let key = Self::normalize_ip(&host);
        Self { host, port, key }
    }
}
