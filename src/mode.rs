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

/// Which role a piece of work should be routed to.
///
/// Unlike a dynamically typed driver, this crate closes the "unsupported mode" error case
/// at compile time: there is no third variant to reject at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingControl {
    Read,
    Write,
}

impl Default for RoutingControl {
    fn default() -> Self {
        RoutingControl::Write
    }
}
