// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use serde::Serialize;
use serde_json::value::{to_raw_value, RawValue};

pub const JSONRPC_VERSION: &str = "2.0";

/// One fully rendered request. `params` is the pre-serialized positional
/// argument array and is written to the wire verbatim.
#[derive(Debug)]
pub struct QueryContent {
    pub id: u64,
    pub method: &'static str,
    pub params: Box<RawValue>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a RawValue,
}

impl QueryContent {
    pub fn new<P: Serialize>(id: u64, method: &'static str, params: P) -> Self {
        // params are built from plain structs, tuples and hex types only
        let params = to_raw_value(&params).expect("query params always serialize");
        Self { id, method, params }
    }

    pub fn params(&self) -> &str {
        self.params.get()
    }

    /// Newline-terminated `{"jsonrpc":"2.0","id":..,"method":..,"params":..}`.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(&WireRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.id,
            method: self.method,
            params: &self.params,
        })
        .expect("wire request always serializes");
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod test {
    use super::QueryContent;

    #[test]
    fn line_format() {
        let query = QueryContent::new(7, "eth_getBalance", ("0x01", "latest"));
        assert_eq!(
            query.to_line(),
            "{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"eth_getBalance\",\"params\":[\"0x01\",\"latest\"]}\n"
        );
    }

    #[test]
    fn empty_params() {
        let query = QueryContent::new(1, "eth_blockNumber", [(); 0]);
        assert_eq!(query.params(), "[]");
        assert_eq!(
            query.to_line(),
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"eth_blockNumber\",\"params\":[]}\n"
        );
    }
}
