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

//! Per-method request builders and the registry of supported methods.
//!
//! Recent-block lookups stay within the last ~minute of blocks from the head;
//! log ranges start within the last ~day and end within the last ~minute.

use std::collections::BTreeMap;

use alloy_primitives::{Address, BlockNumber, Bytes, B256, U64};
use serde::Serialize;
use tracing::debug;

use crate::{
    query::QueryContent,
    selector::{Generator, QuerySelector, QuerySelectorBuilder, RandomQuery, SelectorError},
    state::{State, TransactionSample},
};

pub const RECENT_BLOCK_WINDOW: u64 = 5;
pub const LOG_HISTORY_WINDOW: u64 = 5000;

const NO_PARAMS: [(); 0] = [];
const CALL_TRACER: TracerOptions = TracerOptions {
    tracer: "callTracer",
};

#[derive(Debug, Serialize)]
struct CallObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Address>,
    from: Address,
    data: Bytes,
}

impl From<TransactionSample> for CallObject {
    fn from(tx: TransactionSample) -> Self {
        Self {
            to: tx.to,
            from: tx.from,
            data: tx.input,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogFilter {
    from_block: U64,
    to_block: U64,
    address: Address,
    topics: Vec<B256>,
}

#[derive(Debug, Serialize)]
struct TracerOptions {
    tracer: &'static str,
}

fn quantity(n: u64) -> U64 {
    U64::from(n)
}

fn recent_block(s: &mut dyn State) -> BlockNumber {
    let r = s.rand_u64();
    s.current_block().saturating_sub(r % RECENT_BLOCK_WINDOW)
}

pub fn eth_call(s: &mut dyn State) -> QueryContent {
    // replays a sampled call against the head's parent
    let block = s.current_block().saturating_sub(1);
    let tx = s.random_transaction();
    let params = (CallObject::from(tx), quantity(block));
    QueryContent::new(s.id(), "eth_call", params)
}

pub fn eth_estimate_gas(s: &mut dyn State) -> QueryContent {
    let tx = s.random_transaction();
    QueryContent::new(s.id(), "eth_estimateGas", (CallObject::from(tx),))
}

pub fn eth_get_transaction_receipt(s: &mut dyn State) -> QueryContent {
    let tx = s.random_transaction();
    QueryContent::new(s.id(), "eth_getTransactionReceipt", (tx.hash,))
}

pub fn eth_get_transaction_by_hash(s: &mut dyn State) -> QueryContent {
    let tx = s.random_transaction();
    QueryContent::new(s.id(), "eth_getTransactionByHash", (tx.hash,))
}

pub fn eth_get_transaction_by_block_number_and_index(s: &mut dyn State) -> QueryContent {
    let tx = s.random_transaction();
    QueryContent::new(
        s.id(),
        "eth_getTransactionByBlockNumberAndIndex",
        (quantity(tx.block_number), quantity(tx.index)),
    )
}

pub fn eth_get_balance(s: &mut dyn State) -> QueryContent {
    let addr = s.random_address();
    QueryContent::new(s.id(), "eth_getBalance", (addr, "latest"))
}

pub fn eth_get_transaction_count(s: &mut dyn State) -> QueryContent {
    let addr = s.random_address();
    QueryContent::new(s.id(), "eth_getTransactionCount", (addr, "pending"))
}

pub fn eth_get_block_by_number(s: &mut dyn State) -> QueryContent {
    let block = recent_block(s);
    QueryContent::new(s.id(), "eth_getBlockByNumber", (quantity(block), false))
}

pub fn eth_get_block_by_number_full(s: &mut dyn State) -> QueryContent {
    let block = recent_block(s);
    QueryContent::new(s.id(), "eth_getBlockByNumber", (quantity(block), true))
}

pub fn eth_get_block_by_hash(s: &mut dyn State) -> QueryContent {
    let block = s.random_block();
    QueryContent::new(s.id(), "eth_getBlockByHash", (block.hash, false))
}

pub fn eth_get_block_by_hash_full(s: &mut dyn State) -> QueryContent {
    let block = s.random_block();
    QueryContent::new(s.id(), "eth_getBlockByHash", (block.hash, true))
}

pub fn eth_get_block_receipts(s: &mut dyn State) -> QueryContent {
    let block = recent_block(s);
    QueryContent::new(s.id(), "eth_getBlockReceipts", (quantity(block),))
}

pub fn eth_block_number(s: &mut dyn State) -> QueryContent {
    QueryContent::new(s.id(), "eth_blockNumber", NO_PARAMS)
}

pub fn eth_gas_price(s: &mut dyn State) -> QueryContent {
    QueryContent::new(s.id(), "eth_gasPrice", NO_PARAMS)
}

pub fn eth_chain_id(s: &mut dyn State) -> QueryContent {
    QueryContent::new(s.id(), "eth_chainId", NO_PARAMS)
}

pub fn net_version(s: &mut dyn State) -> QueryContent {
    QueryContent::new(s.id(), "net_version", NO_PARAMS)
}

pub fn eth_get_logs(s: &mut dyn State) -> QueryContent {
    // one draw for both ends: r % 5000 >= r % 5, so from_block <= to_block
    let r = s.rand_u64();
    let head = s.current_block();
    let from_block = head.saturating_sub(r % LOG_HISTORY_WINDOW);
    let to_block = head.saturating_sub(r % RECENT_BLOCK_WINDOW);
    let contract = s.random_contract();
    let filter = LogFilter {
        from_block: quantity(from_block),
        to_block: quantity(to_block),
        address: contract.address,
        topics: contract.topics,
    };
    QueryContent::new(s.id(), "eth_getLogs", (filter,))
}

pub fn eth_get_code(s: &mut dyn State) -> QueryContent {
    let contract = s.random_contract();
    QueryContent::new(s.id(), "eth_getCode", (contract.address, "latest"))
}

pub fn eth_get_storage_at(s: &mut dyn State) -> QueryContent {
    let contract = s.random_contract();
    QueryContent::new(
        s.id(),
        "eth_getStorageAt",
        (contract.address, quantity(0), "latest"),
    )
}

pub fn debug_trace_transaction(s: &mut dyn State) -> QueryContent {
    let tx = s.random_transaction();
    QueryContent::new(s.id(), "debug_traceTransaction", (tx.hash, CALL_TRACER))
}

pub fn debug_trace_block_by_number(s: &mut dyn State) -> QueryContent {
    let block = recent_block(s);
    QueryContent::new(
        s.id(),
        "debug_traceBlockByNumber",
        (quantity(block), CALL_TRACER),
    )
}

/// Supported method names and their builders. A `#full` suffix selects the
/// variant that requests full transaction objects.
pub const RPC_METHODS: &[(&str, Generator)] = &[
    ("eth_call", eth_call as Generator),
    ("eth_estimateGas", eth_estimate_gas as Generator),
    ("eth_getTransactionReceipt", eth_get_transaction_receipt as Generator),
    ("eth_getTransactionByHash", eth_get_transaction_by_hash as Generator),
    (
        "eth_getTransactionByBlockNumberAndIndex",
        eth_get_transaction_by_block_number_and_index as Generator,
    ),
    ("eth_getBalance", eth_get_balance as Generator),
    ("eth_getTransactionCount", eth_get_transaction_count as Generator),
    ("eth_getBlockByNumber", eth_get_block_by_number as Generator),
    ("eth_getBlockByNumber#full", eth_get_block_by_number_full as Generator),
    ("eth_getBlockByHash", eth_get_block_by_hash as Generator),
    ("eth_getBlockByHash#full", eth_get_block_by_hash_full as Generator),
    ("eth_getBlockReceipts", eth_get_block_receipts as Generator),
    ("eth_blockNumber", eth_block_number as Generator),
    ("eth_gasPrice", eth_gas_price as Generator),
    ("eth_chainId", eth_chain_id as Generator),
    ("net_version", net_version as Generator),
    ("eth_getLogs", eth_get_logs as Generator),
    ("eth_getCode", eth_get_code as Generator),
    ("eth_getStorageAt", eth_get_storage_at as Generator),
    ("debug_traceTransaction", debug_trace_transaction as Generator),
    ("debug_traceBlockByNumber", debug_trace_block_by_number as Generator),
];

pub fn lookup(method: &str) -> Option<(&'static str, Generator)> {
    RPC_METHODS
        .iter()
        .find(|(name, _)| *name == method)
        .copied()
}

/// Builds a selector from a method -> weight table. Zero weights are skipped;
/// an unknown method is an error.
pub fn make_selector(methods: &BTreeMap<String, u64>) -> Result<QuerySelector, SelectorError> {
    let mut builder = QuerySelectorBuilder::new();
    for (method, &weight) in methods {
        let Some((method, generate)) = lookup(method) else {
            return Err(SelectorError::UnsupportedMethod(method.clone()));
        };
        if weight == 0 {
            debug!(method, "skipping method with zero weight");
            continue;
        }
        builder.register(RandomQuery {
            method,
            weight,
            generate,
        })?;
    }
    if builder.total_weight() == 0 {
        return Err(SelectorError::EmptyTable);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use alloy_primitives::B256;
    use rand::{rngs::SmallRng, SeedableRng};
    use test_case::test_case;

    use super::{
        debug_trace_block_by_number, debug_trace_transaction, eth_block_number, eth_call,
        eth_estimate_gas, eth_get_balance, eth_get_block_by_hash_full, eth_get_block_by_number,
        eth_get_block_by_number_full, eth_get_code, eth_get_logs, eth_get_storage_at,
        eth_get_transaction_by_block_number_and_index, eth_get_transaction_by_hash,
        eth_get_transaction_count, eth_get_transaction_receipt, lookup, make_selector,
        LOG_HISTORY_WINDOW, RECENT_BLOCK_WINDOW, RPC_METHODS,
    };
    use crate::{
        id::IdGenerator,
        query::QueryContent,
        selector::{Generator, SelectorError},
        state::Lineage,
        testutil::{activity, address, FixedState},
    };

    fn hex(b: u8, len: usize) -> String {
        format!("0x{}", format!("{b:02x}").repeat(len))
    }

    fn run(generate: Generator, state: &mut FixedState) -> QueryContent {
        generate(state)
    }

    #[test]
    fn block_number() {
        let q = run(eth_block_number, &mut FixedState::default());
        assert_eq!(q.method, "eth_blockNumber");
        assert_eq!(q.params(), "[]");
    }

    #[test]
    fn get_balance() {
        let mut state = FixedState::default();
        state.address = address(0x12);
        let q = run(eth_get_balance, &mut state);
        assert_eq!(q.method, "eth_getBalance");
        assert_eq!(q.params(), format!("[\"{}\",\"latest\"]", hex(0x12, 20)));
    }

    #[test]
    fn get_transaction_count_uses_pending() {
        let mut state = FixedState::default();
        state.address = address(0x12);
        let q = run(eth_get_transaction_count, &mut state);
        assert_eq!(q.params(), format!("[\"{}\",\"pending\"]", hex(0x12, 20)));
    }

    #[test]
    fn call_targets_parent_block() {
        let mut state = FixedState::default();
        state.current_block = 0x100;
        state.transaction.block_number = 0x80;
        let q = run(eth_call, &mut state);
        assert_eq!(q.method, "eth_call");
        assert_eq!(
            q.params(),
            format!(
                "[{{\"to\":\"{}\",\"from\":\"{}\",\"data\":\"0x1234\"}},\"0xff\"]",
                hex(0x20, 20),
                hex(0x10, 20)
            )
        );
    }

    #[test]
    fn call_block_follows_head_not_transaction() {
        let mut lineage =
            Lineage::new(Arc::new(IdGenerator::new()), SmallRng::seed_from_u64(3), 16);
        // samples span 0x64..=0x6c, head is 0x6c
        let mut state = (0x64..=0x6c)
            .map(|number| lineage.advance(activity(number, 3)))
            .last()
            .unwrap();

        for _ in 0..200 {
            let q = eth_call(&mut state);
            let params: serde_json::Value = serde_json::from_str(q.params()).unwrap();
            assert_eq!(params[1], "0x6b");
        }
    }

    #[test]
    fn call_omits_missing_to() {
        let mut state = FixedState::default();
        state.transaction.to = None;
        let q = run(eth_call, &mut state);
        assert!(!q.params().contains("\"to\""));
        assert!(q.params().starts_with("[{\"from\":"));
    }

    #[test]
    fn estimate_gas_has_no_block() {
        let mut state = FixedState::default();
        state.transaction.to = None;
        let q = run(eth_estimate_gas, &mut state);
        assert_eq!(
            q.params(),
            format!("[{{\"from\":\"{}\",\"data\":\"0x1234\"}}]", hex(0x10, 20))
        );
    }

    #[test]
    fn transaction_lookups_quote_hash() {
        let mut state = FixedState::default();
        let expected = format!("[\"{}\"]", hex(0x30, 32));
        assert_eq!(run(eth_get_transaction_receipt, &mut state).params(), expected);
        assert_eq!(run(eth_get_transaction_by_hash, &mut state).params(), expected);
    }

    #[test]
    fn transaction_by_block_and_index() {
        let mut state = FixedState::default();
        state.transaction.block_number = 100;
        state.transaction.index = 10;
        let q = run(eth_get_transaction_by_block_number_and_index, &mut state);
        assert_eq!(q.params(), "[\"0x64\",\"0xa\"]");
    }

    // head 100, offset = draw % 5
    #[test_case(0, "0x64"; "head")]
    #[test_case(4, "0x60"; "four back")]
    #[test_case(7, "0x62"; "wraps modulo window")]
    fn block_by_number_recent(draw: u64, block: &str) {
        let mut state = FixedState::default();
        state.draw = draw;
        let q = run(eth_get_block_by_number, &mut state);
        assert_eq!(q.params(), format!("[\"{block}\",false]"));
        let q = run(eth_get_block_by_number_full, &mut state);
        assert_eq!(q.method, "eth_getBlockByNumber");
        assert_eq!(q.params(), format!("[\"{block}\",true]"));
    }

    #[test]
    fn recent_block_saturates_near_genesis() {
        let mut state = FixedState::default();
        state.current_block = 2;
        state.draw = 4;
        assert_eq!(run(eth_get_block_by_number, &mut state).params(), "[\"0x0\",false]");
    }

    #[test]
    fn block_by_hash() {
        let mut state = FixedState::default();
        let q = run(eth_get_block_by_hash_full, &mut state);
        assert_eq!(q.params(), format!("[\"{}\",true]", hex(0x50, 32)));
    }

    #[test]
    fn get_logs_range_and_topics() {
        let mut state = FixedState::default();
        state.current_block = 10_000;
        state.draw = 5_003; // from: -3, to: -3
        state.contract.topics = vec![B256::repeat_byte(0x61), B256::repeat_byte(0x62)];
        let q = run(eth_get_logs, &mut state);
        assert_eq!(
            q.params(),
            format!(
                "[{{\"fromBlock\":\"0x270d\",\"toBlock\":\"0x270d\",\"address\":\"{}\",\"topics\":[\"{}\",\"{}\"]}}]",
                hex(0x40, 20),
                hex(0x61, 32),
                hex(0x62, 32)
            )
        );
    }

    #[test]
    fn get_logs_without_topics() {
        let mut state = FixedState::default();
        state.contract.topics = Vec::new();
        let q = run(eth_get_logs, &mut state);
        assert!(q.params().contains("\"topics\":[]"));
    }

    #[test]
    fn get_logs_from_never_after_to() {
        let mut state = FixedState::default();
        state.current_block = 1_000_000;
        for draw in [0, 1, 4, 5, 4_999, 5_000, 123_456_789, u64::MAX] {
            state.draw = draw;
            let from = state.current_block - draw % LOG_HISTORY_WINDOW;
            let to = state.current_block - draw % RECENT_BLOCK_WINDOW;
            assert!(from <= to, "draw {draw}");
            let q = run(eth_get_logs, &mut state);
            assert!(q.params().contains(&format!("\"fromBlock\":\"{from:#x}\"")));
            assert!(q.params().contains(&format!("\"toBlock\":\"{to:#x}\"")));
        }
    }

    #[test]
    fn code_and_storage_use_contract() {
        let mut state = FixedState::default();
        assert_eq!(
            run(eth_get_code, &mut state).params(),
            format!("[\"{}\",\"latest\"]", hex(0x40, 20))
        );
        assert_eq!(
            run(eth_get_storage_at, &mut state).params(),
            format!("[\"{}\",\"0x0\",\"latest\"]", hex(0x40, 20))
        );
    }

    #[test]
    fn debug_traces_use_call_tracer() {
        let mut state = FixedState::default();
        assert_eq!(
            run(debug_trace_transaction, &mut state).params(),
            format!("[\"{}\",{{\"tracer\":\"callTracer\"}}]", hex(0x30, 32))
        );
        state.draw = 1;
        assert_eq!(
            run(debug_trace_block_by_number, &mut state).params(),
            "[\"0x63\",{\"tracer\":\"callTracer\"}]"
        );
    }

    #[test]
    fn builders_are_pure_apart_from_ids() {
        let mut first = FixedState::default();
        let mut second = FixedState::default();
        second.id_gen = first.id_gen.clone();
        for &(_, generate) in RPC_METHODS {
            let a = generate(&mut first);
            let b = generate(&mut second);
            assert_eq!(a.method, b.method);
            assert_eq!(a.params(), b.params());
            assert!(b.id > a.id);
        }
    }

    #[test]
    fn registry_names_unique() {
        let mut names = RPC_METHODS.iter().map(|(n, _)| *n).collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RPC_METHODS.len());
    }

    #[test]
    fn make_selector_skips_zero_weights() {
        let methods = BTreeMap::from([
            ("eth_call".to_owned(), 10),
            ("eth_getCode".to_owned(), 0),
            ("eth_blockNumber".to_owned(), 5),
        ]);
        let selector = make_selector(&methods).unwrap();
        assert_eq!(selector.total_weight(), 15);
        assert_eq!(selector.queries().len(), 2);
    }

    #[test]
    fn make_selector_rejects_unknown_method() {
        let methods = BTreeMap::from([("eth_sendRawTransaction".to_owned(), 1)]);
        assert_eq!(
            make_selector(&methods).unwrap_err(),
            SelectorError::UnsupportedMethod("eth_sendRawTransaction".to_owned())
        );
    }

    #[test]
    fn make_selector_rejects_all_zero() {
        let methods = BTreeMap::from([("eth_call".to_owned(), 0)]);
        assert_eq!(make_selector(&methods).unwrap_err(), SelectorError::EmptyTable);
    }

    #[test]
    fn unknown_suffix_is_unsupported() {
        assert!(lookup("eth_getBlockByNumber#full").is_some());
        assert!(lookup("eth_getBalance#full").is_none());
    }
}
