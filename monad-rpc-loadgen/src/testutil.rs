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

//! Deterministic stand-ins for tests: a fixed [`State`], a scripted node
//! client and a line-collecting sink.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy_primitives::{Address, BlockNumber, Bytes, TxHash, B256, U64};
use tokio::time::{sleep, Duration};

use crate::{
    client::{ChainClient, ClientError, RpcBlock, RpcLog, RpcReceipt, RpcTransaction},
    id::IdGenerator,
    sink::{LineSink, SinkError},
    state::{BlockActivity, BlockSample, ContractSample, State, TransactionSample},
};

pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Block `number` with `num_txs` transactions from `0x10+i` to `0x20+i`.
pub fn activity(number: BlockNumber, num_txs: u8) -> BlockActivity {
    let transactions = (0..num_txs)
        .map(|i| TransactionSample {
            hash: B256::repeat_byte(0x30 + i),
            block_number: number,
            index: i as u64,
            from: address(0x10 + i),
            to: Some(address(0x20 + i)),
            input: Bytes::from(vec![0x12, 0x34]),
        })
        .collect();
    BlockActivity::new(
        BlockSample {
            number,
            hash: B256::left_padding_from(&number.to_be_bytes()),
        },
        transactions,
        Vec::new(),
    )
    .expect("test activity has transactions")
}

pub fn activity_with_contract(
    number: BlockNumber,
    contract: Address,
    topics: Vec<B256>,
) -> BlockActivity {
    let base = activity(number, 1);
    BlockActivity::new(
        base.block(),
        base.transactions().to_vec(),
        vec![ContractSample {
            address: contract,
            topics,
        }],
    )
    .expect("test activity has transactions")
}

/// A [`State`] whose samples are plain fields and whose random source always
/// returns `draw`.
#[derive(Debug, Clone)]
pub struct FixedState {
    pub id_gen: Arc<IdGenerator>,
    pub current_block: BlockNumber,
    pub draw: u64,
    pub address: Address,
    pub transaction: TransactionSample,
    pub contract: ContractSample,
    pub block: BlockSample,
}

impl Default for FixedState {
    fn default() -> Self {
        Self {
            id_gen: Arc::new(IdGenerator::new()),
            current_block: 100,
            draw: 0,
            address: address(0x11),
            transaction: TransactionSample {
                hash: B256::repeat_byte(0x30),
                block_number: 100,
                index: 0,
                from: address(0x10),
                to: Some(address(0x20)),
                input: Bytes::from(vec![0x12, 0x34]),
            },
            contract: ContractSample {
                address: address(0x40),
                topics: vec![B256::repeat_byte(0x41)],
            },
            block: BlockSample {
                number: 100,
                hash: B256::repeat_byte(0x50),
            },
        }
    }
}

impl State for FixedState {
    fn id(&self) -> u64 {
        self.id_gen.next_id()
    }

    fn current_block(&self) -> BlockNumber {
        self.current_block
    }

    fn rand_u64(&mut self) -> u64 {
        self.draw
    }

    fn random_address(&mut self) -> Address {
        self.address
    }

    fn random_transaction(&mut self) -> TransactionSample {
        self.transaction.clone()
    }

    fn random_contract(&mut self) -> ContractSample {
        self.contract.clone()
    }

    fn random_block(&mut self) -> BlockSample {
        self.block
    }
}

pub fn rpc_block(number: BlockNumber, num_txs: u8) -> RpcBlock {
    let sample = activity(number, num_txs.max(1));
    RpcBlock {
        number: U64::from(number),
        hash: sample.block().hash,
        transactions: sample
            .transactions()
            .iter()
            .take(num_txs as usize)
            .map(|tx| RpcTransaction {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                input: tx.input.clone(),
                transaction_index: None,
            })
            .collect(),
    }
}

/// Scripted node: a fixed head, blocks by number and receipts by hash.
/// Missing blocks are reported as fetch failures.
#[derive(Debug, Default)]
pub struct FakeClient {
    head: BlockNumber,
    blocks: HashMap<BlockNumber, RpcBlock>,
    receipts: HashMap<TxHash, RpcReceipt>,
    head_calls: Arc<AtomicUsize>,
    receipt_calls: AtomicUsize,
    latency: Duration,
}

impl FakeClient {
    pub fn new(head: BlockNumber) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    pub fn with_block(mut self, block: RpcBlock) -> Self {
        self.blocks.insert(block.number.to::<u64>(), block);
        self
    }

    pub fn with_log(mut self, tx: TxHash, address: Address, topics: Vec<B256>) -> Self {
        self.receipts
            .entry(tx)
            .or_default()
            .logs
            .push(RpcLog { address, topics });
        self
    }

    /// Delays every `block_number` response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Counter of `block_number` calls, readable after the client is moved.
    pub fn head_calls(&self) -> Arc<AtomicUsize> {
        self.head_calls.clone()
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }
}

impl ChainClient for FakeClient {
    async fn block_number(&self) -> Result<BlockNumber, ClientError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        Ok(self.head)
    }

    async fn block_by_number(&self, number: BlockNumber) -> Result<RpcBlock, ClientError> {
        self.blocks
            .get(&number)
            .cloned()
            .ok_or(ClientError::MissingBlock(number))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<RpcReceipt>, ClientError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.receipts.get(&hash).cloned().unwrap_or_default()))
    }
}

/// Collects lines into a shared buffer and reports end-of-stream once
/// `limit` lines were written.
#[derive(Debug, Clone)]
pub struct CollectSink {
    lines: Arc<Mutex<Vec<String>>>,
    limit: usize,
}

impl CollectSink {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: Default::default(),
            limit,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LineSink for CollectSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() >= self.limit {
            return Err(SinkError::Closed);
        }
        lines.push(line.to_owned());
        Ok(())
    }
}
