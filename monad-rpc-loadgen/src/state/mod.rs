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

use std::{collections::VecDeque, sync::Arc};

use alloy_primitives::{Address, BlockHash, BlockNumber, Bytes, TxHash, B256};
use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::id::IdGenerator;

pub mod producer;

/// Chain facts a query builder may draw from.
///
/// Accessors take `&mut self` because they consume the snapshot's random
/// source; everything else about a snapshot is fixed at construction.
pub trait State {
    fn id(&self) -> u64;
    fn current_block(&self) -> BlockNumber;
    fn rand_u64(&mut self) -> u64;
    fn random_address(&mut self) -> Address;
    fn random_transaction(&mut self) -> TransactionSample;
    fn random_contract(&mut self) -> ContractSample;
    fn random_block(&mut self) -> BlockSample;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSample {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSample {
    pub hash: TxHash,
    pub block_number: BlockNumber,
    pub index: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSample {
    pub address: Address,
    pub topics: Vec<B256>,
}

/// Samples taken from a single block that had at least one transaction.
#[derive(Debug, Clone)]
pub struct BlockActivity {
    block: BlockSample,
    transactions: Vec<TransactionSample>,
    contracts: Vec<ContractSample>,
}

impl BlockActivity {
    /// Returns `None` for a block without transactions.
    pub fn new(
        block: BlockSample,
        transactions: Vec<TransactionSample>,
        contracts: Vec<ContractSample>,
    ) -> Option<Self> {
        if transactions.is_empty() {
            return None;
        }
        Some(Self {
            block,
            transactions,
            contracts,
        })
    }

    pub fn block(&self) -> BlockSample {
        self.block
    }

    pub fn transactions(&self) -> &[TransactionSample] {
        &self.transactions
    }

    pub fn contracts(&self) -> &[ContractSample] {
        &self.contracts
    }
}

/// Flattened view over a window of [`BlockActivity`]. Every sample list is
/// non-empty.
#[derive(Debug)]
pub struct ChainData {
    current_block: BlockNumber,
    blocks: Vec<BlockSample>,
    transactions: Vec<TransactionSample>,
    addresses: Vec<Address>,
    contracts: Vec<ContractSample>,
}

impl ChainData {
    fn from_window(window: &VecDeque<BlockActivity>) -> Option<Self> {
        let current_block = window.front()?.block.number;
        let blocks = window.iter().map(|a| a.block).collect::<Vec<_>>();
        let transactions = window
            .iter()
            .flat_map(|a| a.transactions.iter().cloned())
            .collect::<Vec<_>>();
        let addresses = transactions
            .iter()
            .flat_map(|tx| std::iter::once(tx.from).chain(tx.to))
            .unique()
            .collect::<Vec<_>>();

        let mut contracts = window
            .iter()
            .flat_map(|a| a.contracts.iter().cloned())
            .collect::<Vec<_>>();
        if contracts.is_empty() {
            // no logs seen: fall back to call targets, then senders
            contracts = transactions
                .iter()
                .filter_map(|tx| tx.to)
                .unique()
                .map(|address| ContractSample {
                    address,
                    topics: Vec::new(),
                })
                .collect();
        }
        if contracts.is_empty() {
            contracts = addresses
                .iter()
                .map(|&address| ContractSample {
                    address,
                    topics: Vec::new(),
                })
                .collect();
        }

        Some(Self {
            current_block,
            blocks,
            transactions,
            addresses,
            contracts,
        })
    }

    pub fn current_block(&self) -> BlockNumber {
        self.current_block
    }
}

/// Immutable snapshot of chain facts plus the random source used to sample
/// them. Replaced wholesale on every refresh.
#[derive(Debug, Clone)]
pub struct LiveState {
    id_gen: Arc<IdGenerator>,
    rng: SmallRng,
    chain: Arc<ChainData>,
}

impl LiveState {
    /// Builds a single-block snapshot, mostly useful for fixed-state runs.
    pub fn from_activity(id_gen: Arc<IdGenerator>, seed: u64, activity: BlockActivity) -> Self {
        let mut lineage = Lineage::new(id_gen, SmallRng::seed_from_u64(seed), 1);
        lineage.advance(activity)
    }

    pub fn chain(&self) -> &ChainData {
        &self.chain
    }

    fn pick<'a, T>(rng: &mut SmallRng, items: &'a [T]) -> &'a T {
        &items[rng.gen_range(0..items.len())]
    }
}

impl State for LiveState {
    fn id(&self) -> u64 {
        self.id_gen.next_id()
    }

    fn current_block(&self) -> BlockNumber {
        self.chain.current_block
    }

    fn rand_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    fn random_address(&mut self) -> Address {
        *Self::pick(&mut self.rng, &self.chain.addresses)
    }

    fn random_transaction(&mut self) -> TransactionSample {
        Self::pick(&mut self.rng, &self.chain.transactions).clone()
    }

    fn random_contract(&mut self) -> ContractSample {
        Self::pick(&mut self.rng, &self.chain.contracts).clone()
    }

    fn random_block(&mut self) -> BlockSample {
        *Self::pick(&mut self.rng, &self.chain.blocks)
    }
}

/// Snapshot lineage owned by the refresher: the shared id source, the seed
/// source for per-snapshot random generators, and the window of recently
/// sampled blocks (newest first).
pub struct Lineage {
    id_gen: Arc<IdGenerator>,
    seeder: SmallRng,
    window: VecDeque<BlockActivity>,
    history_blocks: usize,
}

impl Lineage {
    pub fn new(id_gen: Arc<IdGenerator>, seeder: SmallRng, history_blocks: usize) -> Self {
        let history_blocks = history_blocks.max(1);
        Self {
            id_gen,
            seeder,
            window: VecDeque::with_capacity(history_blocks),
            history_blocks,
        }
    }

    /// Block number of the newest sampled block, if any.
    pub fn head(&self) -> Option<BlockNumber> {
        self.window.front().map(|a| a.block.number)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Pushes freshly sampled activity into the window and derives the next
    /// snapshot from it. Re-sampling the current head replaces it.
    pub fn advance(&mut self, activity: BlockActivity) -> LiveState {
        if self.head() == Some(activity.block.number) {
            self.window.pop_front();
        }
        self.window.push_front(activity);
        self.window.truncate(self.history_blocks);

        let chain = ChainData::from_window(&self.window)
            .expect("window holds the activity pushed above");

        LiveState {
            id_gen: self.id_gen.clone(),
            rng: SmallRng::seed_from_u64(self.seeder.gen()),
            chain: Arc::new(chain),
        }
    }
}
