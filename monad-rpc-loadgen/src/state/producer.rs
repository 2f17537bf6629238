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

use alloy_primitives::BlockNumber;
use futures::future::try_join_all;
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{BlockActivity, BlockSample, ContractSample, TransactionSample};
use crate::client::{ChainClient, ClientError, RpcBlock, RpcReceipt};

#[derive(Debug, Error)]
pub enum RefreshError {
    /// Sampled block had no transactions. Recoverable: retry after a backoff.
    #[error("block {0} has no transactions")]
    EmptyBlock(BlockNumber),

    #[error("failed to fetch chain state: {0}")]
    Client(#[from] ClientError),
}

// refreshes slower than this are logged
const SLOW_REFRESH: Duration = Duration::from_secs(2);

/// Samples the chain head through a [`ChainClient`].
pub struct StateProducer<C> {
    client: C,
    receipt_samples: usize,
}

impl<C: ChainClient> StateProducer<C> {
    pub fn new(client: C, receipt_samples: usize) -> Self {
        Self {
            client,
            receipt_samples,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches the head block and receipts for up to `receipt_samples` of its
    /// transactions.
    pub async fn sample_head(&self) -> Result<BlockActivity, RefreshError> {
        let start = Instant::now();
        let result = self.fetch_head().await;
        let elapsed = start.elapsed();
        if elapsed > SLOW_REFRESH {
            warn!(?elapsed, ok = result.is_ok(), "slow chain state refresh");
        }
        result
    }

    async fn fetch_head(&self) -> Result<BlockActivity, RefreshError> {
        let head = self.client.block_number().await?;
        let block = self.client.block_by_number(head).await?;
        if block.transactions.is_empty() {
            return Err(RefreshError::EmptyBlock(head));
        }

        let receipts = try_join_all(
            block
                .transactions
                .iter()
                .take(self.receipt_samples)
                .map(|tx| self.client.transaction_receipt(tx.hash)),
        )
        .await?;

        let activity = Self::to_activity(head, block, receipts.into_iter().flatten())
            .ok_or(RefreshError::EmptyBlock(head))?;
        debug!(
            block_number = head,
            num_txs = activity.transactions().len(),
            num_contracts = activity.contracts().len(),
            "sampled head block"
        );
        Ok(activity)
    }

    fn to_activity(
        head: BlockNumber,
        block: RpcBlock,
        receipts: impl Iterator<Item = RpcReceipt>,
    ) -> Option<BlockActivity> {
        let number = block.number.to::<u64>();
        if number != head {
            debug!(head, number, "node returned a different block than requested");
        }

        let transactions = block
            .transactions
            .into_iter()
            .enumerate()
            .map(|(position, tx)| TransactionSample {
                hash: tx.hash,
                block_number: number,
                index: tx
                    .transaction_index
                    .map(|i| i.to::<u64>())
                    .unwrap_or(position as u64),
                from: tx.from,
                to: tx.to,
                input: tx.input,
            })
            .collect();

        let contracts = receipts
            .flat_map(|receipt| {
                let created = receipt.contract_address.map(|address| ContractSample {
                    address,
                    topics: Vec::new(),
                });
                receipt
                    .logs
                    .into_iter()
                    .map(|log| ContractSample {
                        address: log.address,
                        topics: log.topics,
                    })
                    .chain(created)
            })
            .collect();

        BlockActivity::new(
            BlockSample {
                number,
                hash: block.hash,
            },
            transactions,
            contracts,
        )
    }
}
