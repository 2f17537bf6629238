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

use std::future::Future;

use alloy_json_rpc::RpcError;
use alloy_primitives::{Address, BlockHash, BlockNumber, Bytes, TxHash, B256, U64};
use alloy_rpc_client::ReqwestClient;
use alloy_transport::TransportErrorKind;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rpc(#[from] RpcError<TransportErrorKind>),

    #[error("node returned no block for number {0}")]
    MissingBlock(BlockNumber),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub number: U64,
    pub hash: BlockHash,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: TxHash,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub transaction_index: Option<U64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
}

/// The node calls the state producer depends on.
pub trait ChainClient {
    fn block_number(&self) -> impl Future<Output = Result<BlockNumber, ClientError>> + Send;

    /// Fetches a block with full transaction objects.
    fn block_by_number(
        &self,
        number: BlockNumber,
    ) -> impl Future<Output = Result<RpcBlock, ClientError>> + Send;

    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<RpcReceipt>, ClientError>> + Send;
}

impl ChainClient for ReqwestClient {
    async fn block_number(&self) -> Result<BlockNumber, ClientError> {
        let number = self
            .request_noparams::<U64>("eth_blockNumber")
            .map_resp(|res| res.to::<u64>())
            .await?;
        Ok(number)
    }

    async fn block_by_number(&self, number: BlockNumber) -> Result<RpcBlock, ClientError> {
        self.request::<_, Option<RpcBlock>>("eth_getBlockByNumber", (U64::from(number), true))
            .await?
            .ok_or(ClientError::MissingBlock(number))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<RpcReceipt>, ClientError> {
        let receipt = self
            .request::<_, Option<RpcReceipt>>("eth_getTransactionReceipt", (hash,))
            .await?;
        Ok(receipt)
    }
}
