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

//! Weighted JSON-RPC traffic generator.
//!
//! A background refresher keeps a snapshot of recently observed chain activity
//! (head block, transactions, senders, contracts and their log topics) and
//! hands it to the emission loop through a single-slot mailbox. The emitter
//! draws an RPC method in proportion to its configured weight, renders its
//! params against the snapshot and writes one JSON-RPC request per line.

#![allow(async_fn_in_trait)]

pub mod builders;
pub mod client;
pub mod config;
pub mod id;
pub mod mailbox;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod selector;
pub mod sink;
pub mod state;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use builders::make_selector;
pub use client::{ChainClient, ClientError};
pub use id::IdGenerator;
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use pipeline::{run_pipeline, Emission, Emitter, PipelineError, Refresher};
pub use query::QueryContent;
pub use rate_limit::TokenBucket;
pub use selector::{QuerySelector, QuerySelectorBuilder, RandomQuery, SelectorError};
pub use sink::{LineSink, SinkError, WriterSink};
pub use state::{
    producer::{RefreshError, StateProducer},
    BlockActivity, BlockSample, ContractSample, Lineage, LiveState, State, TransactionSample,
};
