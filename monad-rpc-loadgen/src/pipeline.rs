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

//! Refresher and emitter flows joined by the snapshot mailbox.

use std::{io, sync::Arc};

use thiserror::Error;
use tokio::{
    task::JoinError,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::ChainClient,
    mailbox::{MailboxReceiver, MailboxSender},
    rate_limit::TokenBucket,
    selector::{QuerySelector, SelectorError},
    sink::{LineSink, SinkError},
    state::{
        producer::{RefreshError, StateProducer},
        Lineage, LiveState, State,
    },
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Select(#[from] SelectorError),

    #[error("failed to write request line: {0}")]
    Sink(io::Error),

    #[error("chain state mailbox closed before the first snapshot")]
    NoState,

    #[error("refresher task failed: {0}")]
    Join(#[from] JoinError),
}

/// Samples the chain head on a fixed cadence and publishes each new snapshot.
///
/// Empty head blocks are retried after `empty_block_backoff` without
/// publishing. Any other sampling error ends the refresher.
pub struct Refresher<C> {
    producer: StateProducer<C>,
    lineage: Lineage,
    mailbox: MailboxSender<LiveState>,
    refresh_interval: Duration,
    empty_block_backoff: Duration,
}

impl<C: ChainClient> Refresher<C> {
    pub fn new(
        producer: StateProducer<C>,
        lineage: Lineage,
        mailbox: MailboxSender<LiveState>,
        refresh_interval: Duration,
        empty_block_backoff: Duration,
    ) -> Self {
        Self {
            producer,
            lineage,
            mailbox,
            refresh_interval,
            empty_block_backoff,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RefreshError> {
        loop {
            let sampled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sampled = self.producer.sample_head() => sampled,
            };

            let delay = match sampled {
                Ok(activity) => {
                    let block_number = activity.block().number;
                    let num_txs = activity.transactions().len();
                    let state = self.lineage.advance(activity);
                    if self.mailbox.publish(state).is_some() {
                        debug!(block_number, "replaced unconsumed snapshot");
                    }
                    info!(
                        block_number,
                        num_txs,
                        window = self.lineage.window_len(),
                        "published chain state"
                    );
                    self.refresh_interval
                }
                Err(RefreshError::EmptyBlock(block_number)) => {
                    debug!(
                        block_number,
                        backoff = ?self.empty_block_backoff,
                        "head block has no transactions"
                    );
                    self.empty_block_backoff
                }
                Err(err) => {
                    warn!(?err, "chain state refresh failed");
                    return Err(err);
                }
            };

            if self.mailbox.is_receiver_dropped() {
                debug!("emitter gone, stopping refresher");
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    Written,
    Stopped,
}

/// Draws one query per cycle from the newest available snapshot and writes it
/// to the sink.
pub struct Emitter<T, S> {
    selector: Arc<QuerySelector>,
    mailbox: MailboxReceiver<T>,
    state: Option<T>,
    sink: S,
    rate_limit: Option<TokenBucket>,
    emitted: u64,
}

impl<T: State, S: LineSink> Emitter<T, S> {
    pub fn new(selector: Arc<QuerySelector>, mailbox: MailboxReceiver<T>, sink: S) -> Self {
        Self {
            selector,
            mailbox,
            state: None,
            sink,
            rate_limit: None,
            emitted: 0,
        }
    }

    pub fn with_rate_limit(mut self, bucket: TokenBucket) -> Self {
        self.rate_limit = Some(bucket);
        self
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs one emission cycle. Only the very first cycle waits for a
    /// snapshot; later cycles reuse the current one unless a newer one is
    /// pending.
    pub async fn emit_next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Emission, PipelineError> {
        if cancel.is_cancelled() {
            return Ok(Emission::Stopped);
        }

        if let Some(fresh) = self.mailbox.try_recv() {
            self.state = Some(fresh);
        }
        if self.state.is_none() {
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Emission::Stopped),
                first = self.mailbox.recv() => first,
            };
            self.state = Some(first.ok_or(PipelineError::NoState)?);
        }

        if let Some(bucket) = self.rate_limit.as_mut() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Emission::Stopped),
                _ = bucket.acquire() => {}
            }
        }

        let Some(state) = self.state.as_mut() else {
            return Err(PipelineError::NoState);
        };
        let query = self.selector.select(state)?;

        match self.sink.write_line(&query.to_line()).await {
            Ok(()) => {
                self.emitted += 1;
                Ok(Emission::Written)
            }
            Err(SinkError::Closed) => {
                debug!("sink closed");
                Ok(Emission::Stopped)
            }
            Err(SinkError::Io(err)) => Err(PipelineError::Sink(err)),
        }
    }

    /// Emits until cancelled or the sink reaches end-of-stream.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        loop {
            match self.emit_next(cancel).await? {
                Emission::Written => {
                    // sinks that never suspend would otherwise starve the refresher
                    tokio::task::yield_now().await;
                }
                Emission::Stopped => break,
            }
        }
        info!(emitted = self.emitted, "emitter stopped");
        Ok(())
    }
}

enum Outcome {
    Refresher(Result<Result<(), RefreshError>, JoinError>),
    Emitter(Result<(), PipelineError>),
}

/// Spawns the refresher and drives the emitter on the current task until
/// either side finishes. A fatal refresh error ends the whole pipeline.
pub async fn run_pipeline<C, S>(
    refresher: Refresher<C>,
    emitter: &mut Emitter<LiveState, S>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    C: ChainClient + Send + Sync + 'static,
    S: LineSink,
{
    let refresher_cancel = cancel.child_token();
    let mut refresher = tokio::spawn(refresher.run(refresher_cancel.clone()));

    let outcome = tokio::select! {
        biased;
        joined = &mut refresher => Outcome::Refresher(joined),
        emitted = emitter.run(&cancel) => Outcome::Emitter(emitted),
    };

    match outcome {
        Outcome::Refresher(joined) => {
            joined??;
            // refresher only stops cleanly on cancellation
            emitter.run(&cancel).await
        }
        Outcome::Emitter(emitted) => {
            refresher_cancel.cancel();
            let joined = refresher.await;
            match emitted {
                Err(PipelineError::NoState) => {
                    joined??;
                    Err(PipelineError::NoState)
                }
                emitted => emitted,
            }
        }
    }
}
