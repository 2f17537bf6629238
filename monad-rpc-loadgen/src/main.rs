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

use std::sync::Arc;

use alloy_rpc_client::{ClientBuilder, ReqwestClient};
use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use monad_rpc_loadgen::{
    config::{Cli, LoadgenConfig},
    make_selector, mailbox, run_pipeline, Emitter, IdGenerator, Lineage, QuerySelector, Refresher,
    StateProducer, TokenBucket, WriterSink,
};
use rand::{rngs::SmallRng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_logging(json: bool) {
    // stdout carries the request stream
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("monad_rpc_loadgen=info"));
    if json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.log_json);

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };
    let selector = match make_selector(&config.methods) {
        Ok(selector) => selector,
        Err(err) => {
            error!("invalid method table: {err}");
            std::process::exit(1);
        }
    };

    info!(
        rpc_url = %config.rpc_url,
        total_weight = selector.total_weight(),
        rate_limit = ?config.rate_limit,
        seed = config.seed,
        "starting load generator"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    if let Err(err) = runtime.block_on(run(config, selector)) {
        error!("load generator stopped on error: {err:?}");
        std::process::exit(2);
    }
}

async fn run(config: LoadgenConfig, selector: QuerySelector) -> Result<()> {
    let client: ReqwestClient = ClientBuilder::default().http(config.rpc_url);
    let lineage = Lineage::new(
        Arc::new(IdGenerator::new()),
        SmallRng::seed_from_u64(config.seed),
        config.history_blocks,
    );
    let (sender, receiver) = mailbox();
    let refresher = Refresher::new(
        StateProducer::new(client, config.receipt_samples),
        lineage,
        sender,
        config.refresh_interval,
        config.empty_block_backoff,
    );

    let mut emitter = Emitter::new(
        Arc::new(selector),
        receiver,
        WriterSink::new(tokio::io::stdout()),
    );
    if let Some(rate) = config.rate_limit {
        let bucket = TokenBucket::new(rate, config.burst)
            .ok_or_else(|| eyre!("invalid rate limit {rate}/s with burst {}", config.burst))?;
        emitter = emitter.with_rate_limit(bucket);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted, stopping");
                on_interrupt.cancel();
            }
            Err(err) => warn!(?err, "failed to listen for ctrl-c"),
        }
    });

    run_pipeline(refresher, &mut emitter, cancel)
        .await
        .wrap_err("request pipeline failed")?;

    info!(emitted = emitter.emitted(), "load generator finished");
    Ok(())
}
