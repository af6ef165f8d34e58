// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Forwards the log objects of one notification batch.
//!
//! The batch is read from the file given as first argument, or from standard
//! input, and the batch outcome (`{"batchItemFailures": [...]}`) is printed
//! on standard output. Diagnostics go to standard error.

use std::env;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_forwarder_core::config::{log_level::LogLevel, Config};
use log_forwarder_core::logger::Formatter;
use log_forwarder_core::object_source;
use log_forwarder_core::processing::ProcessingOptions;
use log_forwarder_core::rules::RuleStore;
use log_forwarder_core::sinks::SinkRegistry;
use log_forwarder_core::{BatchCoordinator, BatchResponse, ForwarderError, NotificationBatch};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Config::load();
    init_logging(config.as_ref().map(|c| c.log_level).unwrap_or_default());

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration on log forwarder startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut coordinator = match build_coordinator(&config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Error starting log forwarder: {e}");
            return ExitCode::FAILURE;
        }
    };

    let batch = match read_batch(env::args().nth(1)).await {
        Ok(batch) => batch,
        Err(e) => {
            error!("Unable to read notification batch: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, deferring the rest of the batch");
            signal_cancel.cancel();
        }
    });

    let report = coordinator.process_batch(&batch, &cancel).await;
    print_response(&report.response)
}

fn init_logging(log_level: LogLevel) {
    let env_filter = log_level.env_filter_directive();

    let filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            EnvFilter::new(LogLevel::default().as_ref())
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");
}

fn build_coordinator(config: &Config) -> Result<BatchCoordinator, ForwarderError> {
    let rules = Arc::new(RuleStore::load(config)?);
    let sinks = SinkRegistry::from_config(config)?;
    let objects = object_source::from_config(config)?;
    debug!("Registered {} sinks", sinks.len());

    Ok(BatchCoordinator::new(
        rules,
        sinks,
        objects,
        ProcessingOptions::from_config(config),
    ))
}

async fn read_batch(path: Option<String>) -> Result<NotificationBatch, Box<dyn Error>> {
    let content = match path {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            content
        }
    };
    Ok(serde_json::from_str(&content)?)
}

fn print_response(response: &BatchResponse) -> ExitCode {
    match serde_json::to_string(response) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Unable to serialize batch outcome: {e}");
            ExitCode::FAILURE
        }
    }
}
