// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Forwarder Core
//!
//! Forwards log objects announced by object-created notifications to
//! configured log ingestion sinks.
//!
//! ## Architecture
//!
//! - [`rules`]: forwarding rules (which objects go where) and processing
//!   rules (how an object is parsed), loaded once into a [`rules::RuleStore`]
//! - [`sinks`]: named destinations that buffer and deliver records
//! - [`processing`]: turns one object into normalized records
//! - [`forwarder`]: runs a notification batch and reports the messages to
//!   redeliver
//! - [`config`]: layered configuration (defaults, YAML file, environment)

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod notification;
pub mod object_source;
pub mod processing;
pub mod record;
pub mod rules;
pub mod sinks;

pub use error::{EnvelopeError, ForwarderError, ProcessingError};
pub use forwarder::{BatchCoordinator, BatchReport, Outcome};
pub use notification::{BatchResponse, NotificationBatch, RawMessage};
pub use record::NormalizedRecord;
