// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log level of the forwarder's own diagnostics.
//!
//! Parsed case-insensitively from configuration. An unknown value never
//! prevents startup: it is reported and the forwarder runs at `warn`.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl LogLevel {
    /// Filter directive for the subscriber. HTTP client internals are kept
    /// quiet regardless of the configured level.
    #[must_use]
    pub fn env_filter_directive(self) -> String {
        format!(
            "h2=off,hyper=off,hyper_util=off,rustls=off,reqwest=warn,{}",
            self.as_ref()
        )
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: error, warn, info, debug, trace",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(LogLevel::Warn)
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(LogLevel::Warn)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("Info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
    }

    #[test]
    fn test_from_str_invalid() {
        let err = LogLevel::from_str("verbose").unwrap_err();
        assert!(err.contains("verbose"));
    }

    #[test]
    fn test_deserialize_invalid_falls_back_to_warn() {
        let level: LogLevel = serde_json::from_str("\"loud\"").unwrap();
        assert_eq!(level, LogLevel::Warn);

        let level: LogLevel = serde_json::from_str("3").unwrap();
        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    fn test_env_filter_directive_ends_with_level() {
        assert!(LogLevel::Trace.env_filter_directive().ends_with(",trace"));
    }
}
