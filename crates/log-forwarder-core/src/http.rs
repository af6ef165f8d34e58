// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client shared by the HTTP sinks.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::Config;

/// Builds the client used to deliver records.
///
/// An invalid proxy setting is logged and the client falls back to a direct
/// connection, so a typo in `https_proxy` never stops log delivery.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.flush_timeout))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_proxy) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_proxy)?);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_proxy_falls_back() {
        let config = Config {
            https_proxy: Some("not a url ::".to_string()),
            ..Default::default()
        };
        assert!(build_client(&config, true).is_err());
        // Still yields a usable client.
        let _client = get_client(&config);
    }

    #[test]
    fn test_valid_proxy() {
        let config = Config {
            https_proxy: Some("http://proxy.internal:3128".to_string()),
            ..Default::default()
        };
        assert!(build_client(&config, true).is_ok());
    }
}
